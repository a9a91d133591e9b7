//! murmur-server: realtime chat delivery service.
//!
//! Accepts WebSocket connections authenticated with an HMAC bearer token,
//! tracks per-user presence, and fans conversation events (messages, edits,
//! deletes, typing indicators) out to subscribed connections.

mod broadcast;
mod config;
mod presence;
mod rooms;
mod server;
mod session;
mod store;

use clap::Parser;
use config::ServerConfig;
use serde::Deserialize;
use server::ChatServer;
use std::path::PathBuf;
use std::sync::Arc;
use store::MemoryStore;
use tracing::{error, info};

/// murmur-server — realtime chat delivery service
#[derive(Parser, Debug)]
#[command(name = "murmur-server", version, about = "Realtime chat delivery service")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.murmur/config.toml")]
    config: String,

    /// Hex-encoded signing secret (overrides env and config file)
    #[arg(long)]
    secret: Option<String>,

    /// Allowed origin for the WebSocket handshake (repeatable; `*` allows any)
    #[arg(long = "allowed-origin")]
    allowed_origins: Vec<String>,

    /// TOML file of conversations to preload into the in-memory store
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Print an access token for the given user id and exit (dev helper)
    #[arg(long, value_name = "USER_ID")]
    issue_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Seed file structure: `[[conversation]]` tables.
#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    conversation: Vec<SeedConversation>,
}

#[derive(Debug, Deserialize)]
struct SeedConversation {
    id: String,
    user_a: String,
    user_b: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Load server config (file + CLI overrides). A missing signing secret
    // is fatal here, before anything listens.
    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(
        Some(&config_path),
        cli.port,
        cli.secret.as_deref(),
        &cli.allowed_origins,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    // Dev helper: mint a token with the shared secret and exit.
    if let Some(user_id) = cli.issue_token {
        let token = murmur_core::issue_token(&config.secret, &user_id, config.token_ttl_secs);
        println!("{token}");
        return;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        "starting murmur-server"
    );

    // The in-memory store backs dev deployments; production wires a real
    // MessageStore implementation here.
    let store = Arc::new(MemoryStore::new());
    if let Some(seed_path) = &cli.seed {
        if let Err(e) = load_seed(&store, seed_path).await {
            error!(path = %seed_path.display(), error = %e, "failed to load seed file");
            std::process::exit(1);
        }
    }

    let chat_server = Arc::new(ChatServer::new(config, store));

    // Run until shutdown signal
    tokio::select! {
        result = chat_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("murmur-server stopped");
}

/// Preload conversations from a TOML seed file.
async fn load_seed(store: &MemoryStore, path: &std::path::Path) -> murmur_core::ChatResult<()> {
    let content = std::fs::read_to_string(path)?;
    let seed: SeedFile = toml::from_str(&content)
        .map_err(|e| murmur_core::ChatError::Config(format!("seed parse error: {e}")))?;
    let count = seed.conversation.len();
    for conv in seed.conversation {
        store
            .seed_conversation(&conv.id, &conv.user_a, &conv.user_b)
            .await;
    }
    info!(count, "seeded conversations");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
