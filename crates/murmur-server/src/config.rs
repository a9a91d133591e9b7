//! Server configuration: TOML file + CLI overrides.

use murmur_core::{ChatError, ChatResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins accepted at the WebSocket upgrade; `*` allows any.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// How long an unauthenticated connection may linger before being cut.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Outbound event buffer per connection.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            handshake_timeout_secs: default_handshake_timeout(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded signing secret. Prefer the environment variable.
    pub secret: Option<String>,
    /// Environment variable consulted for the secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// TTL used when issuing dev tokens from the CLI.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            secret: None,
            secret_env: default_secret_env(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

fn default_port() -> u16 {
    3001
}
fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_handshake_timeout() -> u64 {
    10
}
fn default_outbound_buffer() -> usize {
    64
}
fn default_secret_env() -> String {
    "MURMUR_SECRET".to_string()
}
fn default_token_ttl() -> u64 {
    86400
}

/// Resolved server configuration (CLI overrides applied, secret decoded).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub handshake_timeout_secs: u64,
    pub outbound_buffer: usize,
    pub token_ttl_secs: u64,
    /// Decoded signing secret shared with the token issuer.
    pub secret: Vec<u8>,
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides. The signing
    /// secret is resolved CLI > environment > file; a missing secret is a
    /// startup failure.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_secret: Option<&str>,
        cli_origins: &[String],
    ) -> ChatResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| ChatError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let secret_hex = cli_secret
            .map(|s| s.to_string())
            .or_else(|| std::env::var(&file_config.auth.secret_env).ok())
            .or_else(|| file_config.auth.secret.clone())
            .ok_or_else(|| {
                ChatError::Config(format!(
                    "no signing secret configured (set {}, --secret, or [auth].secret)",
                    file_config.auth.secret_env
                ))
            })?;
        let secret = hex::decode(secret_hex.trim())
            .map_err(|e| ChatError::Config(format!("signing secret is not valid hex: {e}")))?;
        if secret.is_empty() {
            return Err(ChatError::Config("signing secret is empty".into()));
        }

        let allowed_origins = if cli_origins.is_empty() {
            file_config.server.allowed_origins
        } else {
            cli_origins.to_vec()
        };

        Ok(Self {
            port: cli_port.unwrap_or(file_config.server.port),
            allowed_origins,
            handshake_timeout_secs: file_config.server.handshake_timeout_secs,
            outbound_buffer: file_config.server.outbound_buffer,
            token_ttl_secs: file_config.auth.token_ttl_secs,
            secret,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_defaults() {
        let parsed: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(parsed.server.port, 3001);
        assert_eq!(parsed.server.allowed_origins, vec!["*".to_string()]);
        assert_eq!(parsed.server.handshake_timeout_secs, 10);
        assert_eq!(parsed.auth.secret_env, "MURMUR_SECRET");
    }

    #[test]
    fn file_sections_parse() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 4000
            allowed_origins = ["https://example.com"]

            [auth]
            secret = "deadbeef"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.port, 4000);
        assert_eq!(
            parsed.server.allowed_origins,
            vec!["https://example.com".to_string()]
        );
        assert_eq!(parsed.auth.secret.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn cli_secret_overrides_and_invalid_hex_fails() {
        let config = ServerConfig::load(None, Some(4001), Some("deadbeef"), &[]).unwrap();
        assert_eq!(config.port, 4001);
        assert_eq!(config.secret, vec![0xde, 0xad, 0xbe, 0xef]);

        assert!(matches!(
            ServerConfig::load(None, None, Some("not hex"), &[]),
            Err(ChatError::Config(_))
        ));
    }
}
