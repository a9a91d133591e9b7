//! Core server: accepts WebSocket connections, authenticates them, and runs
//! one session loop per connection.
//!
//! Owns the signing secret, presence registry, room router, broadcaster,
//! and the message store gateway; all are shared with the per-connection
//! tasks by handle.

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRouter;
use crate::session::Session;
use crate::store::MessageStore;
use futures_util::{SinkExt, StreamExt};
use murmur_core::{
    decode_client_event, encode_server_event, verify_token, ChatError, ChatResult, ServerEvent,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// The chat delivery server instance.
pub struct ChatServer {
    config: ServerConfig,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRouter>,
    broadcaster: Arc<Broadcaster>,
    store: Arc<dyn MessageStore>,
    /// Monotonic connection id counter.
    next_conn_id: AtomicU64,
}

impl ChatServer {
    pub fn new(config: ServerConfig, store: Arc<dyn MessageStore>) -> Self {
        Self {
            config,
            presence: Arc::new(PresenceRegistry::new()),
            rooms: Arc::new(RoomRouter::new()),
            broadcaster: Arc::new(Broadcaster::new()),
            store,
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Bind the listener and accept connections until the process is
    /// shut down. Each connection runs in its own task.
    pub async fn run(self: Arc<Self>) -> ChatResult<()> {
        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ChatError::Transport(format!("bind failed on {addr}: {e}")))?;

        info!(
            addr = %addr,
            origins = ?self.config.allowed_origins,
            "chat server listening"
        );

        loop {
            let (stream, remote) = listener
                .accept()
                .await
                .map_err(|e| ChatError::Transport(format!("accept failed: {e}")))?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, remote).await {
                    debug!(remote = %remote, error = %e, "connection ended with error");
                }
            });
        }
    }

    /// Upgrade, authenticate, and run a single connection to completion.
    async fn handle_connection(&self, stream: TcpStream, remote: SocketAddr) -> ChatResult<()> {
        debug!(remote = %remote, "handling connection");

        // WebSocket upgrade: the origin check happens inside the upgrade
        // callback and the token rides the request URI. The whole handshake
        // is bounded so a half-open connection cannot linger.
        let mut token: Option<String> = None;
        let allowed = self.config.allowed_origins.clone();
        let callback = |req: &Request, resp: Response| {
            if !origin_allowed(&allowed, req) {
                warn!(remote = %remote, "origin not allowed");
                let mut reject = ErrorResponse::new(Some("origin not allowed".into()));
                *reject.status_mut() = StatusCode::FORBIDDEN;
                return Err(reject);
            }
            token = extract_token(req.uri().query());
            Ok(resp)
        };

        let handshake_window = Duration::from_secs(self.config.handshake_timeout_secs);
        let ws_stream = tokio::time::timeout(
            handshake_window,
            tokio_tungstenite::accept_hdr_async(stream, callback),
        )
        .await
        .map_err(|_| ChatError::Transport("handshake timed out".into()))?
        .map_err(|e| ChatError::Transport(format!("websocket upgrade failed: {e}")))?;

        // Authenticate before any event is processed; a bad token means
        // the connection is dropped without surfacing an event.
        let token =
            token.ok_or_else(|| ChatError::MalformedToken("no token in handshake".into()))?;
        let user_id = verify_token(&self.config.secret, &token)?;

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        info!(remote = %remote, user = %user_id, conn_id, "connection authenticated");

        let (tx, mut rx) = mpsc::channel::<ServerEvent>(self.config.outbound_buffer);
        self.broadcaster.add(conn_id, tx).await;

        let mut session = Session::new(
            conn_id,
            user_id,
            self.presence.clone(),
            self.rooms.clone(),
            self.broadcaster.clone(),
            self.store.clone(),
        );

        let result = match session.connect().await {
            Ok(()) => self.session_loop(ws_stream, &mut session, &mut rx).await,
            Err(e) => Err(e),
        };

        // Cleanup runs on every exit path, error or not.
        session.disconnect().await;
        result
    }

    /// Active-state loop: drain outbound events to the socket and dispatch
    /// inbound frames, until either side closes.
    async fn session_loop(
        &self,
        mut ws_stream: WebSocketStream<TcpStream>,
        session: &mut Session,
        rx: &mut mpsc::Receiver<ServerEvent>,
    ) -> ChatResult<()> {
        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(event) => {
                            let text = encode_server_event(&event)?;
                            ws_stream
                                .send(Message::Text(text))
                                .await
                                .map_err(|e| ChatError::Transport(format!("ws send failed: {e}")))?;
                        }
                        None => break,
                    }
                }

                inbound = ws_stream.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            match decode_client_event(&text) {
                                Ok(event) => session.handle_event(event).await,
                                Err(e) => {
                                    debug!(user = %session.user_id(), error = %e, "malformed client event");
                                    session.send_error(&e).await;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws_stream.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(user = %session.user_id(), "websocket closed");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Binary and pong frames are ignored.
                        }
                        Some(Err(e)) => {
                            debug!(user = %session.user_id(), error = %e, "websocket session ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Check the upgrade request's Origin header against the allow-list.
fn origin_allowed(allowed: &[String], req: &Request) -> bool {
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    match req.headers().get("origin").and_then(|v| v.to_str().ok()) {
        Some(origin) => allowed.iter().any(|a| a == origin),
        // Non-browser clients send no Origin header; the token still gates
        // them.
        None => true,
    }
}

/// Pull the bearer token out of the upgrade request's query string.
fn extract_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_origin(origin: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("ws://localhost/");
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn token_extraction() {
        assert_eq!(
            extract_token(Some("token=abc123&v=2")),
            Some("abc123".to_string())
        );
        assert_eq!(extract_token(Some("v=2")), None);
        assert_eq!(extract_token(Some("token=")), None);
        assert_eq!(extract_token(None), None);
    }

    #[test]
    fn origin_allow_list() {
        let any = vec!["*".to_string()];
        let strict = vec!["https://app.example".to_string()];

        assert!(origin_allowed(&any, &request_with_origin(Some("https://evil.example"))));
        assert!(origin_allowed(
            &strict,
            &request_with_origin(Some("https://app.example"))
        ));
        assert!(!origin_allowed(
            &strict,
            &request_with_origin(Some("https://evil.example"))
        ));
        // No Origin header: non-browser client, allowed through.
        assert!(origin_allowed(&strict, &request_with_origin(None)));
    }
}
