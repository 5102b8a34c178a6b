// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport built on tokio-tungstenite.
//!
//! Each successful `open()` spawns one I/O task that owns the socket. Outbound
//! messages reach it over a channel together with a reply slot, so `send()`
//! reports write failures to the caller. Inbound frames, acks and closure are
//! reported on the [`TransportEvents`] sink handed to `open()`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_config::TetherConfig;
use tether_core::{
    AdapterType, ErrorContext, HealthStatus, OutboundMessage, PluginAdapter, TetherError,
    Transport, TransportEvent, TransportEvents,
};

use crate::wire;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `close()` waits for the close handshake before aborting the socket task.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Outbound messages buffered ahead of the socket writer.
const OUTBOUND_BUFFER: usize = 64;

struct Outgoing {
    message: Message,
    reply: oneshot::Sender<Result<(), TetherError>>,
}

struct Connection {
    outbound: mpsc::Sender<Outgoing>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A [`Transport`] speaking JSON over a WebSocket.
pub struct WsTransport {
    url: String,
    auth_token: Option<String>,
    connection: Mutex<Option<Connection>>,
}

impl WsTransport {
    /// A transport for `url` (`ws://` or `wss://`), authenticating with an
    /// optional bearer token.
    pub fn new(url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            auth_token,
            connection: Mutex::new(None),
        }
    }

    /// Builds the transport from `[connection]`. Fails if no URL is configured.
    pub fn from_config(config: &TetherConfig) -> Result<Self, TetherError> {
        let url = config
            .connection
            .url
            .clone()
            .ok_or_else(|| TetherError::Config("connection.url is not set".to_string()))?;
        Ok(Self::new(url, config.connection.auth_token.clone()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn handshake(&self) -> Result<Socket, TetherError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TetherError::Config(format!("invalid websocket url {}: {e}", self.url)))?;
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TetherError::Config(format!("invalid auth token header value: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        match connect_async(request).await {
            Ok((socket, response)) => {
                debug!(url = %self.url, status = %response.status(), "websocket handshake complete");
                Ok(socket)
            }
            Err(WsError::Http(response)) => {
                let status = response.status();
                if matches!(status.as_u16(), 401 | 403) {
                    Err(TetherError::authentication(format!(
                        "handshake rejected with HTTP {status}"
                    )))
                } else {
                    Err(TetherError::connection_with_code(
                        format!("handshake failed with HTTP {status}"),
                        "handshake_failed",
                    ))
                }
            }
            Err(e) => Err(TetherError::Connection {
                message: format!("failed to connect to {}: {e}", self.url),
                context: ErrorContext::with_code("connect_failed"),
                source: Some(Box::new(e)),
            }),
        }
    }

    async fn close_connection(connection: Connection) {
        connection.cancel.cancel();
        let mut task = connection.task;
        if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
            warn!("websocket close handshake timed out; aborting");
            task.abort();
        }
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[async_trait]
impl PluginAdapter for WsTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        match &*self.connection.lock().await {
            Some(connection) if !connection.task.is_finished() => Ok(HealthStatus::Healthy),
            Some(_) => Ok(HealthStatus::Unhealthy("connection lost".to_string())),
            None => Ok(HealthStatus::Degraded("not connected".to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        self.close().await
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, events: TransportEvents) -> Result<(), TetherError> {
        if let Some(previous) = self.connection.lock().await.take() {
            Self::close_connection(previous).await;
        }

        let socket = self.handshake().await?;
        info!(url = %self.url, epoch = events.epoch(), "websocket connected");

        let (outbound, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_socket(socket, rx, events, cancel.clone()));
        *self.connection.lock().await = Some(Connection {
            outbound,
            cancel,
            task,
        });
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), TetherError> {
        let text = wire::encode(message)?;
        let outbound = match &*self.connection.lock().await {
            Some(connection) => connection.outbound.clone(),
            None => return Err(TetherError::connection("websocket is not connected")),
        };

        let (reply, done) = oneshot::channel();
        outbound
            .send(Outgoing {
                message: Message::Text(text.into()),
                reply,
            })
            .await
            .map_err(|_| TetherError::connection("websocket connection closed"))?;
        done.await
            .map_err(|_| TetherError::connection("websocket connection closed"))?
    }

    async fn close(&self) -> Result<(), TetherError> {
        if let Some(connection) = self.connection.lock().await.take() {
            Self::close_connection(connection).await;
            debug!(url = %self.url, "websocket closed");
        }
        Ok(())
    }
}

/// Owns the socket until it closes or `cancel` fires.
///
/// Remote closure and read errors are reported on `events`; a local close is not.
async fn run_socket(
    socket: Socket,
    mut outbound: mpsc::Receiver<Outgoing>,
    events: TransportEvents,
    cancel: CancellationToken,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(error = %e, "close frame not sent");
                }
                let _ = sink.close().await;
                break;
            }
            Some(out) = outbound.recv() => {
                let result = sink.send(out.message).await.map_err(|e| TetherError::Connection {
                    message: format!("websocket write failed: {e}"),
                    context: ErrorContext::with_code("write_failed"),
                    source: Some(Box::new(e)),
                });
                let _ = out.reply.send(result);
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = wire::decode(text.as_str()) {
                        events.emit(event);
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if let Some(event) = wire::decode_bytes(&bytes) {
                        events.emit(event);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (clean, reason) = match frame {
                        Some(frame) => (
                            frame.code == CloseCode::Normal,
                            Some(frame.reason.to_string()).filter(|r| !r.is_empty()),
                        ),
                        None => (true, None),
                    };
                    debug!(clean, reason = ?reason, "websocket closed by peer");
                    events.emit(TransportEvent::Closed { clean, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    events.emit(TransportEvent::Closed {
                        clean: false,
                        reason: Some(e.to_string()),
                    });
                    break;
                }
                None => {
                    events.emit(TransportEvent::Closed {
                        clean: false,
                        reason: Some("websocket stream ended".to_string()),
                    });
                    break;
                }
            }
        }
    }
}
