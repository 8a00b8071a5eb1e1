/// Delta stream session management
///
/// Owns the WebSocket connection: connect, read, decode, forward to the engine, and on
/// any drop back off and reconnect. It never tries to resume where the previous
/// connection stopped; the engine is told about every drop and re-arms from a fresh
/// snapshot.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::decoder::{DecodeError, Decoder};
use crate::error::ClientError;
use crate::protocol::{DeltaUpdate, FRAME_SIZE};

/// Everything the stream reader tells the engine, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Connected,
    Frame { update: DeltaUpdate, len: usize },
    Malformed { len: usize, error: DecodeError },
    Disconnected { reason: String },
    /// The session gave up; nothing follows.
    Failed(ClientError),
}

enum PumpExit {
    Shutdown,
    /// `delivered` counts decoded frames forwarded before the drop.
    Dropped { reason: String, delivered: u64 },
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct FeedSession {
    url: String,
    policy: ReconnectPolicy,
    idle_timeout: Duration,
    events: mpsc::Sender<FeedEvent>,
    shutdown: watch::Receiver<bool>,
}

impl FeedSession {
    pub fn new(
        config: &ClientConfig,
        events: mpsc::Sender<FeedEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        FeedSession {
            url: config.ws_url.clone(),
            policy: config.reconnect.clone(),
            idle_timeout: config.idle_timeout,
            events,
            shutdown,
        }
    }

    /// Run until shutdown, until the engine stops listening, or until the reconnect
    /// budget is spent.
    pub async fn run(mut self) {
        let mut failures = 0u32;

        loop {
            if *self.shutdown.borrow() {
                return;
            }

            debug!(url = %self.url, "stream_connecting");
            let connected =
                tokio::time::timeout(self.idle_timeout, connect_async(self.url.as_str())).await;
            let reason = match connected {
                Ok(Ok((ws, _response))) => {
                    info!(url = %self.url, "stream_connected");
                    if self.events.send(FeedEvent::Connected).await.is_err() {
                        return;
                    }
                    match self.pump(ws).await {
                        PumpExit::Shutdown => return,
                        PumpExit::Dropped { reason, delivered } => {
                            // only a connection that carried frames restores the budget
                            if delivered > 0 {
                                failures = 0;
                            }
                            let event = FeedEvent::Disconnected {
                                reason: reason.clone(),
                            };
                            if self.events.send(event).await.is_err() {
                                return;
                            }
                            reason
                        }
                    }
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "connect timeout".to_string(),
            };

            failures += 1;
            if self.policy.exhausted(failures) {
                error!(attempts = failures, reason = %reason, "stream_retries_exhausted");
                let _ = self
                    .events
                    .send(FeedEvent::Failed(ClientError::RetriesExhausted {
                        attempts: failures,
                    }))
                    .await;
                return;
            }

            let delay = self.policy.backoff(failures);
            warn!(
                reason = %reason,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "stream_reconnect_backoff"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => return,
            }
        }
    }

    async fn pump(&mut self, ws: WsStream) -> PumpExit {
        let (mut write, mut read) = ws.split();
        let mut delivered = 0u64;
        let dropped = |reason: String, delivered: u64| PumpExit::Dropped { reason, delivered };

        loop {
            let next = tokio::select! {
                _ = self.shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return PumpExit::Shutdown;
                }
                next = tokio::time::timeout(self.idle_timeout, read.next()) => next,
            };

            match next {
                Err(_) => return dropped("idle timeout".to_string(), delivered),
                Ok(None) => return dropped("stream ended".to_string(), delivered),
                Ok(Some(Err(e))) => return dropped(e.to_string(), delivered),
                Ok(Some(Ok(Message::Binary(data)))) => {
                    match self.forward(&data).await {
                        None => return PumpExit::Shutdown,
                        Some(true) => delivered += 1,
                        Some(false) => {}
                    }
                }
                Ok(Some(Ok(Message::Ping(payload)))) => {
                    if let Err(e) = write.send(Message::Pong(payload)).await {
                        return dropped(e.to_string(), delivered);
                    }
                }
                Ok(Some(Ok(Message::Close(frame)))) => {
                    info!(?frame, delivered, "server_close");
                    return dropped("server closed connection".to_string(), delivered);
                }
                Ok(Some(Ok(Message::Text(text)))) => {
                    warn!(len = text.len(), "unexpected_text_frame");
                }
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    /// Decode one message and pass it on. Returns whether it decoded, or None once the
    /// engine is gone.
    async fn forward(&self, data: &[u8]) -> Option<bool> {
        let event = match Decoder::decode(data) {
            Ok(update) => {
                if data.len() != FRAME_SIZE {
                    debug!(len = data.len(), ordinal = update.ordinal, "trailing_frame_bytes_ignored");
                }
                FeedEvent::Frame {
                    update,
                    len: data.len(),
                }
            }
            Err(error) => {
                warn!(len = data.len(), %error, "frame_discarded");
                FeedEvent::Malformed {
                    len: data.len(),
                    error,
                }
            }
        };
        let decoded = matches!(event, FeedEvent::Frame { .. });
        self.events.send(event).await.ok().map(|_| decoded)
    }
}
