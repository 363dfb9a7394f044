use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{ChannelEvent, ClientFrame, MessageKind, ServerFrame};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport disconnected: {0}")]
    Disconnected(String),
    #[error("connect failed: {0}")]
    ConnectFailed(String),
}

/// Transport seam for the realtime channel. Implementations own the socket
/// (WebSocket, SSE, an in-process pair for tests); the adapter owns the
/// lifecycle around it.
#[async_trait]
pub trait RealtimeTransport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn send(&mut self, frame: ClientFrame) -> Result<(), TransportError>;

    /// Next inbound frame. `Ok(None)` means the server closed the stream
    /// cleanly; `Err` means the connection dropped.
    async fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError>;

    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// Reconnect attempts before the channel gives up and reports the loss.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_backoff: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 3,
            reconnect_backoff: Duration::from_secs(2),
        }
    }
}

/// Reconnect in progress: which attempt is next and when it may run.
///
/// Lives on the channel rather than in the `next_event` future so a caller
/// racing that future against a timer and dropping it mid-backoff resumes
/// the same attempt instead of restarting from the first.
struct ReconnectState {
    attempt: u32,
    deadline: Instant,
}

/// Owns exactly one live connection for one conversation session.
///
/// Frames scoped to other conversations are dropped here, so everything
/// upstream only ever sees events for the joined room. On a dropped
/// connection the adapter reconnects and rejoins with bounded attempts and
/// fixed backoff; outbound sends while disconnected fail fast and are never
/// silently retried.
pub struct RealtimeChannel<T: RealtimeTransport> {
    transport: T,
    config: ChannelConfig,
    conversation_id: String,
    connected: bool,
    reconnect: Option<ReconnectState>,
}

impl<T: RealtimeTransport> RealtimeChannel<T> {
    /// Establish the connection and announce membership in the
    /// conversation's event scope.
    pub async fn open(
        mut transport: T,
        config: ChannelConfig,
        conversation_id: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let conversation_id = conversation_id.into();
        transport.connect().await?;
        transport
            .send(ClientFrame::Join {
                conversation_id: conversation_id.clone(),
            })
            .await?;
        debug!(%conversation_id, "realtime channel open");
        Ok(Self {
            transport,
            config,
            conversation_id,
            connected: true,
            reconnect: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Next event for the joined conversation.
    ///
    /// Returns `None` when the server closed the stream cleanly; yields
    /// `ChannelEvent::ConnectionLost` once reconnect attempts are exhausted.
    ///
    /// Cancel-safe: dropping the returned future mid-backoff keeps the
    /// attempt counter and deadline on the channel, so the next call resumes
    /// the reconnect where it left off.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            if let Some(state) = &self.reconnect {
                let attempt = state.attempt;
                tokio::time::sleep_until(state.deadline).await;
                match self.try_rejoin().await {
                    Ok(()) => {
                        debug!(attempt, "reconnected and rejoined");
                        self.reconnect = None;
                        self.connected = true;
                    }
                    Err(err) => {
                        warn!(attempt, error = %err, "reconnect attempt failed");
                        if attempt >= self.config.max_reconnect_attempts {
                            self.reconnect = None;
                            return Some(ChannelEvent::ConnectionLost(format!(
                                "gave up after {} reconnect attempts",
                                self.config.max_reconnect_attempts
                            )));
                        }
                        self.reconnect = Some(ReconnectState {
                            attempt: attempt + 1,
                            deadline: Instant::now() + self.config.reconnect_backoff,
                        });
                    }
                }
                continue;
            }
            if !self.connected {
                return None;
            }
            match self.transport.recv().await {
                Ok(Some(frame)) => {
                    if let Some(event) = self.filter(frame) {
                        return Some(event);
                    }
                }
                Ok(None) => {
                    debug!(conversation_id = %self.conversation_id, "server closed stream");
                    self.connected = false;
                    return None;
                }
                Err(err) => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        error = %err,
                        "connection dropped, reconnecting"
                    );
                    self.begin_reconnect();
                }
            }
        }
    }

    fn filter(&self, frame: ServerFrame) -> Option<ChannelEvent> {
        match frame {
            ServerFrame::NewMessage {
                conversation_id,
                message,
            } if conversation_id == self.conversation_id => Some(ChannelEvent::Message(message)),
            ServerFrame::MessagesRead {
                conversation_id,
                reader_id,
            } if conversation_id == self.conversation_id => {
                Some(ChannelEvent::Read { reader_id })
            }
            other => {
                debug!(?other, "dropping frame for another conversation");
                None
            }
        }
    }

    async fn try_rejoin(&mut self) -> Result<(), TransportError> {
        self.transport.connect().await?;
        self.transport
            .send(ClientFrame::Join {
                conversation_id: self.conversation_id.clone(),
            })
            .await
    }

    fn begin_reconnect(&mut self) {
        self.connected = false;
        self.reconnect = Some(ReconnectState {
            attempt: 1,
            deadline: Instant::now() + self.config.reconnect_backoff,
        });
    }

    /// Emit a message for the joined conversation. Fails fast when the
    /// connection is down; retrying is the caller's explicit decision.
    pub async fn send_message(
        &mut self,
        sender_id: &str,
        correlation_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let frame = ClientFrame::SendMessage {
            conversation_id: self.conversation_id.clone(),
            sender_id: sender_id.to_string(),
            correlation_id: correlation_id.to_string(),
            content: content.to_string(),
            kind,
        };
        self.send_frame(frame).await
    }

    /// Tell the room this user has read the conversation.
    pub async fn notify_read(&mut self, user_id: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let frame = ClientFrame::MarkRead {
            conversation_id: self.conversation_id.clone(),
            user_id: user_id.to_string(),
        };
        self.send_frame(frame).await
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected("channel is closed".into()))
        }
    }

    /// The failed frame itself is never retried; the event path picks up the
    /// scheduled reconnect and either restores the connection or reports
    /// `ConnectionLost`.
    async fn send_frame(&mut self, frame: ClientFrame) -> Result<(), TransportError> {
        let result = self.transport.send(frame).await;
        if result.is_err() {
            self.begin_reconnect();
        }
        result
    }

    /// Tear the connection down unconditionally. Must run on session end so
    /// the room subscription does not leak.
    pub async fn close(&mut self) {
        self.transport.close().await;
        self.connected = false;
        self.reconnect = None;
        debug!(conversation_id = %self.conversation_id, "realtime channel closed");
    }
}
