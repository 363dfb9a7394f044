use std::sync::Arc;

use tokio::time::{interval, timeout, Duration, Interval};
use tracing::{debug, warn};

use mandi_deal::{Countdown, DealPermissions, DealSnapshot, DealStatus};

use crate::channel::{RealtimeChannel, RealtimeTransport};
use crate::collaborators::{ChatHistoryService, DealService, ServiceError};
use crate::context::{SessionConfig, SessionContext};
use crate::errors::NegotiationError;
use crate::reconcile::MessageBuffer;
use crate::types::{ChannelEvent, Message, MessageKind, Participant};
use crate::utils::timestamp_millis;

/// What happened on the session's event loop, handed to whoever drives it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A confirmed message was folded into the buffer (peer message or the
    /// confirmation of one of our own sends).
    MessageReceived(Message),
    MessagesRead { reader_id: String },
    /// Once-per-second countdown while the linked deal is still pending.
    Countdown(Countdown),
    /// The deal's clock ran out; the cached status was coerced to EXPIRED
    /// pending the server's authoritative word.
    DealExpired,
    ConnectionLost(String),
}

enum Step {
    Tick,
    Event(Option<ChannelEvent>),
}

/// Single-owner runtime for one open conversation.
///
/// Owns the message buffer, the cached deal snapshot, the realtime channel
/// and the expiry timer; everything mutates on the one task that calls into
/// it, so steps never interleave. User actions go out through the external
/// collaborators; their results come back as whole snapshots, never field
/// patches.
pub struct NegotiationSession<T: RealtimeTransport> {
    ctx: SessionContext,
    config: SessionConfig,
    channel: RealtimeChannel<T>,
    buffer: MessageBuffer,
    conversation_id: String,
    participants: Vec<Participant>,
    deal: Option<DealSnapshot>,
    history: Arc<dyn ChatHistoryService>,
    deals: Arc<dyn DealService>,
    expiry_timer: Option<Interval>,
    channel_done: bool,
    closed: bool,
}

impl<T: RealtimeTransport> NegotiationSession<T> {
    /// Load the conversation and linked deal, seed the buffer with history,
    /// open the realtime channel and announce this user's read position.
    pub async fn open(
        ctx: SessionContext,
        config: SessionConfig,
        conversation_id: &str,
        history: Arc<dyn ChatHistoryService>,
        deals: Arc<dyn DealService>,
        transport: T,
    ) -> Result<Self, NegotiationError> {
        let conversation = timeout(config.request_timeout, history.conversation(conversation_id))
            .await
            .map_err(|_| NegotiationError::Timeout {
                operation: "load conversation",
            })?
            .map_err(|e| NegotiationError::from_service("load conversation", e))?;

        let deal = match conversation.linked_deal_id.as_deref() {
            Some(deal_id) => Some(
                timeout(config.request_timeout, deals.deal(deal_id))
                    .await
                    .map_err(|_| NegotiationError::Timeout {
                        operation: "load deal",
                    })?
                    .map_err(|e| NegotiationError::from_service("load deal", e))?,
            ),
            None => None,
        };

        let mut buffer = MessageBuffer::new(ctx.user_id.clone());
        buffer.seed(conversation.messages);

        let mut channel = RealtimeChannel::open(transport, config.channel, conversation_id)
            .await
            .map_err(|e| NegotiationError::RequestFailed {
                operation: "open channel",
                reason: e.to_string(),
            })?;

        // Opening the conversation reads it; a dropped receipt only costs
        // the peer a stale unread badge.
        if let Err(err) = channel.notify_read(&ctx.user_id).await {
            warn!(error = %err, "read receipt on open failed");
        }
        buffer.mark_read(&ctx.user_id);

        let mut session = Self {
            ctx,
            config,
            channel,
            buffer,
            conversation_id: conversation.id,
            participants: conversation.participants,
            deal,
            history,
            deals,
            expiry_timer: None,
            channel_done: false,
            closed: false,
        };
        session.retune_timer();
        debug!(
            conversation_id = %session.conversation_id,
            has_deal = session.deal.is_some(),
            "negotiation session open"
        );
        Ok(session)
    }

    /// Consume the next event: a channel frame or a clock tick, whichever
    /// comes first. Returns `None` once there is nothing left to wait on.
    ///
    /// This is the single event consumer; every buffer and deal mutation
    /// driven by inbound events happens here, one discrete step at a time.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if self.closed {
                return None;
            }
            let step = match (&mut self.expiry_timer, self.channel_done) {
                (None, true) => return None,
                (Some(timer), true) => {
                    timer.tick().await;
                    Step::Tick
                }
                (None, false) => Step::Event(self.channel.next_event().await),
                (Some(timer), false) => tokio::select! {
                    _ = timer.tick() => Step::Tick,
                    event = self.channel.next_event() => Step::Event(event),
                },
            };

            match step {
                Step::Tick => {
                    if let Some(update) = self.on_tick() {
                        return Some(update);
                    }
                }
                Step::Event(Some(ChannelEvent::Message(message))) => {
                    self.buffer.reconcile_incoming(message.clone());
                    return Some(SessionUpdate::MessageReceived(message));
                }
                Step::Event(Some(ChannelEvent::Read { reader_id })) => {
                    self.buffer.mark_read(&reader_id);
                    return Some(SessionUpdate::MessagesRead { reader_id });
                }
                Step::Event(Some(ChannelEvent::ConnectionLost(reason))) => {
                    self.channel_done = true;
                    return Some(SessionUpdate::ConnectionLost(reason));
                }
                Step::Event(None) => {
                    self.channel_done = true;
                }
            }
        }
    }

    fn on_tick(&mut self) -> Option<SessionUpdate> {
        let Some(deal) = self.deal.as_mut() else {
            self.expiry_timer = None;
            return None;
        };
        let countdown = Countdown::until(deal.expires_at, timestamp_millis());
        if countdown.is_expired() {
            deal.expire_locally();
            self.expiry_timer = None;
            return Some(SessionUpdate::DealExpired);
        }
        Some(SessionUpdate::Countdown(countdown))
    }

    /// Send a text message: optimistic append, then emit on the channel. On
    /// a send failure the optimistic entry stays visible flagged failed;
    /// re-sending is the caller's explicit decision.
    pub async fn send_text(&mut self, content: &str) -> Result<Message, NegotiationError> {
        self.ensure_open()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(NegotiationError::EmptyMessage);
        }
        self.emit(content.to_string(), MessageKind::Text).await
    }

    /// Upload the image through the chat history service, then send its
    /// stored reference exactly like a text message with kind `image`.
    pub async fn send_image(&mut self, bytes: &[u8]) -> Result<Message, NegotiationError> {
        self.ensure_open()?;
        let url = timeout(self.config.request_timeout, self.history.upload_image(bytes))
            .await
            .map_err(|_| NegotiationError::Timeout {
                operation: "upload image",
            })?
            .map_err(|e| NegotiationError::from_service("upload image", e))?;
        self.emit(url, MessageKind::Image).await
    }

    async fn emit(
        &mut self,
        content: String,
        kind: MessageKind,
    ) -> Result<Message, NegotiationError> {
        let message = self.buffer.append_optimistic(content, kind);
        let correlation_id = message.correlation_id.clone().unwrap_or_default();
        let send = self
            .channel
            .send_message(&self.ctx.user_id, &correlation_id, &message.content, kind)
            .await;
        if let Err(err) = send {
            self.buffer.mark_failed(&message.id);
            return Err(NegotiationError::SendFailed {
                provisional_id: message.id,
                reason: err.to_string(),
            });
        }
        Ok(message)
    }

    /// Tell the room this user has read the conversation.
    pub async fn notify_read(&mut self) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        self.buffer.mark_read(&self.ctx.user_id);
        self.channel
            .notify_read(&self.ctx.user_id)
            .await
            .map_err(|e| NegotiationError::RequestFailed {
                operation: "notify read",
                reason: e.to_string(),
            })
    }

    /// Propose a new price. The deal stays PENDING; the outstanding offer
    /// becomes ours.
    pub async fn counter_offer(&mut self, price: f64) -> Result<DealSnapshot, NegotiationError> {
        self.ensure_open()?;
        let deal_id = {
            let deal = self.deal.as_ref().ok_or(NegotiationError::NoLinkedDeal)?;
            deal.check_counter_offer(price)?;
            deal.id.clone()
        };
        let deals = Arc::clone(&self.deals);
        let result = timeout(
            self.config.request_timeout,
            deals.counter_offer(&deal_id, price),
        )
        .await;
        self.apply_deal_result("counter offer", result).await
    }

    /// Accept the peer's outstanding offer. Rejected locally when the last
    /// offer is our own.
    pub async fn accept(&mut self) -> Result<DealSnapshot, NegotiationError> {
        self.ensure_open()?;
        let deal_id = {
            let deal = self.deal.as_ref().ok_or(NegotiationError::NoLinkedDeal)?;
            deal.check_accept(&self.ctx.user_id)?;
            deal.id.clone()
        };
        let deals = Arc::clone(&self.deals);
        let result = timeout(self.config.request_timeout, deals.accept(&deal_id)).await;
        self.apply_deal_result("accept", result).await
    }

    /// Walk away from the deal. Allowed for either party while it is open.
    pub async fn reject(&mut self) -> Result<DealSnapshot, NegotiationError> {
        self.ensure_open()?;
        let deal_id = {
            let deal = self.deal.as_ref().ok_or(NegotiationError::NoLinkedDeal)?;
            deal.check_reject()?;
            deal.id.clone()
        };
        let deals = Arc::clone(&self.deals);
        let result = timeout(self.config.request_timeout, deals.reject(&deal_id)).await;
        self.apply_deal_result("reject", result).await
    }

    async fn apply_deal_result(
        &mut self,
        operation: &'static str,
        result: Result<Result<DealSnapshot, ServiceError>, tokio::time::error::Elapsed>,
    ) -> Result<DealSnapshot, NegotiationError> {
        match result {
            Err(_) => Err(NegotiationError::Timeout { operation }),
            Ok(Err(ServiceError::Rejected(message))) => {
                // The server's state moved first. Drop whatever we assumed
                // and pull its latest snapshot before reporting the refusal.
                self.refresh_deal().await;
                Err(NegotiationError::Conflict(message))
            }
            Ok(Err(ServiceError::Unavailable(reason))) => {
                Err(NegotiationError::RequestFailed { operation, reason })
            }
            Ok(Ok(snapshot)) => {
                self.install_deal(snapshot.clone());
                Ok(snapshot)
            }
        }
    }

    /// Re-fetch the linked deal and replace the cached snapshot wholesale.
    ///
    /// The realtime channel carries no deal events, so a peer's action only
    /// becomes visible through a fresh snapshot. Any freshness trigger must
    /// come through here; fields are never patched individually.
    pub async fn reload_deal(&mut self) -> Result<Option<DealSnapshot>, NegotiationError> {
        self.ensure_open()?;
        let Some(deal_id) = self.deal.as_ref().map(|d| d.id.clone()) else {
            return Ok(None);
        };
        let deals = Arc::clone(&self.deals);
        let result = timeout(self.config.request_timeout, deals.deal(&deal_id)).await;
        self.apply_deal_result("reload deal", result).await.map(Some)
    }

    async fn refresh_deal(&mut self) {
        let Some(deal_id) = self.deal.as_ref().map(|d| d.id.clone()) else {
            return;
        };
        let deals = Arc::clone(&self.deals);
        match timeout(self.config.request_timeout, deals.deal(&deal_id)).await {
            Ok(Ok(latest)) => self.install_deal(latest),
            Ok(Err(err)) => warn!(%deal_id, error = %err, "deal refresh failed"),
            Err(_) => warn!(%deal_id, "deal refresh timed out"),
        }
    }

    /// Replace the cached deal wholesale with the server's snapshot and
    /// retune the expiry timer to the new state.
    fn install_deal(&mut self, snapshot: DealSnapshot) {
        debug!(
            deal_id = %snapshot.id,
            status = ?snapshot.status,
            offer = snapshot.current_offer,
            "deal snapshot replaced"
        );
        self.deal = Some(snapshot);
        self.retune_timer();
    }

    fn retune_timer(&mut self) {
        let ticking = self
            .deal
            .as_ref()
            .is_some_and(|d| d.status == DealStatus::Pending && d.expires_at > 0);
        if ticking {
            if self.expiry_timer.is_none() {
                self.expiry_timer = Some(interval(Duration::from_secs(1)));
            }
        } else {
            self.expiry_timer = None;
        }
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.closed {
            Err(NegotiationError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Tear down the channel subscription and the expiry timer. Results of
    /// any still in-flight request are discarded by the closed guard.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.channel.close().await;
        self.expiry_timer = None;
        self.closed = true;
        debug!(conversation_id = %self.conversation_id, "session closed");
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        self.buffer.messages()
    }

    pub fn failed_sends(&self) -> Vec<&Message> {
        self.buffer.failed().collect()
    }

    pub fn deal(&self) -> Option<&DealSnapshot> {
        self.deal.as_ref()
    }

    /// What the session's user may do with the linked deal right now.
    pub fn permissions(&self) -> Option<DealPermissions> {
        self.deal.as_ref().map(|d| d.permissions(&self.ctx.user_id))
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// The other party in the conversation.
    pub fn peer(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id != self.ctx.user_id)
    }
}
