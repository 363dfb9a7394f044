//! In-process authoritative market backend for the demo.
//!
//! Plays the roles the real system fills with HTTP services and the realtime
//! gateway: it stores the conversation and deal, assigns message ids and
//! timestamps, applies deal transitions, and broadcasts room-scoped frames to
//! every joined client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use mandi_deal::{DealSnapshot, DealStatus, OfferEntry};
use mandi_negotiation::{
    ChatHistoryService, ClientFrame, ConversationSnapshot, DealService, Delivery, Message,
    RealtimeTransport, ServerFrame, ServiceError, TransportError,
};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

struct ServerState {
    conversation: ConversationSnapshot,
    deal: DealSnapshot,
    rooms: HashMap<String, Vec<mpsc::UnboundedSender<ServerFrame>>>,
    next_message_id: u32,
}

impl ServerState {
    fn broadcast(&mut self, conversation_id: &str, frame: ServerFrame) {
        if let Some(members) = self.rooms.get_mut(conversation_id) {
            members.retain(|member| member.send(frame.clone()).is_ok());
        }
    }
}

#[derive(Clone)]
pub struct MarketServer {
    state: Arc<Mutex<ServerState>>,
}

impl MarketServer {
    pub fn new(conversation: ConversationSnapshot, deal: DealSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                conversation,
                deal,
                rooms: HashMap::new(),
                next_message_id: 1,
            })),
        }
    }

    /// Per-user facade, standing in for an authenticated backend session.
    pub fn client_for(&self, user_id: &str) -> MarketClient {
        MarketClient {
            user_id: user_id.to_string(),
            state: Arc::clone(&self.state),
        }
    }
}

/// The server as seen by one authenticated user: collaborator services plus
/// a local socket factory.
#[derive(Clone)]
pub struct MarketClient {
    user_id: String,
    state: Arc<Mutex<ServerState>>,
}

impl MarketClient {
    pub fn socket(&self) -> LocalSocket {
        let (tx, rx) = mpsc::unbounded_channel();
        LocalSocket {
            state: Arc::clone(&self.state),
            inbound_tx: tx,
            inbound_rx: rx,
        }
    }
}

#[async_trait]
impl ChatHistoryService for MarketClient {
    async fn conversation(&self, id: &str) -> Result<ConversationSnapshot, ServiceError> {
        let state = self.state.lock().unwrap();
        if state.conversation.id != id {
            return Err(ServiceError::Rejected(format!(
                "no conversation with id {id}"
            )));
        }
        Ok(state.conversation.clone())
    }

    async fn upload_image(&self, bytes: &[u8]) -> Result<String, ServiceError> {
        Ok(format!("local://uploads/{}-{}.jpg", self.user_id, bytes.len()))
    }
}

#[async_trait]
impl DealService for MarketClient {
    async fn deal(&self, id: &str) -> Result<DealSnapshot, ServiceError> {
        let state = self.state.lock().unwrap();
        if state.deal.id != id {
            return Err(ServiceError::Rejected(format!("no deal with id {id}")));
        }
        Ok(state.deal.clone())
    }

    async fn counter_offer(&self, id: &str, price: f64) -> Result<DealSnapshot, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if state.deal.id != id {
            return Err(ServiceError::Rejected(format!("no deal with id {id}")));
        }
        state
            .deal
            .check_counter_offer(price)
            .map_err(|e| ServiceError::Rejected(e.to_string()))?;
        state.deal.history.push(OfferEntry {
            price,
            offered_by: self.user_id.clone(),
            timestamp: now_millis(),
        });
        state.deal.current_offer = price;
        state.deal.last_offer_by = self.user_id.clone();
        // A fresh counter-offer winds the clock forward a day.
        state.deal.expires_at = now_millis() + 86_400_000;
        debug!(user = %self.user_id, price, "counter-offer applied");
        Ok(state.deal.clone())
    }

    async fn accept(&self, id: &str) -> Result<DealSnapshot, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if state.deal.id != id {
            return Err(ServiceError::Rejected(format!("no deal with id {id}")));
        }
        state
            .deal
            .check_accept(&self.user_id)
            .map_err(|e| ServiceError::Rejected(e.to_string()))?;
        state.deal.status = DealStatus::Accepted;
        debug!(user = %self.user_id, "deal accepted");
        Ok(state.deal.clone())
    }

    async fn reject(&self, id: &str) -> Result<DealSnapshot, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if state.deal.id != id {
            return Err(ServiceError::Rejected(format!("no deal with id {id}")));
        }
        state
            .deal
            .check_reject()
            .map_err(|e| ServiceError::Rejected(e.to_string()))?;
        state.deal.status = DealStatus::Rejected;
        debug!(user = %self.user_id, "deal rejected");
        Ok(state.deal.clone())
    }
}

/// In-process realtime socket: client frames mutate server state under the
/// lock and fan out as room-scoped server frames.
pub struct LocalSocket {
    state: Arc<Mutex<ServerState>>,
    inbound_tx: mpsc::UnboundedSender<ServerFrame>,
    inbound_rx: mpsc::UnboundedReceiver<ServerFrame>,
}

#[async_trait]
impl RealtimeTransport for LocalSocket {
    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&mut self, frame: ClientFrame) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        match frame {
            ClientFrame::Join { conversation_id } => {
                state
                    .rooms
                    .entry(conversation_id)
                    .or_default()
                    .push(self.inbound_tx.clone());
            }
            ClientFrame::SendMessage {
                conversation_id,
                sender_id,
                correlation_id,
                content,
                kind,
            } => {
                let message = Message {
                    id: format!("msg-{}", state.next_message_id),
                    correlation_id: Some(correlation_id),
                    sender_id,
                    content,
                    kind,
                    read: false,
                    timestamp: now_millis(),
                    delivery: Delivery::Confirmed,
                };
                state.next_message_id += 1;
                state.conversation.messages.push(message.clone());
                let room = conversation_id.clone();
                state.broadcast(
                    &room,
                    ServerFrame::NewMessage {
                        conversation_id,
                        message,
                    },
                );
            }
            ClientFrame::MarkRead {
                conversation_id,
                user_id,
            } => {
                for message in &mut state.conversation.messages {
                    if message.sender_id != user_id {
                        message.read = true;
                    }
                }
                let room = conversation_id.clone();
                state.broadcast(
                    &room,
                    ServerFrame::MessagesRead {
                        conversation_id,
                        reader_id: user_id,
                    },
                );
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError> {
        Ok(self.inbound_rx.recv().await)
    }

    async fn close(&mut self) {
        self.inbound_rx.close();
    }
}
