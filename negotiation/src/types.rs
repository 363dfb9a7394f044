use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

/// Delivery state of a message as this client sees it.
///
/// A message is born `Optimistic` on a local send, becomes `Confirmed` when
/// the server's push event round-trips back, and is parked at `Failed` when
/// the send never made it out. Failed messages stay in the buffer so the
/// caller can offer an explicit resend; nothing retries them automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Confirmed,
    Optimistic,
    Failed,
}

/// One chat entry. While optimistic, `id` is a client-generated provisional
/// id; once confirmed it is the server-assigned id. `correlation_id` is the
/// client tag the transport echoes back so reconciliation can match the
/// confirmation to exactly one optimistic entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub read: bool,
    pub timestamp: i64,
    #[serde(default = "confirmed")]
    pub delivery: Delivery,
}

fn confirmed() -> Delivery {
    Delivery::Confirmed
}

impl Message {
    pub fn is_optimistic(&self) -> bool {
        self.delivery == Delivery::Optimistic
    }

    pub fn is_failed(&self) -> bool {
        self.delivery == Delivery::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Seller,
    Buyer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub role: Role,
}

/// Conversation as fetched from the chat history service: the fixed
/// participant pair, server-ordered message history, and at most one linked
/// deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub id: String,
    pub participants: Vec<Participant>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_deal_id: Option<String>,
}

/// Client → server frames on the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Join {
        conversation_id: String,
    },
    SendMessage {
        conversation_id: String,
        sender_id: String,
        correlation_id: String,
        content: String,
        kind: MessageKind,
    },
    MarkRead {
        conversation_id: String,
        user_id: String,
    },
}

/// Server → client frames, scoped to the joined conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    NewMessage {
        conversation_id: String,
        message: Message,
    },
    MessagesRead {
        conversation_id: String,
        reader_id: String,
    },
}

/// The narrow inbound event interface the channel adapter exposes upward.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(Message),
    Read { reader_id: String },
    ConnectionLost(String),
}
