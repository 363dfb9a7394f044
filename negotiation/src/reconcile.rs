use tracing::debug;

use crate::types::{Delivery, Message, MessageKind};
use crate::utils::{generate_entry_id, timestamp_millis};

/// Ordered message list for one conversation, merging locally optimistic
/// sends with server-confirmed messages.
///
/// Invariant: exactly one representation of each logical message exists at
/// any time, under any interleaving of local sends and inbound confirmations.
/// Confirmed messages keep the order the server emitted them in; the buffer
/// never reorders.
#[derive(Debug)]
pub struct MessageBuffer {
    self_id: String,
    messages: Vec<Message>,
}

impl MessageBuffer {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            messages: Vec::new(),
        }
    }

    /// Seed the buffer with server-given history, in server order. All
    /// entries are confirmed; any stray optimistic flag is discarded.
    pub fn seed(&mut self, history: Vec<Message>) {
        self.messages = history;
        for message in &mut self.messages {
            message.delivery = Delivery::Confirmed;
        }
    }

    /// Insert a locally sent message at the tail, flagged optimistic, before
    /// any server contact. Returns the provisional id; the correlation id is
    /// what the transport must echo back in the confirmation event.
    pub fn append_optimistic(&mut self, content: String, kind: MessageKind) -> Message {
        let message = Message {
            id: generate_entry_id(),
            correlation_id: Some(generate_entry_id()),
            sender_id: self.self_id.clone(),
            content,
            kind,
            read: false,
            timestamp: timestamp_millis(),
            delivery: Delivery::Optimistic,
        };
        self.messages.push(message.clone());
        message
    }

    /// Fold one server-confirmed message into the buffer.
    ///
    /// If its correlation id matches one of our in-flight optimistic entries,
    /// that entry is removed and the confirmed form appended at the tail.
    /// Anything else is appended as a new inbound message, including a
    /// confirmation we cannot match; an unmatched confirmation is never
    /// dropped and never clears unrelated optimistic entries.
    pub fn reconcile_incoming(&mut self, mut incoming: Message) {
        incoming.delivery = Delivery::Confirmed;

        if incoming.sender_id == self.self_id {
            if let Some(tag) = incoming.correlation_id.as_deref() {
                let matched = self.messages.iter().position(|m| {
                    m.is_optimistic() && m.correlation_id.as_deref() == Some(tag)
                });
                if let Some(index) = matched {
                    self.messages.remove(index);
                } else {
                    debug!(correlation_id = tag, "unmatched confirmation, keeping as inbound");
                }
            }
        }

        self.messages.push(incoming);
    }

    /// Flip the read flag on every message not authored by `reader_id`.
    /// False→true only, so repeated receipts are idempotent.
    pub fn mark_read(&mut self, reader_id: &str) {
        for message in &mut self.messages {
            if message.sender_id != reader_id {
                message.read = true;
            }
        }
    }

    /// Park an optimistic entry as failed. It stays visible; re-sending is an
    /// explicit caller action, never automatic.
    pub fn mark_failed(&mut self, provisional_id: &str) {
        if let Some(message) = self
            .messages
            .iter_mut()
            .find(|m| m.is_optimistic() && m.id == provisional_id)
        {
            message.delivery = Delivery::Failed;
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn failed(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_failed())
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_optimistic()).count()
    }
}
