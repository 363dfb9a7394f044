//! Realtime negotiation engine for the mandi marketplace client.
//!
//! One [`NegotiationSession`] owns everything for one open conversation: the
//! cached deal snapshot, the message reconciliation buffer, the realtime
//! channel, and the expiry timer. All mutation happens on the single task
//! that drives the session, so there are no locks and no second writer for a
//! conversation id.
//!
//! External collaborators (chat history, deal service, realtime transport)
//! are consumed through the ports in [`collaborators`] and [`channel`]; the
//! engine defines event and field names but no transport.

mod channel;
mod collaborators;
mod context;
mod errors;
mod reconcile;
mod session;
mod types;
mod utils;

pub use channel::{ChannelConfig, RealtimeChannel, RealtimeTransport, TransportError};
pub use collaborators::{ChatHistoryService, DealService, ServiceError};
pub use context::{SessionConfig, SessionContext};
pub use errors::NegotiationError;
pub use reconcile::MessageBuffer;
pub use session::{NegotiationSession, SessionUpdate};
pub use types::{
    ChannelEvent, ClientFrame, ConversationSnapshot, Delivery, Message, MessageKind, Participant,
    Role, ServerFrame,
};
