pub use thiserror::Error;

use mandi_deal::DealError;

use crate::collaborators::ServiceError;

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("message content is empty")]
    EmptyMessage,
    #[error(transparent)]
    Deal(#[from] DealError),
    #[error("conversation has no linked deal")]
    NoLinkedDeal,
    #[error("send failed for message {provisional_id}: {reason}")]
    SendFailed {
        provisional_id: String,
        reason: String,
    },
    #[error("{operation} did not complete within the request timeout")]
    Timeout { operation: &'static str },
    #[error("{operation} failed: {reason}")]
    RequestFailed {
        operation: &'static str,
        reason: String,
    },
    /// The server refused a deal action because its state moved first, e.g.
    /// the other party already accepted. Carries the server's message verbatim.
    #[error("deal action refused by server: {0}")]
    Conflict(String),
    #[error("session is closed")]
    SessionClosed,
}

impl NegotiationError {
    pub(crate) fn from_service(operation: &'static str, err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected(message) => NegotiationError::Conflict(message),
            ServiceError::Unavailable(reason) => {
                NegotiationError::RequestFailed { operation, reason }
            }
        }
    }
}
