pub use thiserror::Error;

use crate::status::DealStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DealError {
    #[error("deal is {0:?}, not PENDING")]
    NotPending(DealStatus),
    #[error("counter-offer price must be positive, got {0}")]
    InvalidPrice(f64),
    #[error("cannot accept your own outstanding offer")]
    OwnOffer,
}
