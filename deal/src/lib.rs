//! Deal lifecycle rules for mandi negotiations.
//!
//! A deal is a priced negotiation between exactly two parties over one crop
//! lot. The authoritative copy lives on the server; this crate only encodes
//! which actions are legal against a cached snapshot and how much time is
//! left on the clock. It performs no I/O.

mod clock;
mod error;
mod status;

pub use clock::Countdown;
pub use error::DealError;
pub use status::{DealPermissions, DealSnapshot, DealStatus, OfferEntry};
