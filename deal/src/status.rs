use serde::{Deserialize, Serialize};

use crate::error::DealError;

/// Lifecycle status of a deal. Transitions are one-directional: once a deal
/// leaves `Pending` it never comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl DealStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DealStatus::Pending)
    }
}

/// One entry in a deal's price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferEntry {
    pub price: f64,
    pub offered_by: String,
    pub timestamp: i64,
}

/// Cached snapshot of a deal as last reported by the server.
///
/// The client never transitions a deal itself; it requests an action and
/// replaces the whole snapshot with whatever the server returns. The server
/// maintains the invariants that `current_offer` equals the price of the last
/// history entry and `last_offer_by` its offerer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealSnapshot {
    pub id: String,
    pub crop_name: String,
    pub quantity_kg: u64,
    pub original_price: f64,
    pub current_offer: f64,
    pub status: DealStatus,
    pub last_offer_by: String,
    pub expires_at: i64,
    pub history: Vec<OfferEntry>,
    pub created_at: i64,
}

/// What a given viewer is allowed to do with a deal, derived purely from
/// status and the identity of the last offerer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealPermissions {
    pub can_accept: bool,
    pub can_counter: bool,
    pub can_reject: bool,
    pub can_download_settlement: bool,
}

impl DealSnapshot {
    pub fn last_entry(&self) -> Option<&OfferEntry> {
        self.history.last()
    }

    /// Pre-flight check for a counter-offer request. Mutates nothing.
    pub fn check_counter_offer(&self, price: f64) -> Result<(), DealError> {
        if self.status != DealStatus::Pending {
            return Err(DealError::NotPending(self.status));
        }
        if price <= 0.0 {
            return Err(DealError::InvalidPrice(price));
        }
        Ok(())
    }

    /// Pre-flight check for accepting the outstanding offer. You cannot
    /// accept an offer you made yourself.
    pub fn check_accept(&self, actor: &str) -> Result<(), DealError> {
        if self.status != DealStatus::Pending {
            return Err(DealError::NotPending(self.status));
        }
        if self.last_offer_by == actor {
            return Err(DealError::OwnOffer);
        }
        Ok(())
    }

    /// Pre-flight check for rejecting the deal. Any party may reject while
    /// the deal is still open.
    pub fn check_reject(&self) -> Result<(), DealError> {
        if self.status != DealStatus::Pending {
            return Err(DealError::NotPending(self.status));
        }
        Ok(())
    }

    /// Locally coerce a pending deal to `Expired` once its clock has run out.
    ///
    /// This is a cosmetic inference; the server's status on the next fetch is
    /// authoritative and may already reflect it. Terminal states are left
    /// untouched.
    pub fn expire_locally(&mut self) {
        if self.status == DealStatus::Pending {
            self.status = DealStatus::Expired;
        }
    }

    pub fn permissions(&self, viewer: &str) -> DealPermissions {
        let pending = self.status == DealStatus::Pending;
        DealPermissions {
            can_accept: pending && self.last_offer_by != viewer,
            can_counter: pending,
            can_reject: pending,
            can_download_settlement: self.status == DealStatus::Accepted,
        }
    }
}
