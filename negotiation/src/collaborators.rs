//! Ports for the external collaborator services the engine consumes.
//!
//! Transport and wire format live with the surrounding system; the engine
//! only needs these request/response shapes.

use async_trait::async_trait;
use thiserror::Error;

use mandi_deal::DealSnapshot;

use crate::types::ConversationSnapshot;

#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// The request never completed (network, server down).
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The server understood the request and refused it. Carries the
    /// server's business-rule message verbatim.
    #[error("{0}")]
    Rejected(String),
}

#[async_trait]
pub trait ChatHistoryService: Send + Sync {
    async fn conversation(&self, id: &str) -> Result<ConversationSnapshot, ServiceError>;

    /// Store image bytes and return the stored reference to send as message
    /// content.
    async fn upload_image(&self, bytes: &[u8]) -> Result<String, ServiceError>;
}

/// Every deal action returns a whole new authoritative snapshot; callers
/// replace their cached copy wholesale rather than patching fields.
#[async_trait]
pub trait DealService: Send + Sync {
    async fn deal(&self, id: &str) -> Result<DealSnapshot, ServiceError>;

    async fn counter_offer(&self, id: &str, price: f64) -> Result<DealSnapshot, ServiceError>;

    async fn accept(&self, id: &str) -> Result<DealSnapshot, ServiceError>;

    async fn reject(&self, id: &str) -> Result<DealSnapshot, ServiceError>;
}
