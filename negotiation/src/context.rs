use std::time::Duration;

use crate::channel::ChannelConfig;

/// Identity for one session, resolved once at construction instead of being
/// re-read from ambient storage on every call.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Bound on every external request; a timed-out action is reported
    /// failed, never silently retried.
    pub request_timeout: Duration,
    pub channel: ChannelConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            channel: ChannelConfig::default(),
        }
    }
}
