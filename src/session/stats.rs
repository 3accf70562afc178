use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for one push-to-talk session owner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeStats {
    /// Recording sessions started
    pub sessions: usize,

    /// Payloads handed to the client for transmission
    pub payloads_sent: usize,

    /// Total bytes of those payloads
    pub bytes_sent: usize,

    /// Payloads that were not sent (empty, or client not connected)
    pub payloads_dropped: usize,

    /// When the most recent payload was sent
    pub last_sent_at: Option<DateTime<Utc>>,
}
