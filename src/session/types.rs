use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeSet;

// ==========================================
// SUBSCRIPTIONS
// ==========================================

/// How a subscription narrows the message stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Equality/wildcard match on the message tag ("*", "a || b").
    Tag,
    /// Predicate expression evaluated broker-side (SQL-like).
    Expression,
}

/// One active consumer binding. At most one exists per session.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub group: String,
    pub topic: String,
    pub filter: FilterKind,
    pub expression: String,
}

// ==========================================
// MESSAGES
// ==========================================

/// A produced or received message row, keyed by its queryable id.
/// The id prefers the store-host/commit-log derivation and falls back
/// to the broker-assigned id.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: String,
    pub topic: String,
    pub tag: String,
    /// Wall-clock label at send/arrival time (HH:MM:SS).
    pub time: String,
    pub body: Bytes,
}

/// Full detail of a message looked up by id.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDetail {
    /// Resolved queryable id (same fallback rule as `MessageRecord`).
    pub id: String,
    /// Broker-assigned id, kept for reference.
    pub msg_id: String,
    pub topic: String,
    pub tag: String,
    pub keys: Option<String>,
    pub store_host: Option<String>,
    pub queue_id: u32,
    pub queue_offset: u64,
    pub born_at_ms: u64,
    pub store_at_ms: u64,
    pub body: Bytes,
}

impl MessageDetail {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

// ==========================================
// ADMIN VIEWS
// ==========================================

/// Combined group health view: who is consuming and how far behind.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub online_clients: BTreeSet<String>,
    pub total_lag: u64,
}

/// Reset every queue of `topic` for `group` to the offset nearest
/// `timestamp_ms`. Irreversible.
#[derive(Debug, Clone)]
pub struct OffsetResetRequest {
    pub topic: String,
    pub group: String,
    pub timestamp_ms: u64,
    /// Apply even while consumers are online.
    pub force: bool,
}

// ==========================================
// MONITORING
// ==========================================

/// One sample of cumulative topic offset.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorPoint {
    /// Wall-clock label (HH:MM:SS) of the firing.
    pub label: String,
    /// Sum of max offsets across all queues of the monitored topic.
    pub total_offset: u64,
}
