//! Transport seam: the contracts a cluster SDK binding must implement.
//!
//! The console core never touches wire bytes. Everything below is the
//! operation surface of the three clients (admin, producer, push consumer)
//! plus the connector that binds them to one discovery address.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::errors::ConsoleError;
use crate::session::types::Subscription;

// ==========================================
// WIRE-FACING DATA
// ==========================================

/// Offsets of one queue of a topic. A point-in-time read, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStat {
    pub min_offset: u64,
    pub max_offset: u64,
}

/// Queue id -> offsets for every queue of a topic.
pub type TopicStatsSnapshot = BTreeMap<u32, QueueStat>;

/// Cluster metadata as reported by the discovery service.
#[derive(Debug, Clone, Default)]
pub struct ClusterInfo {
    /// Cluster name -> broker names in that cluster.
    pub clusters: BTreeMap<String, Vec<String>>,
    /// Broker name -> master broker address.
    pub brokers: BTreeMap<String, String>,
}

/// Delivery result of a single publish.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Locally generated id, always present.
    pub msg_id: String,
    /// Broker-side globally unique id, directly queryable. Preferred.
    pub offset_msg_id: Option<String>,
    pub queue_id: u32,
    pub queue_offset: u64,
}

/// A message as handed over by the broker, before id resolution.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub msg_id: String,
    pub topic: String,
    pub tag: String,
    pub keys: Option<String>,
    pub body: Bytes,
    pub store_host: Option<String>,
    pub commit_log_offset: Option<u64>,
    pub queue_id: u32,
    pub queue_offset: u64,
    pub born_at_ms: u64,
    pub store_at_ms: u64,
}

/// One push delivery. The whole batch is acknowledged at once, after
/// every message in it has been handed to the observer.
#[derive(Debug, Clone)]
pub struct MessageBatch {
    pub id: u64,
    pub messages: Vec<RawMessage>,
}

// ==========================================
// CLIENT CONTRACTS
// ==========================================

/// Management surface of the discovery/admin client.
/// Every call is a network round-trip that may block.
#[async_trait]
pub trait AdminTransport: Send + Sync {
    async fn fetch_topics(&self) -> Result<BTreeSet<String>, ConsoleError>;

    async fn cluster_info(&self) -> Result<ClusterInfo, ConsoleError>;

    /// Subscription-group table of one broker.
    async fn subscription_groups(&self, broker_addr: &str)
        -> Result<BTreeSet<String>, ConsoleError>;

    async fn topic_stats(&self, topic: &str) -> Result<TopicStatsSnapshot, ConsoleError>;

    /// Addresses of the clients currently consuming `group`.
    async fn consumer_connections(&self, group: &str)
        -> Result<BTreeSet<String>, ConsoleError>;

    /// Sum of per-queue consumer-offset deficits for `group`.
    async fn consume_lag(&self, group: &str) -> Result<u64, ConsoleError>;

    /// Atomic from the caller's perspective: applies fully or fails.
    async fn reset_offset(
        &self,
        topic: &str,
        group: &str,
        timestamp_ms: u64,
        force: bool,
    ) -> Result<(), ConsoleError>;

    async fn create_topic(
        &self,
        cluster: &str,
        topic: &str,
        queues: u32,
    ) -> Result<(), ConsoleError>;

    async fn view_message(&self, id: &str) -> Result<RawMessage, ConsoleError>;

    async fn shutdown(&self) -> Result<(), ConsoleError>;
}

/// Single outbound publish client bound to one broker address.
#[async_trait]
pub trait ProducerTransport: Send + Sync {
    /// Single synchronous publish. No automatic retry at this layer.
    async fn send(&self, topic: &str, tag: &str, body: Bytes)
        -> Result<SendReceipt, ConsoleError>;

    async fn shutdown(&self) -> Result<(), ConsoleError>;
}

/// Push subscription client. A shut-down client cannot be reused;
/// callers allocate a fresh one per subscription.
#[async_trait]
pub trait ConsumerTransport: Send + Sync {
    /// Registers the subscription and returns the stream of broker batches.
    /// Rejects malformed filter expressions.
    async fn subscribe(&self, sub: &Subscription)
        -> Result<mpsc::UnboundedReceiver<MessageBatch>, ConsoleError>;

    /// Marks a delivered batch as successfully consumed.
    async fn ack(&self, batch_id: u64) -> Result<(), ConsoleError>;

    async fn shutdown(&self) -> Result<(), ConsoleError>;
}

/// Factory binding the three clients to one discovery address.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn admin(&self, address: &str)
        -> Result<Arc<dyn AdminTransport>, ConsoleError>;

    async fn producer(&self, address: &str, group: &str)
        -> Result<Arc<dyn ProducerTransport>, ConsoleError>;

    async fn consumer(&self, address: &str, group: &str)
        -> Result<Arc<dyn ConsumerTransport>, ConsoleError>;
}
