//! Admin Client Facade: read/write management calls against the
//! discovery service, plus the pure dead-letter name derivation.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ResetConfig;
use crate::errors::ConsoleError;
use crate::session::types::{GroupStatus, MessageDetail, OffsetResetRequest};
use crate::transport::{AdminTransport, RawMessage, TopicStatsSnapshot};
use crate::utils::msg_id;

/// Fixed prefix the broker uses for dead-letter topics of a group.
pub const DLQ_TOPIC_PREFIX: &str = "%DLQ%";

/// Name of the dead-letter topic for `group`. Pure, no network call.
pub fn dead_letter_topic_for(group: &str) -> String {
    format!("{}{}", DLQ_TOPIC_PREFIX, group)
}

#[derive(Clone)]
pub struct AdminFacade {
    transport: Arc<dyn AdminTransport>,
    reset: ResetConfig,
    topic_queue_count: u32,
}

impl AdminFacade {
    pub(crate) fn new(
        transport: Arc<dyn AdminTransport>,
        reset: ResetConfig,
        topic_queue_count: u32,
    ) -> Self {
        Self { transport, reset, topic_queue_count }
    }

    pub async fn list_topics(&self) -> Result<BTreeSet<String>, ConsoleError> {
        self.transport.fetch_topics().await
    }

    /// Derived from the subscription-group table of the first registered
    /// broker. Fails when the cluster has no broker at all.
    pub async fn list_consumer_groups(&self) -> Result<BTreeSet<String>, ConsoleError> {
        let info = self.transport.cluster_info().await?;
        let Some(broker_addr) = info.brokers.values().next() else {
            return Err(ConsoleError::NoBrokerAvailable);
        };
        self.transport.subscription_groups(broker_addr).await
    }

    pub async fn topic_stats(&self, topic: &str) -> Result<TopicStatsSnapshot, ConsoleError> {
        self.transport.topic_stats(topic).await
    }

    pub async fn consumer_connections(&self, group: &str) -> Result<BTreeSet<String>, ConsoleError> {
        self.transport.consumer_connections(group).await
    }

    /// Total consume lag of a group: sum of per-queue offset deficits.
    pub async fn consume_stats(&self, group: &str) -> Result<u64, ConsoleError> {
        self.transport.consume_lag(group).await
    }

    /// Combined health view: online clients + total lag.
    pub async fn group_status(&self, group: &str) -> Result<GroupStatus, ConsoleError> {
        let online_clients = self.transport.consumer_connections(group).await?;
        let total_lag = self.transport.consume_lag(group).await?;
        Ok(GroupStatus { online_clients, total_lag })
    }

    /// Rewind every queue of the topic to the offset nearest the timestamp.
    /// With `force` off, a group with online consumers is refused.
    pub async fn reset_offset(&self, req: OffsetResetRequest) -> Result<(), ConsoleError> {
        if !req.force {
            let online = self.transport.consumer_connections(&req.group).await?;
            if !online.is_empty() {
                return Err(ConsoleError::ResetRefused { group: req.group });
            }
        }
        self.transport
            .reset_offset(&req.topic, &req.group, req.timestamp_ms, req.force)
            .await
    }

    /// Total messages parked in the group's dead-letter topic.
    pub async fn dead_letter_depth(&self, group: &str) -> Result<u64, ConsoleError> {
        let stats = self.transport.topic_stats(&dead_letter_topic_for(group)).await?;
        Ok(stats.values().map(|q| q.max_offset).sum())
    }

    /// Creates the topic on the first available cluster.
    pub async fn create_topic(&self, name: &str) -> Result<(), ConsoleError> {
        let info = self.transport.cluster_info().await?;
        let Some(cluster) = info.clusters.keys().next() else {
            return Err(ConsoleError::NoCluster);
        };
        self.transport
            .create_topic(cluster, name, self.topic_queue_count)
            .await
    }

    pub async fn lookup_message(&self, id: &str) -> Result<MessageDetail, ConsoleError> {
        let raw = self.transport.view_message(id).await?;
        Ok(detail_from_raw(raw))
    }

    pub(crate) async fn shutdown(&self) -> Result<(), ConsoleError> {
        self.transport.shutdown().await
    }
}

fn detail_from_raw(raw: RawMessage) -> MessageDetail {
    let id = raw
        .store_host
        .as_deref()
        .zip(raw.commit_log_offset)
        .and_then(|(host, offset)| msg_id::encode(host, offset))
        .unwrap_or_else(|| raw.msg_id.clone());
    MessageDetail {
        id,
        msg_id: raw.msg_id,
        topic: raw.topic,
        tag: raw.tag,
        keys: raw.keys,
        store_host: raw.store_host,
        queue_id: raw.queue_id,
        queue_offset: raw.queue_offset,
        born_at_ms: raw.born_at_ms,
        store_at_ms: raw.store_at_ms,
        body: raw.body,
    }
}
