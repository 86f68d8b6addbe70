//! In-memory cluster: a single-broker simulation of the admin, publish
//! and push-subscribe surfaces.
//!
//! Backs the integration tests and local demos. State layout mirrors the
//! real thing: topics own numbered queues with min/max offsets, groups own
//! per-queue committed offsets and an online-client set, and every stored
//! message is indexed by both its broker id and its queryable offset id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::ConsoleError;
use crate::session::types::{FilterKind, Subscription};
use crate::transport::{
    AdminTransport, BrokerConnector, ClusterInfo, ConsumerTransport, MessageBatch,
    ProducerTransport, QueueStat, RawMessage, SendReceipt, TopicStatsSnapshot,
};
use crate::utils::msg_id;
use crate::utils::utils_time::current_time_ms;

// ==========================================
// CLUSTER STATE
// ==========================================

pub struct MemoryCluster {
    state: Arc<ClusterState>,
}

struct ClusterState {
    /// Discovery address the connector accepts.
    address: String,
    cluster_name: String,
    broker_name: String,
    /// Store host stamped on messages; must be plain ip:port so the
    /// offset-id derivation works.
    broker_addr: String,
    reachable: AtomicBool,
    /// When false the cluster reports empty metadata tables.
    has_metadata: AtomicBool,
    commit_log: AtomicU64,
    next_id: AtomicU64,
    topics: DashMap<String, TopicState>,
    groups: DashMap<String, GroupState>,
    by_id: DashMap<String, RawMessage>,
    subs: DashMap<u64, ActiveSub>,
    /// Batch id -> offset cursor to commit on ack.
    pending: DashMap<u64, AckCursor>,
}

struct TopicState {
    queues: Vec<RwLock<QueueLog>>,
    next_queue: AtomicUsize,
}

struct QueueLog {
    base: u64,
    entries: Vec<RawMessage>,
}

impl QueueLog {
    fn max_offset(&self) -> u64 {
        self.base + self.entries.len() as u64
    }
}

#[derive(Default)]
struct GroupState {
    /// (topic, queue id) -> committed offset.
    committed: HashMap<(String, u32), u64>,
    online: BTreeSet<String>,
}

struct ActiveSub {
    group: String,
    topic: String,
    filter: CompiledFilter,
    sender: mpsc::UnboundedSender<MessageBatch>,
}

struct AckCursor {
    group: String,
    topic: String,
    queue_id: u32,
    next_offset: u64,
}

impl MemoryCluster {
    pub fn new(address: &str) -> Self {
        Self {
            state: Arc::new(ClusterState {
                address: address.to_string(),
                cluster_name: "DefaultCluster".to_string(),
                broker_name: "broker-a".to_string(),
                broker_addr: "10.0.0.1:10911".to_string(),
                reachable: AtomicBool::new(true),
                has_metadata: AtomicBool::new(true),
                commit_log: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                topics: DashMap::new(),
                groups: DashMap::new(),
                by_id: DashMap::new(),
                subs: DashMap::new(),
                pending: DashMap::new(),
            }),
        }
    }

    pub fn connector(&self) -> Arc<dyn BrokerConnector> {
        Arc::new(MemoryConnector { state: self.state.clone() })
    }

    /// Seed a topic without going through the admin client.
    pub fn create_topic(&self, name: &str, queues: u32) {
        self.state.ensure_topic(name, queues);
    }

    /// Seed a subscription group without starting a consumer.
    pub fn register_group(&self, name: &str) {
        self.state.groups.entry(name.to_string()).or_default();
    }

    /// Simulate the discovery service going down (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Simulate a cluster whose metadata tables are empty.
    pub fn clear_cluster_metadata(&self) {
        self.state.has_metadata.store(false, Ordering::SeqCst);
    }
}

impl ClusterState {
    fn check_reachable(&self, op: &'static str) -> Result<(), ConsoleError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConsoleError::transport(op, "discovery service unreachable"))
        }
    }

    fn ensure_topic(&self, name: &str, queues: u32) {
        self.topics.entry(name.to_string()).or_insert_with(|| TopicState {
            queues: (0..queues.max(1))
                .map(|_| RwLock::new(QueueLog { base: 0, entries: Vec::new() }))
                .collect(),
            next_queue: AtomicUsize::new(0),
        });
    }

    fn store(&self, topic: &str, tag: &str, body: Bytes) -> Result<RawMessage, ConsoleError> {
        let topic_state = self
            .topics
            .get(topic)
            .ok_or_else(|| ConsoleError::transport("publish", format!("topic '{}' not found", topic)))?;

        let queue_id =
            (topic_state.next_queue.fetch_add(1, Ordering::Relaxed) % topic_state.queues.len()) as u32;
        let commit_log_offset = self
            .commit_log
            .fetch_add(body.len() as u64 + 64, Ordering::SeqCst);
        let now = current_time_ms();

        let mut queue = topic_state.queues[queue_id as usize].write();
        let raw = RawMessage {
            msg_id: Uuid::new_v4().simple().to_string().to_uppercase(),
            topic: topic.to_string(),
            tag: tag.to_string(),
            keys: None,
            body,
            store_host: Some(self.broker_addr.clone()),
            commit_log_offset: Some(commit_log_offset),
            queue_id,
            queue_offset: queue.max_offset(),
            born_at_ms: now,
            store_at_ms: now,
        };
        queue.entries.push(raw.clone());
        drop(queue);

        self.by_id.insert(raw.msg_id.clone(), raw.clone());
        if let Some(offset_id) = msg_id::encode(&self.broker_addr, commit_log_offset) {
            self.by_id.insert(offset_id, raw.clone());
        }
        Ok(raw)
    }

    /// Push a stored message to every matching live subscription.
    fn fan_out(&self, raw: &RawMessage) {
        for sub in self.subs.iter() {
            if sub.topic != raw.topic || !sub.filter.matches(raw) {
                continue;
            }
            let batch_id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.pending.insert(
                batch_id,
                AckCursor {
                    group: sub.group.clone(),
                    topic: raw.topic.clone(),
                    queue_id: raw.queue_id,
                    next_offset: raw.queue_offset + 1,
                },
            );
            let batch = MessageBatch { id: batch_id, messages: vec![raw.clone()] };
            if sub.sender.send(batch).is_err() {
                self.pending.remove(&batch_id);
            }
        }
    }

    fn commit(&self, cursor: AckCursor) {
        if let Some(mut group) = self.groups.get_mut(&cursor.group) {
            let slot = group
                .committed
                .entry((cursor.topic, cursor.queue_id))
                .or_insert(0);
            *slot = (*slot).max(cursor.next_offset);
        }
    }
}

// ==========================================
// FILTERS
// ==========================================

enum CompiledFilter {
    All,
    Tags(BTreeSet<String>),
    /// `PROPERTY = 'value'` predicate. Only TAGS is a known property.
    Eq { property: String, value: String },
}

impl CompiledFilter {
    fn compile(kind: FilterKind, expression: &str) -> Result<Self, String> {
        match kind {
            FilterKind::Tag => {
                let expr = expression.trim();
                if expr.is_empty() || expr == "*" {
                    return Ok(Self::All);
                }
                let tags = expr.split("||").map(|t| t.trim().to_string()).collect();
                Ok(Self::Tags(tags))
            }
            FilterKind::Expression => {
                let expr = expression.trim();
                let (lhs, rhs) = expr
                    .split_once('=')
                    .ok_or_else(|| format!("invalid filter expression: '{}'", expr))?;
                let property = lhs.trim();
                let rhs = rhs.trim();
                if property.is_empty()
                    || !property.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(format!("invalid filter property: '{}'", property));
                }
                let value = rhs
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .ok_or_else(|| format!("filter value must be quoted: '{}'", rhs))?;
                Ok(Self::Eq {
                    property: property.to_uppercase(),
                    value: value.to_string(),
                })
            }
        }
    }

    fn matches(&self, raw: &RawMessage) -> bool {
        match self {
            Self::All => true,
            Self::Tags(tags) => tags.contains(&raw.tag),
            Self::Eq { property, value } => property == "TAGS" && raw.tag == *value,
        }
    }
}

// ==========================================
// CONNECTOR
// ==========================================

struct MemoryConnector {
    state: Arc<ClusterState>,
}

impl MemoryConnector {
    fn check_address(&self, op: &'static str, address: &str) -> Result<(), ConsoleError> {
        self.state.check_reachable(op)?;
        if address == self.state.address {
            Ok(())
        } else {
            Err(ConsoleError::transport(op, format!("unknown discovery address '{}'", address)))
        }
    }
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn admin(&self, address: &str) -> Result<Arc<dyn AdminTransport>, ConsoleError> {
        self.check_address("admin connect", address)?;
        Ok(Arc::new(MemoryAdmin { state: self.state.clone() }))
    }

    async fn producer(
        &self,
        address: &str,
        group: &str,
    ) -> Result<Arc<dyn ProducerTransport>, ConsoleError> {
        self.check_address("producer connect", address)?;
        Ok(Arc::new(MemoryProducer { state: self.state.clone(), group: group.to_string() }))
    }

    async fn consumer(
        &self,
        address: &str,
        group: &str,
    ) -> Result<Arc<dyn ConsumerTransport>, ConsoleError> {
        self.check_address("consumer connect", address)?;
        let port = 52000 + self.state.next_id.fetch_add(1, Ordering::SeqCst) % 10000;
        Ok(Arc::new(MemoryConsumer {
            state: self.state.clone(),
            group: group.to_string(),
            client_addr: format!("127.0.0.1:{}", port),
            sub_id: Mutex::new(None),
        }))
    }
}

// ==========================================
// ADMIN
// ==========================================

struct MemoryAdmin {
    state: Arc<ClusterState>,
}

#[async_trait]
impl AdminTransport for MemoryAdmin {
    async fn fetch_topics(&self) -> Result<BTreeSet<String>, ConsoleError> {
        self.state.check_reachable("fetch topics")?;
        Ok(self.state.topics.iter().map(|t| t.key().clone()).collect())
    }

    async fn cluster_info(&self) -> Result<ClusterInfo, ConsoleError> {
        self.state.check_reachable("cluster info")?;
        if !self.state.has_metadata.load(Ordering::SeqCst) {
            return Ok(ClusterInfo::default());
        }
        let mut info = ClusterInfo::default();
        info.clusters
            .insert(self.state.cluster_name.clone(), vec![self.state.broker_name.clone()]);
        info.brokers
            .insert(self.state.broker_name.clone(), self.state.broker_addr.clone());
        Ok(info)
    }

    async fn subscription_groups(
        &self,
        broker_addr: &str,
    ) -> Result<BTreeSet<String>, ConsoleError> {
        self.state.check_reachable("subscription groups")?;
        if broker_addr != self.state.broker_addr {
            return Err(ConsoleError::transport(
                "subscription groups",
                format!("no broker at '{}'", broker_addr),
            ));
        }
        Ok(self.state.groups.iter().map(|g| g.key().clone()).collect())
    }

    async fn topic_stats(&self, topic: &str) -> Result<TopicStatsSnapshot, ConsoleError> {
        self.state.check_reachable("topic stats")?;
        let topic_state = self
            .state
            .topics
            .get(topic)
            .ok_or_else(|| ConsoleError::transport("topic stats", format!("topic '{}' not found", topic)))?;
        let mut snapshot = BTreeMap::new();
        for (queue_id, queue) in topic_state.queues.iter().enumerate() {
            let queue = queue.read();
            snapshot.insert(
                queue_id as u32,
                QueueStat { min_offset: queue.base, max_offset: queue.max_offset() },
            );
        }
        Ok(snapshot)
    }

    async fn consumer_connections(&self, group: &str) -> Result<BTreeSet<String>, ConsoleError> {
        self.state.check_reachable("consumer connections")?;
        let group = self
            .state
            .groups
            .get(group)
            .ok_or_else(|| ConsoleError::transport("consumer connections", format!("group '{}' not found", group)))?;
        Ok(group.online.clone())
    }

    async fn consume_lag(&self, group_name: &str) -> Result<u64, ConsoleError> {
        self.state.check_reachable("consume stats")?;
        let group = self
            .state
            .groups
            .get(group_name)
            .ok_or_else(|| ConsoleError::transport("consume stats", format!("group '{}' not found", group_name)))?;

        let mut lag = 0u64;
        for ((topic, queue_id), committed) in group.committed.iter() {
            if let Some(topic_state) = self.state.topics.get(topic) {
                if let Some(queue) = topic_state.queues.get(*queue_id as usize) {
                    let max = queue.read().max_offset();
                    lag += max.saturating_sub(*committed);
                }
            }
        }
        Ok(lag)
    }

    async fn reset_offset(
        &self,
        topic: &str,
        group_name: &str,
        timestamp_ms: u64,
        _force: bool,
    ) -> Result<(), ConsoleError> {
        self.state.check_reachable("reset offset")?;
        let topic_state = self
            .state
            .topics
            .get(topic)
            .ok_or_else(|| ConsoleError::transport("reset offset", format!("topic '{}' not found", topic)))?;
        let mut group = self
            .state
            .groups
            .get_mut(group_name)
            .ok_or_else(|| ConsoleError::transport("reset offset", format!("group '{}' not found", group_name)))?;

        // Whole-call atomicity: compute every target first, then apply.
        let mut targets = Vec::with_capacity(topic_state.queues.len());
        for (queue_id, queue) in topic_state.queues.iter().enumerate() {
            let queue = queue.read();
            let offset = queue
                .entries
                .iter()
                .position(|m| m.store_at_ms >= timestamp_ms)
                .map(|idx| queue.base + idx as u64)
                .unwrap_or_else(|| queue.max_offset());
            targets.push((queue_id as u32, offset));
        }
        for (queue_id, offset) in targets {
            group.committed.insert((topic.to_string(), queue_id), offset);
        }
        Ok(())
    }

    async fn create_topic(
        &self,
        cluster: &str,
        topic: &str,
        queues: u32,
    ) -> Result<(), ConsoleError> {
        self.state.check_reachable("create topic")?;
        if cluster != self.state.cluster_name {
            return Err(ConsoleError::transport(
                "create topic",
                format!("unknown cluster '{}'", cluster),
            ));
        }
        self.state.ensure_topic(topic, queues);
        Ok(())
    }

    async fn view_message(&self, id: &str) -> Result<RawMessage, ConsoleError> {
        self.state.check_reachable("view message")?;
        self.state
            .by_id
            .get(id)
            .map(|m| m.clone())
            .ok_or_else(|| ConsoleError::NotFound { id: id.to_string() })
    }

    async fn shutdown(&self) -> Result<(), ConsoleError> {
        Ok(())
    }
}

// ==========================================
// PRODUCER
// ==========================================

struct MemoryProducer {
    state: Arc<ClusterState>,
    group: String,
}

#[async_trait]
impl ProducerTransport for MemoryProducer {
    async fn send(&self, topic: &str, tag: &str, body: Bytes) -> Result<SendReceipt, ConsoleError> {
        self.state.check_reachable("send")?;
        let raw = self.state.store(topic, tag, body)?;
        self.state.fan_out(&raw);
        Ok(SendReceipt {
            msg_id: raw.msg_id.clone(),
            offset_msg_id: raw
                .store_host
                .as_deref()
                .zip(raw.commit_log_offset)
                .and_then(|(host, offset)| msg_id::encode(host, offset)),
            queue_id: raw.queue_id,
            queue_offset: raw.queue_offset,
        })
    }

    async fn shutdown(&self) -> Result<(), ConsoleError> {
        Ok(())
    }
}

// ==========================================
// CONSUMER
// ==========================================

struct MemoryConsumer {
    state: Arc<ClusterState>,
    group: String,
    client_addr: String,
    sub_id: Mutex<Option<u64>>,
}

#[async_trait]
impl ConsumerTransport for MemoryConsumer {
    async fn subscribe(
        &self,
        sub: &Subscription,
    ) -> Result<mpsc::UnboundedReceiver<MessageBatch>, ConsoleError> {
        self.state.check_reachable("subscribe")?;
        let filter = CompiledFilter::compile(sub.filter, &sub.expression)
            .map_err(|reason| ConsoleError::transport("subscribe", reason))?;
        let topic_state = self
            .state
            .topics
            .get(&sub.topic)
            .ok_or_else(|| ConsoleError::transport("subscribe", format!("topic '{}' not found", sub.topic)))?;

        {
            let mut group = self.state.groups.entry(sub.group.clone()).or_default();
            group.online.insert(self.client_addr.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();

        // Backlog first: everything past the group's committed offset,
        // one batch per queue, in queue order.
        for (queue_id, queue) in topic_state.queues.iter().enumerate() {
            let queue = queue.read();
            let committed = self
                .state
                .groups
                .get(&sub.group)
                .and_then(|g| g.committed.get(&(sub.topic.clone(), queue_id as u32)).copied())
                .unwrap_or(queue.base);
            let pending: Vec<RawMessage> = queue
                .entries
                .iter()
                .skip(committed.saturating_sub(queue.base) as usize)
                .filter(|m| filter.matches(m))
                .cloned()
                .collect();
            if pending.is_empty() {
                continue;
            }
            let batch_id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
            self.state.pending.insert(
                batch_id,
                AckCursor {
                    group: sub.group.clone(),
                    topic: sub.topic.clone(),
                    queue_id: queue_id as u32,
                    next_offset: queue.max_offset(),
                },
            );
            let _ = tx.send(MessageBatch { id: batch_id, messages: pending });
        }
        drop(topic_state);

        let sub_id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.subs.insert(
            sub_id,
            ActiveSub {
                group: sub.group.clone(),
                topic: sub.topic.clone(),
                filter,
                sender: tx,
            },
        );
        *self.sub_id.lock() = Some(sub_id);
        Ok(rx)
    }

    async fn ack(&self, batch_id: u64) -> Result<(), ConsoleError> {
        if let Some((_, cursor)) = self.state.pending.remove(&batch_id) {
            self.state.commit(cursor);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ConsoleError> {
        if let Some(sub_id) = self.sub_id.lock().take() {
            self.state.subs.remove(&sub_id);
        }
        if let Some(mut group) = self.state.groups.get_mut(&self.group) {
            group.online.remove(&self.client_addr);
        }
        Ok(())
    }
}
