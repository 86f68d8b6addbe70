//! Session Manager: aggregate owner of the admin, producer and consumer
//! clients bound to one discovery address.
//!
//! Release-then-acquire on connect is strictly sequential, every teardown
//! step is attempted independently, and the manager always ends either
//! fully live or fully torn down. Teardown order: poller, consumer,
//! producer, admin.

pub mod admin;
pub mod consumer;
pub mod monitor;
pub mod producer;
pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};

use crate::config::Config;
use crate::errors::ConsoleError;
use crate::session::admin::AdminFacade;
use crate::session::consumer::{ConsumerSession, ConsumerState};
use crate::session::monitor::{MonitorPoller, MonitorSeries};
use crate::session::producer::ProducerSession;
use crate::session::types::{
    FilterKind, GroupStatus, MessageDetail, MessageRecord, MonitorPoint, OffsetResetRequest,
    Subscription,
};
use crate::transport::{BrokerConnector, TopicStatsSnapshot};
use crate::utils::utils_time::current_time_ms;

/// The live triple bound to one address. Consumer lives separately in
/// `ConsumerSession`; it is optional and independently lifecycled.
pub(crate) struct Handle {
    pub(crate) address: String,
    pub(crate) admin: AdminFacade,
    pub(crate) producer: ProducerSession,
}

pub struct SessionManager {
    connector: Arc<dyn BrokerConnector>,
    config: Config,
    handle: Arc<Mutex<Option<Handle>>>,
    consumer: ConsumerSession,
    monitor: MonitorPoller,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, config: Config) -> Self {
        let handle = Arc::new(Mutex::new(None));
        let monitor = MonitorPoller::new(config.monitor.clone(), handle.clone());
        let consumer = ConsumerSession::new(config.session.clone());
        Self { connector, config, handle, consumer, monitor }
    }

    // ==========================================
    // LIFECYCLE
    // ==========================================

    /// Releases any prior handle (poller, consumer, producer, admin, each
    /// step guarded), then binds a fresh admin + producer to `address`.
    /// The consumer stays empty until explicitly started. On failure
    /// nothing half-initialized is retained.
    pub async fn connect(&self, address: &str) -> Result<(), ConsoleError> {
        self.monitor.stop().await;
        if let Err(e) = self.consumer.stop().await {
            tracing::warn!("[Session] consumer release during connect failed: {}", e);
        }

        let mut slot = self.handle.lock().await;
        if let Some(old) = slot.take() {
            if let Err(e) = old.producer.shutdown().await {
                tracing::warn!("[Session] producer release during connect failed: {}", e);
            }
            if let Err(e) = old.admin.shutdown().await {
                tracing::warn!("[Session] admin release during connect failed: {}", e);
            }
        }

        let admin = self
            .connector
            .admin(address)
            .await
            .map_err(|e| ConsoleError::Connection {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let producer = match self
            .connector
            .producer(address, &self.config.session.producer_group)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                if let Err(e2) = admin.shutdown().await {
                    tracing::warn!("[Session] admin rollback failed: {}", e2);
                }
                return Err(ConsoleError::Connection {
                    address: address.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        *slot = Some(Handle {
            address: address.to_string(),
            admin: AdminFacade::new(
                admin,
                self.config.reset.clone(),
                self.config.session.topic_queue_count,
            ),
            producer: ProducerSession::new(producer),
        });
        tracing::info!("[Session] connected to {}", address);
        Ok(())
    }

    /// Cancels the poller first (it depends on a live admin client), then
    /// releases consumer, producer and admin. Every step is attempted;
    /// the manager ends disconnected even when one of them fails.
    pub async fn disconnect(&self) -> Result<(), ConsoleError> {
        self.monitor.stop().await;

        let mut failed: Vec<&str> = Vec::new();
        if let Err(e) = self.consumer.stop().await {
            tracing::warn!("[Session] consumer release failed: {}", e);
            failed.push("consumer");
        }

        let mut slot = self.handle.lock().await;
        if let Some(old) = slot.take() {
            if let Err(e) = old.producer.shutdown().await {
                tracing::warn!("[Session] producer release failed: {}", e);
                failed.push("producer");
            }
            if let Err(e) = old.admin.shutdown().await {
                tracing::warn!("[Session] admin release failed: {}", e);
                failed.push("admin");
            }
            tracing::info!("[Session] disconnected from {}", old.address);
        }
        drop(slot);

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ConsoleError::Disconnect { steps: failed.join(", ") })
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    pub async fn address(&self) -> Option<String> {
        self.handle.lock().await.as_ref().map(|h| h.address.clone())
    }

    /// Clones the facade out of the handle so the network call below
    /// does not run under the handle lock.
    async fn admin(&self) -> Result<AdminFacade, ConsoleError> {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| h.admin.clone())
            .ok_or(ConsoleError::NotConnected)
    }

    async fn producer(&self) -> Result<ProducerSession, ConsoleError> {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| h.producer.clone())
            .ok_or(ConsoleError::NotConnected)
    }

    // ==========================================
    // ADMIN OPERATIONS
    // ==========================================

    pub async fn list_topics(&self) -> Result<BTreeSet<String>, ConsoleError> {
        self.admin().await?.list_topics().await
    }

    pub async fn list_consumer_groups(&self) -> Result<BTreeSet<String>, ConsoleError> {
        self.admin().await?.list_consumer_groups().await
    }

    pub async fn topic_stats(&self, topic: &str) -> Result<TopicStatsSnapshot, ConsoleError> {
        self.admin().await?.topic_stats(topic).await
    }

    pub async fn consumer_connections(&self, group: &str) -> Result<BTreeSet<String>, ConsoleError> {
        self.admin().await?.consumer_connections(group).await
    }

    pub async fn consume_stats(&self, group: &str) -> Result<u64, ConsoleError> {
        self.admin().await?.consume_stats(group).await
    }

    pub async fn group_status(&self, group: &str) -> Result<GroupStatus, ConsoleError> {
        self.admin().await?.group_status(group).await
    }

    /// Force semantics come from config: with force on (the default) the
    /// reset applies even while consumers are offline or online.
    pub async fn reset_offset(
        &self,
        topic: &str,
        group: &str,
        timestamp_ms: u64,
    ) -> Result<(), ConsoleError> {
        let req = OffsetResetRequest {
            topic: topic.to_string(),
            group: group.to_string(),
            timestamp_ms,
            force: self.config.reset.force,
        };
        self.admin().await?.reset_offset(req).await
    }

    /// Pure name derivation, no connection required.
    pub fn dead_letter_topic_for(&self, group: &str) -> String {
        admin::dead_letter_topic_for(group)
    }

    pub async fn dead_letter_depth(&self, group: &str) -> Result<u64, ConsoleError> {
        self.admin().await?.dead_letter_depth(group).await
    }

    pub async fn create_topic(&self, name: &str) -> Result<(), ConsoleError> {
        self.admin().await?.create_topic(name).await
    }

    pub async fn lookup_message(&self, id: &str) -> Result<MessageDetail, ConsoleError> {
        self.admin().await?.lookup_message(id).await
    }

    // ==========================================
    // PRODUCER / CONSUMER
    // ==========================================

    pub async fn send(&self, topic: &str, tag: &str, body: &str) -> Result<MessageRecord, ConsoleError> {
        self.producer().await?.send(topic, tag, body).await
    }

    /// Starts (or replaces) the single test subscription. Decoded
    /// messages arrive on the returned channel in broker delivery order.
    pub async fn start_consumer(
        &self,
        group: &str,
        topic: &str,
        filter: FilterKind,
        expression: &str,
    ) -> Result<mpsc::Receiver<MessageRecord>, ConsoleError> {
        let address = self.address().await.ok_or(ConsoleError::NotConnected)?;
        let subscription = Subscription {
            group: group.to_string(),
            topic: topic.to_string(),
            filter,
            expression: expression.to_string(),
        };
        self.consumer
            .start(self.connector.clone(), &address, subscription)
            .await
    }

    pub async fn stop_consumer(&self) -> Result<(), ConsoleError> {
        self.consumer.stop().await
    }

    pub fn consumer_state(&self) -> ConsumerState {
        self.consumer.state()
    }

    // ==========================================
    // MONITORING
    // ==========================================

    pub async fn start_monitoring(&self, topic: &str) -> Result<(), ConsoleError> {
        if !self.is_connected().await {
            return Err(ConsoleError::NotConnected);
        }
        self.monitor.start(topic).await;
        Ok(())
    }

    pub async fn stop_monitoring(&self) {
        self.monitor.stop().await;
    }

    pub fn monitor_series(&self) -> Vec<MonitorPoint> {
        self.monitor.series().snapshot()
    }

    pub fn monitor_topic(&self) -> Option<String> {
        self.monitor.series().topic()
    }

    /// Observers receive a fresh snapshot after every appended point.
    pub fn monitor_updates(&self) -> watch::Receiver<Vec<MonitorPoint>> {
        self.monitor.series().subscribe()
    }

    /// Convenience: reset a group to "now" for the given topic.
    pub async fn reset_offset_to_now(&self, topic: &str, group: &str) -> Result<(), ConsoleError> {
        self.reset_offset(topic, group, current_time_ms()).await
    }
}
