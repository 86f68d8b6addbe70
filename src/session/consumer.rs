//! Consumer Session: single-subscription push consumer.
//!
//! Lifecycle: Idle -> Starting -> Running -> Stopping -> Idle.
//! A prior consumer is always fully stopped before a new one is built;
//! the underlying client cannot re-subscribe or restart after shutdown.
//! Broker batches cross to the observer through a bounded channel:
//! each message is decoded and forwarded in delivery order, then the
//! whole batch is acked. A gone or saturated observer is logged, never
//! fatal, and does not hold the ack back.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::errors::ConsoleError;
use crate::session::types::{MessageRecord, Subscription};
use crate::transport::{BrokerConnector, ConsumerTransport, MessageBatch, RawMessage};
use crate::utils::msg_id;
use crate::utils::utils_time::now_label;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Starting,
    Running,
    Stopping,
}

pub struct ConsumerSession {
    config: SessionConfig,
    state: Arc<RwLock<ConsumerState>>,
    /// Serializes start/stop; holds the live consumer if any.
    inner: tokio::sync::Mutex<Option<ActiveConsumer>>,
}

struct ActiveConsumer {
    subscription: Subscription,
    transport: Arc<dyn ConsumerTransport>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsumerSession {
    pub(crate) fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConsumerState::Idle)),
            inner: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.read()
    }

    pub fn subscription(&self) -> Option<Subscription> {
        // Best effort view for the presentation layer.
        self.inner.try_lock().ok().and_then(|g| g.as_ref().map(|a| a.subscription.clone()))
    }

    /// Replaces any running subscription: the old consumer is stopped
    /// first, then a fresh client is allocated and subscribed. On any
    /// rejection the session ends up Idle, never half-started.
    pub async fn start(
        &self,
        connector: Arc<dyn BrokerConnector>,
        address: &str,
        subscription: Subscription,
    ) -> Result<mpsc::Receiver<MessageRecord>, ConsoleError> {
        let mut slot = self.inner.lock().await;
        if let Err(e) = self.stop_slot(&mut slot).await {
            tracing::warn!("[Consumer] previous client shutdown failed: {}", e);
        }

        self.set_state(ConsumerState::Starting);

        let transport = match connector.consumer(address, &subscription.group).await {
            Ok(t) => t,
            Err(e) => {
                self.set_state(ConsumerState::Idle);
                return Err(ConsoleError::Start { reason: e.to_string() });
            }
        };

        let batches = match transport.subscribe(&subscription).await {
            Ok(rx) => rx,
            Err(e) => {
                if let Err(e2) = transport.shutdown().await {
                    tracing::warn!("[Consumer] rejected client shutdown failed: {}", e2);
                }
                self.set_state(ConsumerState::Idle);
                return Err(ConsoleError::Start { reason: e.to_string() });
            }
        };

        let (out_tx, out_rx) = mpsc::channel(self.config.delivery_channel_capacity);
        let token = CancellationToken::new();
        let task = tokio::spawn(forward_loop(batches, transport.clone(), out_tx, token.clone()));

        tracing::info!(
            "[Consumer] started: group='{}' topic='{}'",
            subscription.group,
            subscription.topic
        );
        *slot = Some(ActiveConsumer { subscription, transport, token, task });
        self.set_state(ConsumerState::Running);
        Ok(out_rx)
    }

    /// Idempotent. After it returns no further message is delivered and
    /// the handle is cleared, so the next start allocates a fresh client.
    pub async fn stop(&self) -> Result<(), ConsoleError> {
        let mut slot = self.inner.lock().await;
        self.stop_slot(&mut slot).await
    }

    async fn stop_slot(&self, slot: &mut Option<ActiveConsumer>) -> Result<(), ConsoleError> {
        let Some(active) = slot.take() else {
            return Ok(()); // already Idle
        };
        self.set_state(ConsumerState::Stopping);
        active.token.cancel();
        let _ = active.task.await;
        let result = active.transport.shutdown().await;
        self.set_state(ConsumerState::Idle);
        tracing::info!("[Consumer] stopped: group='{}'", active.subscription.group);
        result
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.write() = state;
    }
}

async fn forward_loop(
    mut batches: mpsc::UnboundedReceiver<MessageBatch>,
    transport: Arc<dyn ConsumerTransport>,
    out: mpsc::Sender<MessageRecord>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = batches.recv() => {
                let Some(batch) = next else { break; };
                for raw in &batch.messages {
                    let record = decode_record(raw);
                    if let Err(e) = out.try_send(record) {
                        // Observer gone or saturated; the batch is still acked.
                        tracing::warn!("[Consumer] delivery dropped: {}", e);
                    }
                }
                if let Err(e) = transport.ack(batch.id).await {
                    tracing::warn!("[Consumer] ack of batch {} failed: {}", batch.id, e);
                }
            }
        }
    }
}

fn decode_record(raw: &RawMessage) -> MessageRecord {
    let id = raw
        .store_host
        .as_deref()
        .zip(raw.commit_log_offset)
        .and_then(|(host, offset)| msg_id::encode(host, offset))
        .unwrap_or_else(|| raw.msg_id.clone());
    MessageRecord {
        id,
        topic: raw.topic.clone(),
        tag: raw.tag.clone(),
        time: now_label(),
        body: raw.body.clone(),
    }
}
