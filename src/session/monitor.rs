//! Monitoring Poller: cancellable periodic sampler of cumulative topic
//! offset, feeding a bounded FIFO series.
//!
//! One poller per session. Starting a new one always cancels the prior
//! task outright, so two pollers never race on the same series.
//! A firing that observes a disconnected session is a silent no-op
//! (disconnect may race a still-armed timer); a fetch failure is logged
//! and never stops future firings.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::session::types::MonitorPoint;
use crate::session::Handle;
use crate::utils::utils_time::now_label;

// ==========================================
// SERIES
// ==========================================

/// Ordered, capacity-bounded series of monitor points. Oldest point is
/// evicted first; scoped to exactly one topic at a time.
pub struct MonitorSeries {
    points: RwLock<VecDeque<MonitorPoint>>,
    topic: RwLock<Option<String>>,
    updates: watch::Sender<Vec<MonitorPoint>>,
}

impl MonitorSeries {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            points: RwLock::new(VecDeque::new()),
            topic: RwLock::new(None),
            updates,
        }
    }

    /// Appends a point, evicting the oldest while over capacity, and
    /// notifies observers with a fresh snapshot.
    pub fn append(&self, point: MonitorPoint, capacity: usize) {
        let snapshot = {
            let mut points = self.points.write();
            points.push_back(point);
            while points.len() > capacity {
                points.pop_front();
            }
            points.iter().cloned().collect::<Vec<_>>()
        };
        let _ = self.updates.send(snapshot);
    }

    /// Re-targets the series to a new topic, dropping every point.
    pub fn retarget(&self, topic: &str) {
        self.points.write().clear();
        *self.topic.write() = Some(topic.to_string());
        let _ = self.updates.send(Vec::new());
    }

    pub fn snapshot(&self) -> Vec<MonitorPoint> {
        self.points.read().iter().cloned().collect()
    }

    pub fn topic(&self) -> Option<String> {
        self.topic.read().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<MonitorPoint>> {
        self.updates.subscribe()
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}

// ==========================================
// POLLER
// ==========================================

pub struct MonitorPoller {
    config: MonitorConfig,
    handle: Arc<Mutex<Option<Handle>>>,
    active: Mutex<Option<ActivePoll>>,
    series: Arc<MonitorSeries>,
}

struct ActivePoll {
    topic: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorPoller {
    pub(crate) fn new(config: MonitorConfig, handle: Arc<Mutex<Option<Handle>>>) -> Self {
        Self {
            config,
            handle,
            active: Mutex::new(None),
            series: Arc::new(MonitorSeries::new()),
        }
    }

    pub fn series(&self) -> &Arc<MonitorSeries> {
        &self.series
    }

    /// Cancels any prior poller, clears the series and schedules a task
    /// firing immediately and at every interval thereafter.
    pub async fn start(&self, topic: &str) {
        self.stop().await;
        self.series.retarget(topic);

        let token = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            topic.to_string(),
            self.config.clone(),
            self.handle.clone(),
            self.series.clone(),
            token.clone(),
        ));
        *self.active.lock().await = Some(ActivePoll { topic: topic.to_string(), token, task });
        tracing::info!("[Monitor] started for topic '{}'", topic);
    }

    /// Idempotent. Returns only after the in-flight firing, if any,
    /// has completed; nothing is left dangling.
    pub async fn stop(&self) {
        let active = self.active.lock().await.take();
        if let Some(active) = active {
            active.token.cancel();
            let _ = active.task.await;
            tracing::info!("[Monitor] stopped for topic '{}'", active.topic);
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }
}

async fn poll_loop(
    topic: String,
    config: MonitorConfig,
    handle: Arc<Mutex<Option<Handle>>>,
    series: Arc<MonitorSeries>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let admin = { handle.lock().await.as_ref().map(|h| h.admin.clone()) };
                let Some(admin) = admin else {
                    continue; // disconnect raced the armed timer
                };
                match admin.topic_stats(&topic).await {
                    Ok(stats) => {
                        let total: u64 = stats.values().map(|q| q.max_offset).sum();
                        series.append(
                            MonitorPoint { label: now_label(), total_offset: total },
                            config.series_capacity,
                        );
                    }
                    Err(e) => {
                        tracing::warn!("[Monitor] stats fetch for '{}' failed: {}", topic, e);
                    }
                }
            }
        }
    }
}
