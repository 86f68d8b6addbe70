use std::time::Duration;
use mqdesk::config::{Config, LogConfig, MonitorConfig, ResetConfig, SessionConfig};
use mqdesk::session::types::MessageRecord;
use mqdesk::session::SessionManager;
use mqdesk::transport::memory::MemoryCluster;
use tokio::sync::mpsc;

pub const NAMESRV: &str = "127.0.0.1:9876";

pub fn test_config() -> Config {
    Config {
        log: LogConfig { level: "error".to_string() },
        session: SessionConfig {
            producer_group: "DESK_ADMIN_PRODUCER_GROUP".to_string(),
            topic_queue_count: 4,
            delivery_channel_capacity: 1024,
        },
        // Fast poller so monitor tests settle quickly
        monitor: MonitorConfig { poll_interval_ms: 10, series_capacity: 20 },
        reset: ResetConfig { force: true },
    }
}

pub fn setup_console() -> (MemoryCluster, SessionManager) {
    let cluster = MemoryCluster::new(NAMESRV);
    let manager = SessionManager::new(cluster.connector(), test_config());
    (cluster, manager)
}

pub async fn recv_timeout(rx: &mut mpsc::Receiver<MessageRecord>) -> Option<MessageRecord> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Expect silence on the channel for a short window.
pub async fn assert_no_message(rx: &mut mpsc::Receiver<MessageRecord>) {
    let got = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(got.is_err() || got.unwrap().is_none(), "expected no delivery");
}
