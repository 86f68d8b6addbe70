use std::time::Duration;

use mqdesk::errors::ConsoleError;
use mqdesk::session::monitor::MonitorSeries;
use mqdesk::session::types::MonitorPoint;
use uuid::Uuid;

mod helpers;
use helpers::{setup_console, NAMESRV};

#[cfg(test)]
mod monitor_tests {
    use super::*;

    // =========================================================================================
    // 1. SERIES (bounded FIFO)
    // =========================================================================================

    mod series {
        use super::*;

        #[test]
        fn test_series_evicts_oldest_beyond_capacity() {
            let series = MonitorSeries::new();
            for i in 0..25u64 {
                series.append(
                    MonitorPoint { label: format!("t{}", i), total_offset: i },
                    20,
                );
            }

            let points = series.snapshot();
            assert_eq!(points.len(), 20);
            // Points 0..=4 were evicted, the rest survive in insertion order
            assert_eq!(points.first().unwrap().label, "t5");
            assert_eq!(points.last().unwrap().label, "t24");
        }

        #[test]
        fn test_retarget_drops_points_and_switches_topic() {
            let series = MonitorSeries::new();
            series.append(MonitorPoint { label: "t0".into(), total_offset: 7 }, 20);
            assert!(!series.is_empty());

            series.retarget("other_topic");
            assert!(series.is_empty());
            assert_eq!(series.topic().as_deref(), Some("other_topic"));
        }
    }

    // =========================================================================================
    // 2. POLLER
    // =========================================================================================

    mod poller {
        use super::*;

        #[tokio::test]
        async fn test_poller_samples_and_stays_bounded() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("mon_bound_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();
            manager.send(&topic, "t", "m0").await.unwrap();

            manager.start_monitoring(&topic).await.unwrap();
            // 10ms interval: 500ms is ~50 firings, far past capacity
            tokio::time::sleep(Duration::from_millis(500)).await;

            let points = manager.monitor_series();
            assert!(!points.is_empty());
            assert!(points.len() <= 20);
            assert!(points.iter().all(|p| p.total_offset == 1));

            manager.stop_monitoring().await;
        }

        #[tokio::test]
        async fn test_restart_retargets_and_clears_series() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let busy = format!("mon_busy_{}", Uuid::new_v4());
            let quiet = format!("mon_quiet_{}", Uuid::new_v4());
            manager.create_topic(&busy).await.unwrap();
            manager.create_topic(&quiet).await.unwrap();
            manager.send(&busy, "t", "m0").await.unwrap();

            manager.start_monitoring(&busy).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(manager.monitor_series().iter().any(|p| p.total_offset == 1));

            // Switching topics starts from an empty series
            manager.start_monitoring(&quiet).await.unwrap();
            assert_eq!(manager.monitor_topic().as_deref(), Some(quiet.as_str()));
            tokio::time::sleep(Duration::from_millis(100)).await;

            let points = manager.monitor_series();
            assert!(!points.is_empty());
            assert!(points.iter().all(|p| p.total_offset == 0));

            manager.stop_monitoring().await;
        }

        #[tokio::test]
        async fn test_fetch_failures_are_swallowed_and_sampling_resumes() {
            let (cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("mon_flaky_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();
            manager.start_monitoring(&topic).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(!manager.monitor_series().is_empty());

            // Discovery outage: firings fail, are logged and appended nowhere
            cluster.set_reachable(false);
            tokio::time::sleep(Duration::from_millis(50)).await;
            let frozen = manager.monitor_series().len();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(manager.monitor_series().len(), frozen);

            // Recovery: the same task resumes appending
            cluster.set_reachable(true);
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(manager.monitor_series().len() > frozen || frozen == 20);

            manager.stop_monitoring().await;
        }

        #[tokio::test]
        async fn test_observers_see_snapshots_via_watch() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("mon_watch_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let mut updates = manager.monitor_updates();
            manager.start_monitoring(&topic).await.unwrap();

            // First change is the retarget clear, then appended snapshots follow
            let mut saw_points = false;
            for _ in 0..10 {
                tokio::time::timeout(Duration::from_secs(1), updates.changed())
                    .await
                    .expect("watch update within deadline")
                    .unwrap();
                if !updates.borrow_and_update().is_empty() {
                    saw_points = true;
                    break;
                }
            }
            assert!(saw_points);

            manager.stop_monitoring().await;
        }

        #[tokio::test]
        async fn test_stop_is_idempotent_and_freezes_series() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("mon_stop_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();
            manager.start_monitoring(&topic).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;

            manager.stop_monitoring().await;
            let frozen = manager.monitor_series().len();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(manager.monitor_series().len(), frozen);

            // Stopping again with nothing running is a no-op
            manager.stop_monitoring().await;
        }

        #[tokio::test]
        async fn test_start_requires_connection() {
            let (_cluster, manager) = setup_console();
            assert!(matches!(
                manager.start_monitoring("T").await,
                Err(ConsoleError::NotConnected)
            ));
        }
    }
}
