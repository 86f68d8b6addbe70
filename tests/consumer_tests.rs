use mqdesk::errors::ConsoleError;
use mqdesk::session::consumer::ConsumerState;
use mqdesk::session::types::FilterKind;
use uuid::Uuid;

mod helpers;
use helpers::{assert_no_message, recv_timeout, setup_console, NAMESRV};

#[cfg(test)]
mod consumer_tests {
    use super::*;

    // =========================================================================================
    // 1. PRODUCE / CONSUME / LOOKUP
    // =========================================================================================

    mod features {
        use super::*;

        #[tokio::test]
        async fn test_send_returns_queryable_id_and_lookup_matches() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_send_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let record = manager.send(&topic, "tag1", "hello").await.unwrap();
            assert!(!record.id.is_empty());
            // store-host derived id: 4 bytes ip + 4 bytes port + 8 bytes offset
            assert_eq!(record.id.len(), 32);

            let detail = manager.lookup_message(&record.id).await.unwrap();
            assert_eq!(detail.topic, topic);
            assert_eq!(detail.tag, "tag1");
            assert_eq!(detail.body.as_ref(), b"hello");
            assert!(detail.to_json().contains("\"topic\""));
        }

        #[tokio::test]
        async fn test_consumer_receives_live_messages_in_order() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_live_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let mut rx = manager
                .start_consumer("VIEW_GROUP", &topic, FilterKind::Tag, "*")
                .await
                .unwrap();

            for i in 0..3 {
                manager.send(&topic, "t", &format!("m{}", i)).await.unwrap();
            }

            for i in 0..3 {
                let msg = recv_timeout(&mut rx).await.expect("should deliver");
                assert_eq!(msg.body.as_ref(), format!("m{}", i).as_bytes());
                assert_eq!(msg.topic, topic);
                assert!(!msg.id.is_empty());
            }
        }

        #[tokio::test]
        async fn test_consumer_receives_backlog_from_before_start() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_backlog_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            manager.send(&topic, "t", "early-1").await.unwrap();
            manager.send(&topic, "t", "early-2").await.unwrap();

            let mut rx = manager
                .start_consumer("BACKLOG_GROUP", &topic, FilterKind::Tag, "*")
                .await
                .unwrap();

            let mut bodies = Vec::new();
            for _ in 0..2 {
                bodies.push(recv_timeout(&mut rx).await.expect("should deliver backlog"));
            }
            let mut bodies: Vec<String> = bodies
                .iter()
                .map(|m| String::from_utf8_lossy(&m.body).to_string())
                .collect();
            bodies.sort();
            assert_eq!(bodies, vec!["early-1", "early-2"]);
        }

        #[tokio::test]
        async fn test_tag_filter_narrows_delivery() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_tag_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let mut rx = manager
                .start_consumer("TAG_GROUP", &topic, FilterKind::Tag, "red")
                .await
                .unwrap();

            manager.send(&topic, "blue", "skip-me").await.unwrap();
            manager.send(&topic, "red", "take-me").await.unwrap();

            let msg = recv_timeout(&mut rx).await.expect("should deliver");
            assert_eq!(msg.tag, "red");
            assert_eq!(msg.body.as_ref(), b"take-me");
            assert_no_message(&mut rx).await;
        }

        #[tokio::test]
        async fn test_expression_filter_narrows_delivery() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_expr_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let mut rx = manager
                .start_consumer("EXPR_GROUP", &topic, FilterKind::Expression, "TAGS = 'red'")
                .await
                .unwrap();

            manager.send(&topic, "blue", "skip-me").await.unwrap();
            manager.send(&topic, "red", "take-me").await.unwrap();

            let msg = recv_timeout(&mut rx).await.expect("should deliver");
            assert_eq!(msg.tag, "red");
            assert_no_message(&mut rx).await;
        }
    }

    // =========================================================================================
    // 2. STATE MACHINE EDGES
    // =========================================================================================

    mod edge_cases {
        use super::*;

        #[tokio::test]
        async fn test_invalid_expression_fails_and_stays_idle() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_badexpr_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let err = manager
                .start_consumer("BAD_GROUP", &topic, FilterKind::Expression, "TAGS ==")
                .await
                .unwrap_err();
            assert!(matches!(err, ConsoleError::Start { .. }));
            assert_eq!(manager.consumer_state(), ConsumerState::Idle);
        }

        #[tokio::test]
        async fn test_stop_is_idempotent() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_stop_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();
            let _rx = manager
                .start_consumer("STOP_GROUP", &topic, FilterKind::Tag, "*")
                .await
                .unwrap();

            manager.stop_consumer().await.unwrap();
            assert_eq!(manager.consumer_state(), ConsumerState::Idle);

            // Stopping again is a no-op
            manager.stop_consumer().await.unwrap();
            assert_eq!(manager.consumer_state(), ConsumerState::Idle);
        }

        #[tokio::test]
        async fn test_start_while_running_replaces_subscription() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_replace_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let mut rx1 = manager
                .start_consumer("REPLACE_GROUP", &topic, FilterKind::Tag, "old")
                .await
                .unwrap();
            let mut rx2 = manager
                .start_consumer("REPLACE_GROUP", &topic, FilterKind::Tag, "new")
                .await
                .unwrap();

            assert_eq!(manager.consumer_state(), ConsumerState::Running);

            // Old channel is closed once the first consumer is torn down
            assert!(recv_timeout(&mut rx1).await.is_none());

            manager.send(&topic, "new", "for-second").await.unwrap();
            let msg = recv_timeout(&mut rx2).await.expect("second subscription delivers");
            assert_eq!(msg.body.as_ref(), b"for-second");
        }

        #[tokio::test]
        async fn test_no_delivery_after_stop_returns() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_afterstop_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let mut rx = manager
                .start_consumer("AFTER_GROUP", &topic, FilterKind::Tag, "*")
                .await
                .unwrap();
            manager.stop_consumer().await.unwrap();

            manager.send(&topic, "t", "late").await.unwrap();
            assert!(recv_timeout(&mut rx).await.is_none());
        }

        #[tokio::test]
        async fn test_acked_batches_advance_group_offsets() {
            let (_cluster, manager) = setup_console();
            manager.connect(NAMESRV).await.unwrap();

            let topic = format!("pc_ack_{}", Uuid::new_v4());
            manager.create_topic(&topic).await.unwrap();

            let mut rx = manager
                .start_consumer("ACK_GROUP", &topic, FilterKind::Tag, "*")
                .await
                .unwrap();

            manager.send(&topic, "t", "one").await.unwrap();
            manager.send(&topic, "t", "two").await.unwrap();
            assert!(recv_timeout(&mut rx).await.is_some());
            assert!(recv_timeout(&mut rx).await.is_some());

            // Give the forward loop a beat to ack the delivered batches
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            assert_eq!(manager.consume_stats("ACK_GROUP").await.unwrap(), 0);
        }
    }
}
