//! Successful delivery cycles.

use super::harness::{at, fast_config, TestHarness};
use crate::CycleReport;
use scheduler_database::DeliveryStatus;
use std::time::{Duration, Instant};

const RELAYS: [&str; 2] = ["wss://relay.one.example", "wss://relay.two.example"];

#[tokio::test]
async fn sent_after_one_cycle_with_two_relays() {
    let h = TestHarness::new(&RELAYS).await;
    h.submit_at("m", at(1)).await;

    let report = h.worker.run_cycle(at(2)).await.unwrap();
    assert_eq!(
        report,
        CycleReport {
            due: 1,
            sent: 1,
            failed: 0,
            applied: 1,
        }
    );

    let m = h.get("m").await;
    assert_eq!(m.status, DeliveryStatus::Sent);
    assert!(m.sent);
    assert_eq!(m.attempt_count, 1);
    assert!(m.last_error.is_none());
    assert!(m.next_attempt_at.is_none());
    assert_eq!(m.last_attempt_at, Some(at(2)));

    assert_eq!(h.transport.opens(), vec![RELAYS.map(String::from).to_vec()]);
    assert_eq!(h.transport.attempted(), vec!["m"]);
    assert_eq!(h.transport.closes(), 1);
}

#[tokio::test]
async fn events_are_published_oldest_first() {
    let h = TestHarness::new(&RELAYS).await;
    h.submit_at("c", at(30)).await;
    h.submit_at("a", at(10)).await;
    h.submit_at("b", at(20)).await;
    h.submit_at("not-yet", at(600)).await;

    let report = h.worker.run_cycle(at(60)).await.unwrap();

    assert_eq!(report.due, 3);
    assert_eq!(h.transport.attempted(), vec!["a", "b", "c"]);
    assert_eq!(h.get("not-yet").await.status, DeliveryStatus::Scheduled);
}

#[tokio::test]
async fn one_failing_event_does_not_block_the_rest() {
    let h = TestHarness::new(&RELAYS).await;
    h.submit_at("a", at(1)).await;
    h.submit_at("b", at(2)).await;
    h.submit_at("c", at(3)).await;
    h.transport.fail_event("b");

    let report = h.worker.run_cycle(at(10)).await.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 3);
    assert_eq!(h.transport.attempted(), vec!["a", "b", "c"]);

    assert_eq!(h.get("a").await.status, DeliveryStatus::Sent);
    assert_eq!(h.get("c").await.status, DeliveryStatus::Sent);

    let b = h.get("b").await;
    assert_eq!(b.status, DeliveryStatus::Retrying);
    assert_eq!(b.attempt_count, 1);
    assert!(b.last_error.unwrap().contains("connection reset"));
    assert_eq!(h.transport.closes(), 1);
}

#[tokio::test]
async fn settle_delay_precedes_first_publish() {
    let mut config = fast_config();
    config.settle_delay = Duration::from_millis(80);
    let h = TestHarness::with_config(&RELAYS, config).await;
    h.submit_at("m", at(1)).await;

    let started = Instant::now();
    h.worker.run_cycle(at(2)).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(h.get("m").await.status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn empty_due_set_touches_nothing() {
    let h = TestHarness::new(&RELAYS).await;
    h.submit_at("later", at(100)).await;

    let report = h.worker.run_cycle(at(50)).await.unwrap();

    assert_eq!(report, CycleReport::default());
    assert!(h.transport.opens().is_empty());
    assert_eq!(h.transport.closes(), 0);
}
