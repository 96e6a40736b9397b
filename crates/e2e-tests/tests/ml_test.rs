//! ML scenarios: the cluster-wide upgrade-mode toggle flips only on the
//! counter's 0 -> 1 and 1 -> 0 transitions, whatever the interleaving.

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{completed_task, TestHarness};
use reindex_storage::OperationStore;
use reindex_types::{ReindexStatus, ReindexStep};

#[tokio::test]
async fn test_ml_operation_toggles_upgrade_mode() {
    let harness = TestHarness::new();
    harness.seed_index(".ml-anomalies-shared", json!({"doc": {"properties": {}}}));

    let stored = harness
        .service
        .create_reindex_operation(".ml-anomalies-shared")
        .await
        .unwrap();
    let finished = harness.drive_to_terminal(&stored.id).await;

    assert_eq!(finished.attributes.status, ReindexStatus::Completed);
    assert_eq!(
        finished.attributes.last_completed_step,
        ReindexStep::MlUpgradeModeUnset
    );

    // Enabled before the copy, disabled after, exactly once each.
    assert_eq!(harness.cluster.ml_calls(), vec![true, false]);

    // The counter came back to zero with its lease released.
    let counter = harness.store.get_ml_counter().await.unwrap();
    assert_eq!(counter.attributes.ml_reindex_count, 0);
    assert!(counter.attributes.locked.is_none());
}

#[tokio::test]
async fn test_overlapping_ml_operations_single_toggle() {
    let harness = TestHarness::new();
    harness.seed_index(".ml-anomalies-shared", json!({"doc": {"properties": {}}}));
    harness.seed_index(".ml-state", json!({"doc": {"properties": {}}}));

    let first = harness
        .service
        .create_reindex_operation(".ml-anomalies-shared")
        .await
        .unwrap();
    let second = harness
        .service
        .create_reindex_operation(".ml-state")
        .await
        .unwrap();

    // First operation enters the ML phase: counter 0 -> 1, mode enabled.
    let first = harness.service.process_next_step(first).await.unwrap();
    assert_eq!(harness.cluster.ml_calls(), vec![true]);
    assert_eq!(
        harness
            .store
            .get_ml_counter()
            .await
            .unwrap()
            .attributes
            .ml_reindex_count,
        1
    );

    // Second operation enters too: counter 1 -> 2, no extra call.
    let _second = harness.service.process_next_step(second).await.unwrap();
    assert_eq!(harness.cluster.ml_calls(), vec![true]);
    assert_eq!(
        harness
            .store
            .get_ml_counter()
            .await
            .unwrap()
            .attributes
            .ml_reindex_count,
        2
    );

    // The second finishes first: counter 2 -> 1, mode stays on.
    let finished_second = harness.drive_to_terminal(&_second.id).await;
    assert_eq!(finished_second.attributes.status, ReindexStatus::Completed);
    assert_eq!(harness.cluster.ml_calls(), vec![true]);

    // The first finishes last: counter 1 -> 0, mode disabled.
    let finished_first = harness.drive_to_terminal(&first.id).await;
    assert_eq!(finished_first.attributes.status, ReindexStatus::Completed);
    assert_eq!(harness.cluster.ml_calls(), vec![true, false]);

    let counter = harness.store.get_ml_counter().await.unwrap();
    assert_eq!(counter.attributes.ml_reindex_count, 0);
}

#[tokio::test]
async fn test_failed_ml_operation_releases_its_count() {
    let harness = TestHarness::new();
    harness.seed_index(".ml-anomalies-shared", json!({"doc": {"properties": {}}}));
    harness
        .cluster
        .script_task_statuses(vec![completed_task(95, 100, vec![json!({"cause": "x"})])]);

    let stored = harness
        .service
        .create_reindex_operation(".ml-anomalies-shared")
        .await
        .unwrap();
    let finished = harness.drive_to_terminal(&stored.id).await;

    assert_eq!(finished.attributes.status, ReindexStatus::Failed);

    // Cleanup paired the increment, so the toggle came down even though
    // the operation never reached the unset step.
    assert_eq!(harness.cluster.ml_calls(), vec![true, false]);
    let counter = harness.store.get_ml_counter().await.unwrap();
    assert_eq!(counter.attributes.ml_reindex_count, 0);
}

#[tokio::test]
async fn test_non_ml_operation_never_touches_the_toggle() {
    let harness = TestHarness::new();
    harness.seed_index("logs-2019", json!({"doc": {"properties": {}}}));

    let stored = harness
        .service
        .create_reindex_operation("logs-2019")
        .await
        .unwrap();
    let finished = harness.drive_to_terminal(&stored.id).await;

    assert_eq!(finished.attributes.status, ReindexStatus::Completed);
    assert!(harness.cluster.ml_calls().is_empty());
}
