//! End-to-end happy path: a non-ML index is migrated to its destination
//! with transformed mappings, coerced booleans, and an atomic alias switch.

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{completed_task, running_task, TestHarness};
use reindex_cluster::types::AliasAction;
use reindex_types::{ReindexStatus, ReindexStep};

#[tokio::test]
async fn test_happy_path_non_ml_index() {
    let harness = TestHarness::new();
    harness.seed_index(
        "logs-2019",
        json!({"doc": {"properties": {"value": {"type": "boolean"}}}}),
    );
    harness.cluster.script_task_statuses(vec![completed_task(100, 100, vec![])]);

    let stored = harness
        .service
        .create_reindex_operation("logs-2019")
        .await
        .unwrap();
    assert_eq!(stored.attributes.new_index_name, "logs-2019-reindex-0");

    let finished = harness.drive_to_terminal(&stored.id).await;

    assert_eq!(finished.attributes.status, ReindexStatus::Completed);
    assert_eq!(
        finished.attributes.last_completed_step,
        ReindexStep::MlUpgradeModeUnset
    );
    assert_eq!(finished.attributes.reindex_task_perc_complete, 1.0);
    assert!(finished.attributes.locked.is_none());
    assert!(finished.attributes.error_message.is_none());
    // A completed record no longer references its reindex task.
    assert!(finished.attributes.reindex_task_id.is_none());

    // The source index was replaced by the destination.
    assert!(!harness.cluster.has_index("logs-2019"));
    assert!(harness.cluster.has_index("logs-2019-reindex-0"));

    // The destination mapping is typeless with the per-type wrapper gone.
    let dest_state = harness
        .cluster
        .get_index_state("logs-2019-reindex-0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        dest_state.mappings,
        json!({"properties": {"value": {"type": "boolean"}}})
    );

    // An alias with the source's name now points at the destination.
    let aliases = harness.cluster.aliases_of("logs-2019-reindex-0");
    assert!(aliases.contains_key("logs-2019"));

    // The completed task's document was removed from .tasks.
    assert_eq!(harness.cluster.deleted_task_docs().len(), 1);
}

#[tokio::test]
async fn test_boolean_values_are_coerced_during_copy() {
    let harness = TestHarness::new();
    harness.seed_index(
        "logs-2019",
        json!({"doc": {"properties": {"value": {"type": "boolean"}}}}),
    );
    harness
        .cluster
        .seed_docs("logs-2019", vec![json!({"value": "yes"}), json!({"value": 0})]);

    let stored = harness
        .service
        .create_reindex_operation("logs-2019")
        .await
        .unwrap();
    harness.drive_to_terminal(&stored.id).await;

    // The reindex request carried the coercion script for the boolean path.
    let requests = harness.cluster.reindex_requests();
    assert_eq!(requests.len(), 1);
    let script = requests[0].script.as_ref().expect("script should be attached");
    assert_eq!(script.lang, "painless");
    assert_eq!(script.params["booleanFieldPaths"], json!([["value"]]));

    // The copied documents read as real booleans.
    assert_eq!(
        harness.cluster.docs_of("logs-2019-reindex-0"),
        vec![json!({"value": true}), json!({"value": false})]
    );
}

#[tokio::test]
async fn test_no_script_without_boolean_fields() {
    let harness = TestHarness::new();
    harness.seed_index(
        "logs-2019",
        json!({"doc": {"properties": {"message": {"type": "text"}}}}),
    );

    let stored = harness
        .service
        .create_reindex_operation("logs-2019")
        .await
        .unwrap();
    harness.drive_to_terminal(&stored.id).await;

    let requests = harness.cluster.reindex_requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].script.is_none());
}

#[tokio::test]
async fn test_prior_aliases_are_reattached_with_filters() {
    let harness = TestHarness::new();
    harness.seed_index("logs-2019", json!({"doc": {"properties": {}}}));
    harness.cluster.seed_alias(
        "logs-2019",
        "recent-logs",
        json!({"filter": {"range": {"@timestamp": {"gte": "now-7d"}}}}),
    );

    let stored = harness
        .service
        .create_reindex_operation("logs-2019")
        .await
        .unwrap();
    harness.drive_to_terminal(&stored.id).await;

    let aliases = harness.cluster.aliases_of("logs-2019-reindex-0");
    assert!(aliases.contains_key("logs-2019"));
    let reattached = aliases.get("recent-logs").expect("alias should carry over");
    assert_eq!(
        reattached["filter"]["range"]["@timestamp"]["gte"],
        "now-7d"
    );

    // The whole switch happened in one atomic update.
    let updates = harness.cluster.alias_updates();
    assert_eq!(updates.len(), 1);
    assert!(updates[0]
        .iter()
        .any(|a| matches!(a, AliasAction::RemoveIndex(r) if r.index == "logs-2019")));
}

#[tokio::test]
async fn test_polling_updates_progress_without_advancing() {
    let harness = TestHarness::new();
    harness.seed_index("logs-2019", json!({"doc": {"properties": {}}}));
    harness.cluster.script_task_statuses(vec![
        running_task(25, 100),
        running_task(50, 100),
        completed_task(100, 100, vec![]),
    ]);

    let stored = harness
        .service
        .create_reindex_operation("logs-2019")
        .await
        .unwrap();

    // Advance to the point where the reindex task is dispatched.
    let mut current = stored;
    while current.attributes.last_completed_step < ReindexStep::ReindexStarted {
        current = harness.service.process_next_step(current).await.unwrap();
    }
    assert!(current.attributes.reindex_task_id.is_some());

    // Two polls move only the progress; the step marker is idempotent.
    let polled = harness.service.process_next_step(current).await.unwrap();
    assert_eq!(
        polled.attributes.last_completed_step,
        ReindexStep::ReindexStarted
    );
    assert_eq!(polled.attributes.reindex_task_perc_complete, 0.25);

    let polled = harness.service.process_next_step(polled).await.unwrap();
    assert_eq!(
        polled.attributes.last_completed_step,
        ReindexStep::ReindexStarted
    );
    assert_eq!(polled.attributes.reindex_task_perc_complete, 0.5);

    let finished = harness.drive_to_terminal(&polled.id).await;
    assert_eq!(finished.attributes.status, ReindexStatus::Completed);
}

#[tokio::test]
async fn test_replica_count_restored_after_copy() {
    let harness = TestHarness::new();
    harness.cluster.seed_index(
        "logs-2019",
        json!({
            "index.number_of_shards": "1",
            "index.number_of_replicas": "2",
        }),
        json!({"doc": {"properties": {}}}),
    );

    let stored = harness
        .service
        .create_reindex_operation("logs-2019")
        .await
        .unwrap();
    harness.drive_to_terminal(&stored.id).await;

    let settings = harness.cluster.settings_of("logs-2019-reindex-0").unwrap();
    assert_eq!(settings["index.number_of_replicas"], "2");
}
