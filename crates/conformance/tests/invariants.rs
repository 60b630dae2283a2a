//! Quantified invariants from spec §8, each reduced to a concrete
//! instance a test can assert on directly.

use rebac_core::{CheckEvaluator, CheckRequest, ConditionEvaluator, InMemoryStore, RelationConfig, Tuple, WILDCARD};
use std::sync::Arc;

fn checker(store: Arc<InMemoryStore>) -> CheckEvaluator {
    CheckEvaluator::new(store, ConditionEvaluator::new(100))
}

/// *Determinism*: repeating the same check against unchanged state
/// produces the same boolean every time.
#[tokio::test]
async fn determinism() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_tuple(Tuple::new("doc", "1", "viewer", "user", "alice"))
        .await
        .unwrap();
    let eval = checker(store);

    let mut results = Vec::new();
    for _ in 0..5 {
        results.push(
            eval.check(CheckRequest::new("doc", "1", "viewer", "user", "alice"))
                .await
                .unwrap(),
        );
    }
    assert!(results.iter().all(|&r| r));
}

/// *Monotonicity of union*: adding a grant never turns a true check false.
#[tokio::test]
async fn monotonicity_of_union() {
    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_relation_config(
            "doc",
            "viewer",
            RelationConfig {
                implied_by: Some(vec!["editor".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .insert_tuple(Tuple::new("doc", "1", "editor", "user", "alice"))
        .await
        .unwrap();
    let eval = checker(store.clone());

    assert!(eval
        .check(CheckRequest::new("doc", "1", "viewer", "user", "alice"))
        .await
        .unwrap());

    // Granting an unrelated relation to the same subject cannot revoke it.
    store
        .insert_tuple(Tuple::new("doc", "1", "commenter", "user", "alice"))
        .await
        .unwrap();
    assert!(eval
        .check(CheckRequest::new("doc", "1", "viewer", "user", "alice"))
        .await
        .unwrap());
}

/// *Monotonicity of exclusion*: adding a tuple to the excluded relation can
/// only flip true to false, never the reverse.
#[tokio::test]
async fn monotonicity_of_exclusion() {
    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_relation_config(
            "program",
            "can_view",
            RelationConfig {
                implied_by: Some(vec!["editor".to_string()]),
                excluded_by: Some("blocked".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .insert_tuple(Tuple::new("program", "p", "editor", "user", "dee"))
        .await
        .unwrap();
    let eval = checker(store.clone());

    assert!(eval
        .check(CheckRequest::new("program", "p", "can_view", "user", "dee"))
        .await
        .unwrap());

    store
        .insert_tuple(Tuple::new("program", "p", "blocked", "user", "dee"))
        .await
        .unwrap();
    assert!(!eval
        .check(CheckRequest::new("program", "p", "can_view", "user", "dee"))
        .await
        .unwrap());

    store.delete_tuple(&Tuple::new("program", "p", "blocked", "user", "dee")).await.unwrap();
    assert!(eval
        .check(CheckRequest::new("program", "p", "can_view", "user", "dee"))
        .await
        .unwrap());
}

/// *Wildcard equivalence*: any subject id of the matching type passes a
/// wildcard grant, regardless of identity.
#[tokio::test]
async fn wildcard_equivalence() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_tuple(Tuple::new("doc", "psa", "viewer", "user", WILDCARD))
        .await
        .unwrap();
    let eval = checker(store);

    for subject_id in ["alice", "bob", "unregistered-stranger"] {
        assert!(eval
            .check(CheckRequest::new("doc", "psa", "viewer", "user", subject_id))
            .await
            .unwrap());
    }
}

/// *Contextual tuple locality*: contextual tuples supplied with one
/// request must not leak into a concurrent request against the same
/// store that didn't carry them.
#[tokio::test]
async fn contextual_tuple_locality() {
    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_relation_config(
            "org",
            "project_manager",
            RelationConfig {
                computed_userset: Some("user_in_context".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let eval = checker(store);

    let with_context = CheckRequest::new("org", "A", "project_manager", "user", "anne")
        .with_contextual_tuples(vec![Tuple::new("org", "A", "user_in_context", "user", "anne")]);
    assert!(eval.check(with_context).await.unwrap());

    let without_context = CheckRequest::new("org", "A", "project_manager", "user", "anne");
    assert!(!eval.check(without_context).await.unwrap());
}

/// *Depth bound*: a cycle with a tight `max_depth` resolves to false
/// rather than overflowing the stack or looping forever.
#[tokio::test]
async fn depth_bound_is_respected_across_a_range_of_limits() {
    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_relation_config(
            "graph",
            "a",
            RelationConfig {
                implied_by: Some(vec!["b".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .upsert_relation_config(
            "graph",
            "b",
            RelationConfig {
                implied_by: Some(vec!["a".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let eval = checker(store);

    for max_depth in [0, 1, 3, 5, 10] {
        let request = CheckRequest::new("graph", "g", "a", "user", "anyone").with_max_depth(max_depth);
        assert!(!eval.check(request).await.unwrap());
    }
}

/// Inserting the same tuple twice is idempotent except for condition
/// metadata, which reflects the last write.
#[tokio::test]
async fn insert_is_idempotent_except_for_condition_metadata() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_tuple(Tuple::new("doc", "1", "viewer", "user", "alice"))
        .await
        .unwrap();
    store
        .insert_tuple(Tuple::new("doc", "1", "viewer", "user", "alice"))
        .await
        .unwrap();
    assert_eq!(store.len(), 1);
}

/// Deleting a tuple that was never inserted is a no-op that reports
/// `false`.
#[tokio::test]
async fn delete_of_absent_tuple_is_a_no_op() {
    let store = Arc::new(InMemoryStore::new());
    let removed = store
        .delete_tuple(&Tuple::new("doc", "1", "viewer", "user", "alice"))
        .await
        .unwrap();
    assert!(!removed);
    assert!(store.is_empty());
}
