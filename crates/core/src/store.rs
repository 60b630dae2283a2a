//! The tuple store interface the evaluator consumes (§6.1). The core never
//! touches a database directly — it only ever holds a `dyn TupleStore` (or,
//! for a single check request, a [`crate::contextual::ContextualStore`]
//! decorating one). [`crate::memory::InMemoryStore`] is the reference
//! implementation used by this crate's own tests; [`rebac_storage`] is the
//! Postgres-backed one.

use crate::error::Result;
use crate::types::{ConditionDefinition, RelationConfig, Tuple};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A subject reference as returned by [`TupleStore::list_direct_subjects`]:
/// every subject recorded against a relation, annotated with its userset
/// relation when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_relation: Option<String>,
}

impl From<&Tuple> for SubjectRef {
    fn from(tuple: &Tuple) -> Self {
        Self {
            subject_type: tuple.subject_type.clone(),
            subject_id: tuple.subject_id.clone(),
            subject_relation: tuple.subject_relation.clone(),
        }
    }
}

/// Read and write primitives over tuples, relation configs, and condition
/// definitions (§6.1). All operations may suspend; implementations must be
/// race-free under concurrent writes but need not be serializable across
/// operations (§5).
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// A tuple with the given key and `subject_relation` absent.
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Option<Tuple>>;

    /// All tuples on `(object_type, object_id, relation)` whose subject
    /// carries a `subject_relation`.
    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<Tuple>>;

    /// All tuples on `(object_type, object_id, relation)`, any subject
    /// shape, any condition.
    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<Tuple>>;

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> Result<Option<RelationConfig>>;

    async fn find_condition_definition(&self, name: &str) -> Result<Option<ConditionDefinition>>;

    /// Union of distinct object ids appearing in tuples of `object_type`.
    /// A pre-filter only, per §6.1 — the caller (`list_objects`) re-checks
    /// every candidate.
    async fn list_candidate_object_ids(&self, object_type: &str) -> Result<Vec<String>>;

    async fn list_direct_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<SubjectRef>>;

    /// Upsert on the natural key (§3).
    async fn insert_tuple(&self, tuple: Tuple) -> Result<()>;

    /// Returns `true` iff a row was removed.
    async fn delete_tuple(&self, tuple: &Tuple) -> Result<bool>;

    async fn upsert_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
    ) -> Result<()>;

    /// Returns `true` iff a config was removed.
    async fn delete_relation_config(&self, object_type: &str, relation: &str) -> Result<bool>;

    async fn upsert_condition_definition(&self, definition: ConditionDefinition) -> Result<()>;

    /// Returns `true` iff a definition was removed.
    async fn delete_condition_definition(&self, name: &str) -> Result<bool>;
}
