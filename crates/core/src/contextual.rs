//! The contextual overlay (§4.3): wraps a [`TupleStore`] so that ephemeral,
//! per-request tuples are visible to reads for the duration of one check,
//! without ever touching the underlying store. This is decoration, not
//! mutation — per §9's design note, an implementation that pre-loads
//! contextual tuples into a shared store would violate the locality
//! invariant (contextual tuples in one request must not be observable to a
//! concurrent request that didn't carry them).

use crate::error::Result;
use crate::store::{SubjectRef, TupleStore};
use crate::types::{ConditionDefinition, RelationConfig, Tuple};
use async_trait::async_trait;
use std::sync::Arc;

/// Decorates a `TupleStore` with a fixed list of contextual tuples, visible
/// only through this overlay instance. Construct one per check request.
pub struct ContextualStore {
    inner: Arc<dyn TupleStore>,
    contextual_tuples: Vec<Tuple>,
}

impl ContextualStore {
    pub fn new(inner: Arc<dyn TupleStore>, contextual_tuples: Vec<Tuple>) -> Self {
        Self {
            inner,
            contextual_tuples,
        }
    }

    fn contextual_direct_match(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Option<Tuple> {
        self.contextual_tuples
            .iter()
            .find(|t| {
                t.object_type == object_type
                    && t.object_id == object_id
                    && t.relation == relation
                    && t.subject_type == subject_type
                    && t.subject_id == subject_id
                    && t.subject_relation.is_none()
            })
            .cloned()
    }

    fn contextual_usersets(&self, object_type: &str, object_id: &str, relation: &str) -> Vec<Tuple> {
        self.contextual_tuples
            .iter()
            .filter(|t| {
                t.object_type == object_type
                    && t.object_id == object_id
                    && t.relation == relation
                    && t.subject_relation.is_some()
            })
            .cloned()
            .collect()
    }

    fn contextual_by_relation(&self, object_type: &str, object_id: &str, relation: &str) -> Vec<Tuple> {
        self.contextual_tuples
            .iter()
            .filter(|t| t.object_type == object_type && t.object_id == object_id && t.relation == relation)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TupleStore for ContextualStore {
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Option<Tuple>> {
        if let Some(tuple) =
            self.contextual_direct_match(object_type, object_id, relation, subject_type, subject_id)
        {
            return Ok(Some(tuple));
        }
        self.inner
            .find_direct_tuple(object_type, object_id, relation, subject_type, subject_id)
            .await
    }

    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<Tuple>> {
        let mut tuples = self.contextual_usersets(object_type, object_id, relation);
        tuples.extend(self.inner.find_userset_tuples(object_type, object_id, relation).await?);
        Ok(tuples)
    }

    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<Tuple>> {
        let mut tuples = self.contextual_by_relation(object_type, object_id, relation);
        tuples.extend(
            self.inner
                .find_tuples_by_relation(object_type, object_id, relation)
                .await?,
        );
        Ok(tuples)
    }

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> Result<Option<RelationConfig>> {
        self.inner.find_relation_config(object_type, relation).await
    }

    async fn find_condition_definition(&self, name: &str) -> Result<Option<ConditionDefinition>> {
        self.inner.find_condition_definition(name).await
    }

    async fn list_candidate_object_ids(&self, object_type: &str) -> Result<Vec<String>> {
        self.inner.list_candidate_object_ids(object_type).await
    }

    async fn list_direct_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<SubjectRef>> {
        self.inner.list_direct_subjects(object_type, object_id, relation).await
    }

    async fn insert_tuple(&self, tuple: Tuple) -> Result<()> {
        self.inner.insert_tuple(tuple).await
    }

    async fn delete_tuple(&self, tuple: &Tuple) -> Result<bool> {
        self.inner.delete_tuple(tuple).await
    }

    async fn upsert_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
    ) -> Result<()> {
        self.inner.upsert_relation_config(object_type, relation, config).await
    }

    async fn delete_relation_config(&self, object_type: &str, relation: &str) -> Result<bool> {
        self.inner.delete_relation_config(object_type, relation).await
    }

    async fn upsert_condition_definition(&self, definition: ConditionDefinition) -> Result<()> {
        self.inner.upsert_condition_definition(definition).await
    }

    async fn delete_condition_definition(&self, name: &str) -> Result<bool> {
        self.inner.delete_condition_definition(name).await
    }
}
