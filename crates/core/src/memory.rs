//! An in-memory [`TupleStore`] with real graph semantics, used by this
//! crate's own tests and by [`rebac_conformance`]. Unlike a mock, it
//! actually stores tuples and answers every read honestly — it's the
//! approachable reference adapter; [`rebac_storage`] is the deployable one
//! (§1: "A reference storage adapter exists but is not the interesting
//! engineering").

use crate::error::Result;
use crate::store::{SubjectRef, TupleStore};
use crate::types::{ConditionDefinition, RelationConfig, Tuple};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    tuples: RwLock<Vec<Tuple>>,
    relation_configs: RwLock<HashMap<(String, String), RelationConfig>>,
    conditions: RwLock<HashMap<String, ConditionDefinition>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tuples.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.read().unwrap().is_empty()
    }
}

#[async_trait]
impl TupleStore for InMemoryStore {
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Option<Tuple>> {
        let tuples = self.tuples.read().unwrap();
        Ok(tuples
            .iter()
            .find(|t| {
                t.object_type == object_type
                    && t.object_id == object_id
                    && t.relation == relation
                    && t.subject_type == subject_type
                    && t.subject_id == subject_id
                    && t.subject_relation.is_none()
            })
            .cloned())
    }

    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<Tuple>> {
        let tuples = self.tuples.read().unwrap();
        Ok(tuples
            .iter()
            .filter(|t| {
                t.object_type == object_type
                    && t.object_id == object_id
                    && t.relation == relation
                    && t.subject_relation.is_some()
            })
            .cloned()
            .collect())
    }

    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<Tuple>> {
        let tuples = self.tuples.read().unwrap();
        Ok(tuples
            .iter()
            .filter(|t| t.object_type == object_type && t.object_id == object_id && t.relation == relation)
            .cloned()
            .collect())
    }

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> Result<Option<RelationConfig>> {
        let configs = self.relation_configs.read().unwrap();
        Ok(configs
            .get(&(object_type.to_string(), relation.to_string()))
            .cloned())
    }

    async fn find_condition_definition(&self, name: &str) -> Result<Option<ConditionDefinition>> {
        let conditions = self.conditions.read().unwrap();
        Ok(conditions.get(name).cloned())
    }

    async fn list_candidate_object_ids(&self, object_type: &str) -> Result<Vec<String>> {
        let tuples = self.tuples.read().unwrap();
        let mut ids: Vec<String> = tuples
            .iter()
            .filter(|t| t.object_type == object_type)
            .map(|t| t.object_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn list_direct_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<SubjectRef>> {
        let tuples = self.tuples.read().unwrap();
        Ok(tuples
            .iter()
            .filter(|t| t.object_type == object_type && t.object_id == object_id && t.relation == relation)
            .map(SubjectRef::from)
            .collect())
    }

    async fn insert_tuple(&self, tuple: Tuple) -> Result<()> {
        let mut tuples = self.tuples.write().unwrap();
        let key = tuple.natural_key();
        if let Some(existing) = tuples.iter_mut().find(|t| t.natural_key() == key) {
            *existing = tuple;
        } else {
            tracing::info!(
                object_type = %tuple.object_type,
                object_id = %tuple.object_id,
                relation = %tuple.relation,
                subject_type = %tuple.subject_type,
                subject_id = %tuple.subject_id,
                "inserted tuple"
            );
            tuples.push(tuple);
        }
        Ok(())
    }

    async fn delete_tuple(&self, tuple: &Tuple) -> Result<bool> {
        let mut tuples = self.tuples.write().unwrap();
        let key = tuple.natural_key();
        let before = tuples.len();
        tuples.retain(|t| t.natural_key() != key);
        Ok(tuples.len() != before)
    }

    async fn upsert_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
    ) -> Result<()> {
        self.relation_configs
            .write()
            .unwrap()
            .insert((object_type.to_string(), relation.to_string()), config);
        Ok(())
    }

    async fn delete_relation_config(&self, object_type: &str, relation: &str) -> Result<bool> {
        Ok(self
            .relation_configs
            .write()
            .unwrap()
            .remove(&(object_type.to_string(), relation.to_string()))
            .is_some())
    }

    async fn upsert_condition_definition(&self, definition: ConditionDefinition) -> Result<()> {
        self.conditions
            .write()
            .unwrap()
            .insert(definition.name.clone(), definition);
        Ok(())
    }

    async fn delete_condition_definition(&self, name: &str) -> Result<bool> {
        Ok(self.conditions.write().unwrap().remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_an_upsert_on_the_natural_key() {
        let store = InMemoryStore::new();
        store
            .insert_tuple(Tuple::new("doc", "1", "viewer", "user", "alice"))
            .await
            .unwrap();
        store
            .insert_tuple(
                Tuple::new("doc", "1", "viewer", "user", "alice")
                    .with_condition("expiring", Default::default()),
            )
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let tuple = store
            .find_direct_tuple("doc", "1", "viewer", "user", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tuple.condition_name.as_deref(), Some("expiring"));
    }

    #[tokio::test]
    async fn delete_missing_tuple_returns_false() {
        let store = InMemoryStore::new();
        let removed = store
            .delete_tuple(&Tuple::new("doc", "1", "viewer", "user", "alice"))
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn list_candidate_object_ids_is_distinct_and_type_scoped() {
        let store = InMemoryStore::new();
        store
            .insert_tuple(Tuple::new("doc", "1", "viewer", "user", "alice"))
            .await
            .unwrap();
        store
            .insert_tuple(Tuple::new("doc", "1", "editor", "user", "bob"))
            .await
            .unwrap();
        store
            .insert_tuple(Tuple::new("doc", "2", "viewer", "user", "alice"))
            .await
            .unwrap();
        store
            .insert_tuple(Tuple::new("folder", "f", "viewer", "user", "alice"))
            .await
            .unwrap();

        let mut ids = store.list_candidate_object_ids("doc").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    }
}
