//! The admin pre-validation façade (§4.4). A thin wrapper: only
//! `add_tuple` has non-trivial semantics — everything else passes through
//! to the store. This module never evaluates a check; it only guards
//! writes.

use crate::error::{AuthzError, Result};
use crate::store::TupleStore;
use crate::types::{ConditionDefinition, DirectlyAssignableType, RelationConfig, Tuple, WILDCARD};
use std::sync::Arc;

pub struct AdminClient {
    store: Arc<dyn TupleStore>,
}

impl AdminClient {
    pub fn new(store: Arc<dyn TupleStore>) -> Self {
        Self { store }
    }

    /// §4.4 steps 1-4. Fails closed: a relation with no configuration at
    /// all cannot be written to directly, even though it can still be
    /// *read* (§3 "Lifecycles" — absent config is legal for read, not
    /// write).
    pub async fn add_tuple(&self, tuple: Tuple) -> Result<()> {
        let config = self
            .store
            .find_relation_config(&tuple.object_type, &tuple.relation)
            .await?
            .ok_or_else(|| AuthzError::RelationConfigNotFound {
                object_type: tuple.object_type.clone(),
                relation: tuple.relation.clone(),
            })?;

        if let Some(allowed_types) = &config.directly_assignable_types {
            let subject_ref = subject_reference(&tuple);
            if !allowed_types
                .iter()
                .any(|allowed| allowed.matches(&tuple.subject_type, &tuple.subject_id))
            {
                return Err(AuthzError::InvalidSubjectType {
                    object_type: tuple.object_type.clone(),
                    relation: tuple.relation.clone(),
                    subject_ref,
                });
            }
        }

        if tuple.subject_relation.is_some() && !config.allows_userset_subjects {
            return Err(AuthzError::UsersetNotAllowed {
                object_type: tuple.object_type.clone(),
                relation: tuple.relation.clone(),
            });
        }

        tracing::info!(
            object_type = %tuple.object_type,
            object_id = %tuple.object_id,
            relation = %tuple.relation,
            subject_type = %tuple.subject_type,
            subject_id = %tuple.subject_id,
            "writing tuple"
        );
        self.store.insert_tuple(tuple).await
    }

    pub async fn remove_tuple(&self, tuple: &Tuple) -> Result<bool> {
        self.store.delete_tuple(tuple).await
    }

    pub async fn write_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
    ) -> Result<()> {
        self.store.upsert_relation_config(object_type, relation, config).await
    }

    pub async fn delete_relation_config(&self, object_type: &str, relation: &str) -> Result<bool> {
        self.store.delete_relation_config(object_type, relation).await
    }

    pub async fn write_condition_definition(&self, definition: ConditionDefinition) -> Result<()> {
        self.store.upsert_condition_definition(definition).await
    }

    pub async fn delete_condition_definition(&self, name: &str) -> Result<bool> {
        self.store.delete_condition_definition(name).await
    }
}

/// `"T:*"` when the subject id is the wildcard, else plain `"T"` (§4.4
/// step 2).
fn subject_reference(tuple: &Tuple) -> String {
    if tuple.subject_id == WILDCARD {
        format!("{}:*", tuple.subject_type)
    } else {
        tuple.subject_type.clone()
    }
}
