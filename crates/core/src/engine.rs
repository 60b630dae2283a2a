//! The check evaluator (§4.1, §4.2): the recursive, depth-bounded resolver
//! that composes direct assignment, usersets, relation-configuration
//! rewrites, intersection, and exclusion into a single boolean. Everything
//! else in this crate exists to support this module.

use crate::condition::ConditionEvaluator;
use crate::contextual::ContextualStore;
use crate::error::Result;
use crate::store::{SubjectRef, TupleStore};
use crate::types::{IntersectionOperand, RelationConfig, Tuple, TupleToUserset, WILDCARD};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// §4.1 default: a safety net against cycles, not a semantic answer.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// A check request (§4.1). `contextual_tuples` are visible only for the
/// duration of this one call (§4.3, §8 "contextual tuple locality").
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    pub context: HashMap<String, serde_json::Value>,
    pub contextual_tuples: Vec<Tuple>,
    pub max_depth: u32,
}

impl CheckRequest {
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            relation: relation.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            context: HashMap::new(),
            contextual_tuples: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_context(mut self, context: HashMap<String, serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_contextual_tuples(mut self, tuples: Vec<Tuple>) -> Self {
        self.contextual_tuples = tuples;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves `check`, `list_objects`, and `list_subjects` against a
/// [`TupleStore`], sharing one process-wide [`ConditionEvaluator`] across
/// concurrently running checks (§5).
#[derive(Clone)]
pub struct CheckEvaluator {
    store: Arc<dyn TupleStore>,
    conditions: ConditionEvaluator,
}

impl CheckEvaluator {
    pub fn new(store: Arc<dyn TupleStore>, conditions: ConditionEvaluator) -> Self {
        Self { store, conditions }
    }

    /// §4.2: the public entry point. Builds the contextual overlay when
    /// the request carries contextual tuples, then resolves at depth 0.
    pub async fn check(&self, request: CheckRequest) -> Result<bool> {
        if request.contextual_tuples.is_empty() {
            self.resolve(
                self.store.as_ref(),
                &request.object_type,
                &request.object_id,
                &request.relation,
                &request.subject_type,
                &request.subject_id,
                &request.context,
                0,
                request.max_depth,
            )
            .await
        } else {
            let overlay = ContextualStore::new(self.store.clone(), request.contextual_tuples.clone());
            self.resolve(
                &overlay,
                &request.object_type,
                &request.object_id,
                &request.relation,
                &request.subject_type,
                &request.subject_id,
                &request.context,
                0,
                request.max_depth,
            )
            .await
        }
    }

    /// §6.2: `list_candidate_object_ids` followed by a per-candidate
    /// `check`. Deliberately not reverse-indexed (§9 Open Question).
    pub async fn list_objects(
        &self,
        object_type: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<String>> {
        let candidates = self.store.list_candidate_object_ids(object_type).await?;
        tracing::debug!(object_type, relation, candidate_count = candidates.len(), "scanning candidates for list_objects");

        let mut matches = Vec::new();
        for object_id in candidates {
            let request = CheckRequest::new(object_type, object_id.clone(), relation, subject_type, subject_id);
            if self.check(request).await? {
                matches.push(object_id);
            }
        }
        Ok(matches)
    }

    /// §6.2 / SPEC_FULL supplement: a non-recursive, syntactic view of
    /// everything recorded against `(object_type, object_id, relation)` —
    /// an administrative "who can see this" listing, not a `check`.
    pub async fn list_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<SubjectRef>> {
        self.store.list_direct_subjects(object_type, object_id, relation).await
    }

    fn resolve<'a>(
        &'a self,
        store: &'a dyn TupleStore,
        object_type: &'a str,
        object_id: &'a str,
        relation: &'a str,
        subject_type: &'a str,
        subject_id: &'a str,
        context: &'a HashMap<String, serde_json::Value>,
        depth: u32,
        max_depth: u32,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            if depth > max_depth {
                tracing::debug!(object_type, object_id, relation, subject_type, subject_id, depth, "max depth exceeded, denying");
                return Ok(false);
            }

            if self
                .steps_abc(store, object_type, object_id, relation, subject_type, subject_id, context, depth, max_depth)
                .await?
            {
                return self
                    .apply_exclusion(store, object_type, object_id, relation, subject_type, subject_id, context, depth, max_depth, true)
                    .await;
            }

            self.apply_exclusion(store, object_type, object_id, relation, subject_type, subject_id, context, depth, max_depth, false)
                .await
        })
    }

    /// Steps A (direct), B (wildcard), C (userset tuples) — §4.2. Also the
    /// `direct` operand of an `intersection` (§4.2 step D.4: "direct/
    /// wildcard/userset tuples only — no rewrites").
    async fn steps_abc(
        &self,
        store: &dyn TupleStore,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        context: &HashMap<String, serde_json::Value>,
        depth: u32,
        max_depth: u32,
    ) -> Result<bool> {
        if let Some(tuple) = store
            .find_direct_tuple(object_type, object_id, relation, subject_type, subject_id)
            .await?
        {
            if self.conditions.is_satisfied(store, &tuple, context).await? {
                return Ok(true);
            }
        }

        if subject_id != WILDCARD {
            if let Some(tuple) = store
                .find_direct_tuple(object_type, object_id, relation, subject_type, WILDCARD)
                .await?
            {
                if self.conditions.is_satisfied(store, &tuple, context).await? {
                    return Ok(true);
                }
            }
        }

        for tuple in store.find_userset_tuples(object_type, object_id, relation).await? {
            if !self.conditions.is_satisfied(store, &tuple, context).await? {
                continue;
            }
            let userset_relation = tuple
                .subject_relation
                .as_deref()
                .expect("find_userset_tuples only returns tuples with a subject_relation");
            if self
                .resolve(store, &tuple.subject_type, &tuple.subject_id, userset_relation, subject_type, subject_id, context, depth + 1, max_depth)
                .await?
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Step D (relation configuration rewrites) plus Step E (exclusion),
    /// given whether A/B/C already produced a tentative true. Exclusion
    /// wraps the whole relation (§4.2 step E), so it's evaluated here
    /// regardless of which earlier step produced the tentative answer.
    async fn apply_exclusion(
        &self,
        store: &dyn TupleStore,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        context: &HashMap<String, serde_json::Value>,
        depth: u32,
        max_depth: u32,
        already_tentative: bool,
    ) -> Result<bool> {
        let config = store.find_relation_config(object_type, relation).await?;

        let tentative = if already_tentative {
            true
        } else {
            match &config {
                Some(config) => {
                    self.resolve_rewrites(store, config, object_type, object_id, relation, subject_type, subject_id, context, depth, max_depth)
                        .await?
                }
                None => false,
            }
        };

        if !tentative {
            return Ok(false);
        }

        if let Some(config) = &config {
            if let Some(excluded_by) = &config.excluded_by {
                let excluded = self
                    .resolve(store, object_type, object_id, excluded_by, subject_type, subject_id, context, depth + 1, max_depth)
                    .await?;
                if excluded {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Step D.1-D.4, in the order the spec mandates, early-terminating on
    /// the first success (§4.2 "Ordering and tie-breaks").
    #[allow(clippy::too_many_arguments)]
    async fn resolve_rewrites(
        &self,
        store: &dyn TupleStore,
        config: &RelationConfig,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        context: &HashMap<String, serde_json::Value>,
        depth: u32,
        max_depth: u32,
    ) -> Result<bool> {
        if let Some(implied_by) = &config.implied_by {
            for sibling in implied_by {
                if self
                    .resolve(store, object_type, object_id, sibling, subject_type, subject_id, context, depth + 1, max_depth)
                    .await?
                {
                    return Ok(true);
                }
            }
        }

        if let Some(computed_userset) = &config.computed_userset {
            if self
                .resolve(store, object_type, object_id, computed_userset, subject_type, subject_id, context, depth + 1, max_depth)
                .await?
            {
                return Ok(true);
            }
        }

        if let Some(ttu_list) = &config.tuple_to_userset {
            for ttu in ttu_list {
                if self
                    .resolve_tuple_to_userset(store, ttu, object_type, object_id, subject_type, subject_id, context, depth, max_depth)
                    .await?
                {
                    return Ok(true);
                }
            }
        }

        if let Some(operands) = &config.intersection {
            return self
                .resolve_intersection(store, operands, object_type, object_id, relation, subject_type, subject_id, context, depth, max_depth)
                .await;
        }

        Ok(false)
    }

    /// `tuple_to_userset`: follow tuples of relation `ttu.tupleset` on the
    /// current object to their subject objects, and require
    /// `ttu.computed_userset` on each (§4.2 step D.3). A condition on the
    /// tupleset tuple itself gates the rewrite (§9 Open Question).
    #[allow(clippy::too_many_arguments)]
    async fn resolve_tuple_to_userset(
        &self,
        store: &dyn TupleStore,
        ttu: &TupleToUserset,
        object_type: &str,
        object_id: &str,
        subject_type: &str,
        subject_id: &str,
        context: &HashMap<String, serde_json::Value>,
        depth: u32,
        max_depth: u32,
    ) -> Result<bool> {
        for tuple in store.find_tuples_by_relation(object_type, object_id, &ttu.tupleset).await? {
            if !self.conditions.is_satisfied(store, &tuple, context).await? {
                continue;
            }
            if self
                .resolve(store, &tuple.subject_type, &tuple.subject_id, &ttu.computed_userset, subject_type, subject_id, context, depth + 1, max_depth)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `intersection`: every operand must hold (§4.2 step D.4).
    #[allow(clippy::too_many_arguments)]
    async fn resolve_intersection(
        &self,
        store: &dyn TupleStore,
        operands: &[IntersectionOperand],
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        context: &HashMap<String, serde_json::Value>,
        depth: u32,
        max_depth: u32,
    ) -> Result<bool> {
        for operand in operands {
            let holds = match operand {
                IntersectionOperand::Direct => {
                    self.steps_abc(store, object_type, object_id, relation, subject_type, subject_id, context, depth + 1, max_depth)
                        .await?
                }
                IntersectionOperand::ComputedUserset { relation: computed } => {
                    self.resolve(store, object_type, object_id, computed, subject_type, subject_id, context, depth + 1, max_depth)
                        .await?
                }
                IntersectionOperand::TupleToUserset(ttu) => {
                    self.resolve_tuple_to_userset(store, ttu, object_type, object_id, subject_type, subject_id, context, depth, max_depth)
                        .await?
                }
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
