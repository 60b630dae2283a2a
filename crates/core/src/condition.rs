//! Condition evaluation (§4.5): deciding whether a conditional tuple is
//! "live" under a merged request/tuple context. CEL is the expression
//! language; compiled programs are memoized process-wide in
//! [`rebac_cache::ExpressionCache`], keyed by condition name.

use crate::error::{AuthzError, Result};
use crate::store::TupleStore;
use crate::types::{ConditionDefinition, ParameterType, Tuple};
use cel_interpreter::{Context, Program, Value};
use chrono::{DateTime, FixedOffset};
use rebac_cache::ExpressionCache;
use std::collections::HashMap;
use std::sync::Arc;

/// Compiles and evaluates named CEL conditions against a merged context,
/// caching compiled programs by condition name. One instance is shared
/// across all concurrent checks (§5 "shared resources").
#[derive(Clone)]
pub struct ConditionEvaluator {
    programs: ExpressionCache<Arc<Program>>,
}

impl ConditionEvaluator {
    pub fn new(max_cached_conditions: u64) -> Self {
        Self {
            programs: ExpressionCache::new(max_cached_conditions),
        }
    }

    /// Drop `name`'s compiled form, e.g. after an admin updates its
    /// expression. Not required for correctness (§4.5 "invalidation ...
    /// optional but recommended") — staleness is tolerated, not mandated.
    pub fn invalidate(&self, name: &str) {
        self.programs.invalidate(name);
    }

    /// True iff `tuple` is live under `request_context`. A tuple with no
    /// `condition_name` is always live.
    pub async fn is_satisfied(
        &self,
        store: &dyn TupleStore,
        tuple: &Tuple,
        request_context: &HashMap<String, serde_json::Value>,
    ) -> Result<bool> {
        let Some(condition_name) = tuple.condition_name.as_deref() else {
            return Ok(true);
        };

        let definition = store
            .find_condition_definition(condition_name)
            .await?
            .ok_or_else(|| AuthzError::ConditionNotFound {
                condition_name: condition_name.to_string(),
            })?;

        let merged = merge_context(request_context, tuple.condition_context.as_ref());
        let program = self.compile(&definition).await?;
        let cel_context = build_cel_context(&definition, &merged);

        match program.execute(&cel_context) {
            Ok(Value::Bool(true)) => Ok(true),
            Ok(_) => Ok(false),
            Err(err) if is_missing_variable(&err) => {
                tracing::warn!(condition = condition_name, %err, "condition references a variable absent from the merged context, treating as unsatisfied");
                Ok(false)
            }
            Err(err) => Err(AuthzError::ConditionEvaluationError {
                condition_name: condition_name.to_string(),
                message: err.to_string(),
            }),
        }
    }

    async fn compile(&self, definition: &ConditionDefinition) -> Result<Arc<Program>> {
        let name = definition.name.clone();
        let expression = definition.expression.clone();
        self.programs
            .get_or_try_insert_with(&name, move || async move {
                Program::compile(&expression)
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .await
            .map_err(|message| AuthzError::ConditionEvaluationError {
                condition_name: definition.name.clone(),
                message,
            })
    }
}

/// Request context seeded first, tuple's `condition_context` overlaid on
/// top — the tuple wins per key (§4.5).
fn merge_context(
    request_context: &HashMap<String, serde_json::Value>,
    tuple_context: Option<&HashMap<String, serde_json::Value>>,
) -> HashMap<String, serde_json::Value> {
    let mut merged = request_context.clone();
    if let Some(tuple_context) = tuple_context {
        for (key, value) in tuple_context {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn build_cel_context(
    definition: &ConditionDefinition,
    merged: &HashMap<String, serde_json::Value>,
) -> Context<'static> {
    let mut context = Context::default();
    for (key, value) in merged {
        let cel_value = match definition.parameters.get(key) {
            Some(declared_type) => coerce(value, *declared_type),
            None => json_to_value(value),
        };
        if let Some(cel_value) = cel_value {
            let _ = context.add_variable_from_value(key, cel_value);
        }
        // A coercion failure leaves the variable unbound rather than
        // erroring — an unbound reference surfaces as a CEL execution
        // error that `is_missing_variable` maps to "not satisfied" (§4.5).
    }
    context
}

/// Coerce a JSON value into the CEL shape declared for a condition
/// parameter. `timestamp`/`duration` are the cases §4.5 calls out by name;
/// the rest round out the closed parameter-type set so that a condition
/// touching a non-string, non-bool parameter doesn't hard-fail for a
/// reason the spec's error taxonomy doesn't name.
fn coerce(value: &serde_json::Value, declared_type: ParameterType) -> Option<Value> {
    match declared_type {
        ParameterType::Timestamp => {
            let raw = value.as_str()?;
            let parsed = DateTime::<FixedOffset>::parse_from_rfc3339(raw).ok()?;
            Some(Value::Timestamp(parsed))
        }
        ParameterType::Duration => {
            let raw = value.as_str()?;
            let std_duration = humantime::parse_duration(raw).ok()?;
            Some(Value::Duration(chrono::Duration::from_std(std_duration).ok()?))
        }
        ParameterType::String => value.as_str().map(|s| Value::String(Arc::new(s.to_string()))),
        ParameterType::Int => value.as_i64().map(Value::Int),
        ParameterType::Uint => value.as_u64().map(Value::UInt),
        ParameterType::Double => value.as_f64().map(Value::Float),
        ParameterType::Bool => value.as_bool().map(Value::Bool),
        ParameterType::List | ParameterType::Map | ParameterType::Any => json_to_value(value),
    }
}

/// Untyped JSON → CEL value conversion, used for merged-context entries
/// that aren't declared condition parameters (the expression may still
/// reference request-context keys the definition never names).
fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => Some(Value::Null),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(Value::Float)
            }
        }
        serde_json::Value::String(s) => Some(Value::String(Arc::new(s.clone()))),
        serde_json::Value::Array(items) => {
            let values: Option<Vec<Value>> = items.iter().map(json_to_value).collect();
            values.map(|v| Value::List(Arc::new(v)))
        }
        serde_json::Value::Object(map) => {
            let mut cel_map = HashMap::new();
            for (key, value) in map {
                cel_map.insert(cel_interpreter::objects::Key::String(Arc::new(key.clone())), json_to_value(value)?);
            }
            Some(Value::Map(cel_interpreter::objects::Map::from(cel_map)))
        }
    }
}

/// CEL surfaces a reference to a name absent from the context as an
/// execution error rather than `None`; §4.5 requires that specific case to
/// be tolerated as "not satisfied", not propagated.
fn is_missing_variable(err: &cel_interpreter::ExecutionError) -> bool {
    matches!(
        err,
        cel_interpreter::ExecutionError::UndeclaredReference(_) | cel_interpreter::ExecutionError::NoSuchKey(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use std::collections::HashMap;

    fn temporal_access_definition() -> ConditionDefinition {
        ConditionDefinition {
            name: "temporal_access".to_string(),
            expression: "current_time < grant_time + grant_duration".to_string(),
            parameters: HashMap::from([
                ("grant_time".to_string(), ParameterType::Timestamp),
                ("grant_duration".to_string(), ParameterType::Duration),
                ("current_time".to_string(), ParameterType::Timestamp),
            ]),
        }
    }

    #[tokio::test]
    async fn tuple_with_no_condition_is_always_satisfied() {
        let store = InMemoryStore::new();
        let evaluator = ConditionEvaluator::new(10);
        let tuple = Tuple::new("doc", "1", "viewer", "user", "alice");
        assert!(evaluator
            .is_satisfied(&store, &tuple, &HashMap::new())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_condition_definition_is_a_hard_error() {
        let store = InMemoryStore::new();
        let evaluator = ConditionEvaluator::new(10);
        let tuple = Tuple::new("doc", "1", "viewer", "user", "alice")
            .with_condition("nonexistent", HashMap::new());

        let err = evaluator
            .is_satisfied(&store, &tuple, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::ConditionNotFound { .. }));
    }

    #[tokio::test]
    async fn temporal_access_within_grant_window_is_satisfied() {
        let store = InMemoryStore::new();
        store
            .upsert_condition_definition(temporal_access_definition())
            .await
            .unwrap();
        let evaluator = ConditionEvaluator::new(10);

        let tuple = Tuple::new("doc", "1", "viewer", "user", "alice").with_condition(
            "temporal_access",
            HashMap::from([
                ("grant_time".to_string(), serde_json::json!("2023-01-01T00:00:00Z")),
                ("grant_duration".to_string(), serde_json::json!("1h")),
            ]),
        );

        let context = HashMap::from([(
            "current_time".to_string(),
            serde_json::json!("2023-01-01T00:10:00Z"),
        )]);
        assert!(evaluator.is_satisfied(&store, &tuple, &context).await.unwrap());

        let expired_context = HashMap::from([(
            "current_time".to_string(),
            serde_json::json!("2023-01-01T02:00:00Z"),
        )]);
        assert!(!evaluator
            .is_satisfied(&store, &tuple, &expired_context)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_context_variable_is_tolerated_as_unsatisfied() {
        let store = InMemoryStore::new();
        store
            .upsert_condition_definition(temporal_access_definition())
            .await
            .unwrap();
        let evaluator = ConditionEvaluator::new(10);

        let tuple = Tuple::new("doc", "1", "viewer", "user", "alice").with_condition(
            "temporal_access",
            HashMap::from([
                ("grant_time".to_string(), serde_json::json!("2023-01-01T00:00:00Z")),
                ("grant_duration".to_string(), serde_json::json!("1h")),
            ]),
        );

        assert!(!evaluator
            .is_satisfied(&store, &tuple, &HashMap::new())
            .await
            .unwrap());
    }
}
