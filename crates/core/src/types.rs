//! The data model (§3): tuples, relation configurations, and condition
//! definitions. None of these types know how to evaluate anything — that's
//! [`crate::engine`] and [`crate::condition`]. This module only knows how
//! to be parsed, stored, and compared.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The subject id literal that means "every principal of the stated type".
/// The storage layer is free to translate this to a reserved sentinel on
/// the way in or out; the evaluator only ever reasons about `"*"`.
pub const WILDCARD: &str = "*";

/// An assertion that a subject has a relation on an object (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    /// Present iff the subject is a userset: "every principal with
    /// `subject_relation` on `(subject_type, subject_id)`".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_context: Option<HashMap<String, serde_json::Value>>,
}

impl Tuple {
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
            subject_relation: None,
            condition_name: None,
            condition_context: None,
        }
    }

    pub fn with_subject_relation(mut self, subject_relation: impl Into<String>) -> Self {
        self.subject_relation = Some(subject_relation.into());
        self
    }

    pub fn with_condition(
        mut self,
        condition_name: impl Into<String>,
        condition_context: HashMap<String, serde_json::Value>,
    ) -> Self {
        self.condition_name = Some(condition_name.into());
        self.condition_context = Some(condition_context);
        self
    }

    pub fn is_userset(&self) -> bool {
        self.subject_relation.is_some()
    }

    pub fn is_wildcard(&self) -> bool {
        self.subject_id == WILDCARD && self.subject_relation.is_none()
    }

    /// `(object_type, object_id, relation, subject_type, subject_id,
    /// subject_relation-or-empty)` — the natural key writes upsert on
    /// (§3 "Natural key").
    pub fn natural_key(&self) -> (&str, &str, &str, &str, &str, &str) {
        (
            &self.object_type,
            &self.object_id,
            &self.relation,
            &self.subject_type,
            &self.subject_id,
            self.subject_relation.as_deref().unwrap_or(""),
        )
    }
}

/// A type reference accepted by `directly_assignable_types`: either a plain
/// principal type or a wildcard principal type (`T:*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectlyAssignableType {
    Principal(String),
    Wildcard(String),
}

impl DirectlyAssignableType {
    /// Parse the `T` / `T:*` string form used in relation configuration.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix(":*") {
            Some(type_name) => DirectlyAssignableType::Wildcard(type_name.to_string()),
            None => DirectlyAssignableType::Principal(raw.to_string()),
        }
    }

    /// True iff an incoming write's subject reference — `T:*` when
    /// `subject_id == "*"`, else `T` — matches this entry (§4.4 step 2).
    pub fn matches(&self, subject_type: &str, subject_id: &str) -> bool {
        match self {
            DirectlyAssignableType::Principal(t) => t == subject_type && subject_id != WILDCARD,
            DirectlyAssignableType::Wildcard(t) => t == subject_type && subject_id == WILDCARD,
        }
    }
}

/// `{tupleset, computed_userset}` — the tuple-to-userset rewrite operand
/// (§3, used both as a top-level rewrite and as an intersection operand).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleToUserset {
    pub tupleset: String,
    pub computed_userset: String,
}

/// One operand of an `intersection` relation (§3, §4.2 step D.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IntersectionOperand {
    /// Direct/wildcard/userset tuples only — no rewrites.
    Direct,
    ComputedUserset { relation: String },
    TupleToUserset(TupleToUserset),
}

/// The schema for one `(object_type, relation)` pair (§3 "Relation
/// configuration"). Absence of a config for a relation is legal — it just
/// means direct tuples only (§4.2 step D: "If absent, skip D entirely").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RelationConfig {
    #[serde(default)]
    pub directly_assignable_types: Option<Vec<DirectlyAssignableType>>,
    #[serde(default)]
    pub implied_by: Option<Vec<String>>,
    #[serde(default)]
    pub computed_userset: Option<String>,
    #[serde(default)]
    pub tuple_to_userset: Option<Vec<TupleToUserset>>,
    #[serde(default)]
    pub excluded_by: Option<String>,
    #[serde(default)]
    pub intersection: Option<Vec<IntersectionOperand>>,
    #[serde(default)]
    pub allows_userset_subjects: bool,
}

/// The closed set of CEL parameter types a condition definition may declare
/// (§3 "Condition definition").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Int,
    Uint,
    Bool,
    Double,
    Duration,
    Timestamp,
    List,
    Map,
    Any,
}

/// A named, parameterized CEL expression that gates a tuple's liveness
/// (§3 "Condition definition").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_key_coalesces_missing_subject_relation() {
        let direct = Tuple::new("doc", "1", "viewer", "user", "alice");
        let userset =
            Tuple::new("doc", "1", "viewer", "team", "eng").with_subject_relation("member");
        assert_eq!(direct.natural_key().5, "");
        assert_eq!(userset.natural_key().5, "member");
    }

    #[test]
    fn wildcard_detection_requires_no_subject_relation() {
        let wildcard = Tuple::new("doc", "1", "viewer", "user", WILDCARD);
        assert!(wildcard.is_wildcard());

        let not_wildcard =
            Tuple::new("doc", "1", "viewer", "user", WILDCARD).with_subject_relation("member");
        assert!(!not_wildcard.is_wildcard());
    }

    #[test]
    fn directly_assignable_type_parses_wildcard_suffix() {
        assert_eq!(
            DirectlyAssignableType::parse("user:*"),
            DirectlyAssignableType::Wildcard("user".to_string())
        );
        assert_eq!(
            DirectlyAssignableType::parse("user"),
            DirectlyAssignableType::Principal("user".to_string())
        );
    }

    #[test]
    fn directly_assignable_type_matches_subject_reference() {
        let principal = DirectlyAssignableType::parse("user");
        assert!(principal.matches("user", "alice"));
        assert!(!principal.matches("user", WILDCARD));

        let wildcard = DirectlyAssignableType::parse("user:*");
        assert!(wildcard.matches("user", WILDCARD));
        assert!(!wildcard.matches("user", "alice"));
    }
}
