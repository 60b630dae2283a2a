use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthzError>;

/// Error taxonomy for the evaluator (§4.6).
///
/// The write-path variants (`RelationConfigNotFound`, `InvalidSubjectType`,
/// `UsersetNotAllowed`) are raised by [`crate::admin::AdminClient`] before a
/// tuple is ever written. The check-path variants (`ConditionNotFound`,
/// `ConditionEvaluationError`) are the only two outcomes of a `check` call
/// that are *not* a boolean — everything else (missing relation config,
/// unsatisfied condition, depth exceeded, unknown condition variable) is a
/// tolerated `false`, never an `Err`. `InvalidStoredData` and `Store`
/// originate from a [`crate::store::TupleStore`] implementation and are
/// surfaced unchanged.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("relation configuration not found for {object_type}#{relation}")]
    RelationConfigNotFound { object_type: String, relation: String },

    #[error("subject reference `{subject_ref}` is not assignable on {object_type}#{relation}")]
    InvalidSubjectType {
        object_type: String,
        relation: String,
        subject_ref: String,
    },

    #[error("userset subjects are not allowed on {object_type}#{relation}")]
    UsersetNotAllowed { object_type: String, relation: String },

    #[error("condition `{condition_name}` is not defined")]
    ConditionNotFound { condition_name: String },

    #[error("condition `{condition_name}` failed to evaluate: {message}")]
    ConditionEvaluationError {
        condition_name: String,
        message: String,
    },

    #[error("stored data is invalid: {0}")]
    InvalidStoredData(String),

    #[error("store operation failed: {0}")]
    Store(String),
}
