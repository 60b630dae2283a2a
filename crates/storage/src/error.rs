use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors outside the `TupleStore` contract itself — connecting, running
/// migrations. Errors raised *through* `TupleStore` methods are mapped to
/// `rebac_core::AuthzError` at the call site instead (`Store` for a failed
/// query, `InvalidStoredData` for a row that doesn't deserialize), since
/// `AuthzError` is what the evaluator's `Result` alias expects.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Maps any storage-layer failure onto the evaluator's error type. Kept as
/// a free function rather than a `From` impl because orphan rules forbid
/// implementing a foreign trait (`std::convert::From`) for a foreign type
/// (`rebac_core::AuthzError`) from this crate.
pub(crate) fn store_error(err: impl std::fmt::Display) -> rebac_core::AuthzError {
    rebac_core::AuthzError::Store(err.to_string())
}
