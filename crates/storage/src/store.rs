//! Postgres-backed [`TupleStore`] (§6.3). Runtime-checked queries
//! (`query_as::<_, T>(&str)`), matching the style the teacher uses
//! wherever compile-time `query!`/`query_as!` metadata isn't available —
//! there is no schema database to check this crate's queries against at
//! the time it's written.

use crate::config::PostgresConfig;
use crate::error::{store_error, Result as StorageResult};
use async_trait::async_trait;
use rebac_core::{ConditionDefinition, RelationConfig, Result, SubjectRef, Tuple, TupleStore};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};

/// `"*"` is stored as the literal string, not a reserved sentinel (§9
/// "subject-id wildcard sentinel" — a deployment that wants one should
/// translate at this boundary and nowhere else).
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &PostgresConfig) -> StorageResult<Self> {
        let options: PgConnectOptions = config.url.parse().map_err(sqlx::Error::Configuration)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(config.idle_timeout())
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_tuple(row: &sqlx::postgres::PgRow) -> Result<Tuple> {
    let condition_context: Option<serde_json::Value> = row.get("condition_context");
    let condition_context = condition_context
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| rebac_core::AuthzError::InvalidStoredData(e.to_string()))?;
    Ok(Tuple {
        object_type: row.get("object_type"),
        object_id: row.get("object_id"),
        relation: row.get("relation"),
        subject_type: row.get("subject_type"),
        subject_id: row.get("subject_id"),
        subject_relation: row.get("subject_relation"),
        condition_name: row.get("condition_name"),
        condition_context,
    })
}

#[async_trait]
impl TupleStore for PostgresStore {
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Option<Tuple>> {
        let row = sqlx::query(
            r#"
            SELECT object_type, object_id, relation, subject_type, subject_id,
                   subject_relation, condition_name, condition_context
            FROM relation_tuples
            WHERE object_type = $1 AND object_id = $2 AND relation = $3
              AND subject_type = $4 AND subject_id = $5 AND subject_relation IS NULL
            "#,
        )
        .bind(object_type)
        .bind(object_id)
        .bind(relation)
        .bind(subject_type)
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(row_to_tuple).transpose()
    }

    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<Tuple>> {
        let rows = sqlx::query(
            r#"
            SELECT object_type, object_id, relation, subject_type, subject_id,
                   subject_relation, condition_name, condition_context
            FROM relation_tuples
            WHERE object_type = $1 AND object_id = $2 AND relation = $3
              AND subject_relation IS NOT NULL
            "#,
        )
        .bind(object_type)
        .bind(object_id)
        .bind(relation)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(row_to_tuple).collect()
    }

    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<Tuple>> {
        let rows = sqlx::query(
            r#"
            SELECT object_type, object_id, relation, subject_type, subject_id,
                   subject_relation, condition_name, condition_context
            FROM relation_tuples
            WHERE object_type = $1 AND object_id = $2 AND relation = $3
            "#,
        )
        .bind(object_type)
        .bind(object_id)
        .bind(relation)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(row_to_tuple).collect()
    }

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> Result<Option<RelationConfig>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT config FROM relation_configs WHERE object_type = $1 AND relation = $2")
                .bind(object_type)
                .bind(relation)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        row.map(|(config,)| {
            serde_json::from_value(config)
                .map_err(|e| rebac_core::AuthzError::InvalidStoredData(e.to_string()))
        })
        .transpose()
    }

    async fn find_condition_definition(&self, name: &str) -> Result<Option<ConditionDefinition>> {
        let row: Option<(String, String, serde_json::Value)> = sqlx::query_as(
            "SELECT name, expression, parameters FROM condition_definitions WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(|(name, expression, parameters)| {
            Ok(ConditionDefinition {
                name,
                expression,
                parameters: serde_json::from_value(parameters)
                    .map_err(|e| rebac_core::AuthzError::InvalidStoredData(e.to_string()))?,
            })
        })
        .transpose()
    }

    async fn list_candidate_object_ids(&self, object_type: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT object_id FROM relation_tuples WHERE object_type = $1",
        )
        .bind(object_type)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_direct_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> Result<Vec<SubjectRef>> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT subject_type, subject_id, subject_relation
            FROM relation_tuples
            WHERE object_type = $1 AND object_id = $2 AND relation = $3
            "#,
        )
        .bind(object_type)
        .bind(object_id)
        .bind(relation)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows
            .into_iter()
            .map(|(subject_type, subject_id, subject_relation)| SubjectRef {
                subject_type,
                subject_id,
                subject_relation,
            })
            .collect())
    }

    async fn insert_tuple(&self, tuple: Tuple) -> Result<()> {
        let condition_context = tuple
            .condition_context
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(store_error)?;

        sqlx::query(
            r#"
            INSERT INTO relation_tuples
                (object_type, object_id, relation, subject_type, subject_id, subject_relation,
                 condition_name, condition_context)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (object_type, object_id, relation, subject_type, subject_id, COALESCE(subject_relation, ''))
            DO UPDATE SET condition_name = EXCLUDED.condition_name,
                          condition_context = EXCLUDED.condition_context
            "#,
        )
        .bind(&tuple.object_type)
        .bind(&tuple.object_id)
        .bind(&tuple.relation)
        .bind(&tuple.subject_type)
        .bind(&tuple.subject_id)
        .bind(&tuple.subject_relation)
        .bind(&tuple.condition_name)
        .bind(condition_context)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn delete_tuple(&self, tuple: &Tuple) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM relation_tuples
            WHERE object_type = $1 AND object_id = $2 AND relation = $3
              AND subject_type = $4 AND subject_id = $5
              AND subject_relation IS NOT DISTINCT FROM $6
            "#,
        )
        .bind(&tuple.object_type)
        .bind(&tuple.object_id)
        .bind(&tuple.relation)
        .bind(&tuple.subject_type)
        .bind(&tuple.subject_id)
        .bind(&tuple.subject_relation)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
    ) -> Result<()> {
        let config_json = serde_json::to_value(&config).map_err(store_error)?;
        sqlx::query(
            r#"
            INSERT INTO relation_configs (object_type, relation, config)
            VALUES ($1, $2, $3)
            ON CONFLICT (object_type, relation) DO UPDATE SET config = EXCLUDED.config
            "#,
        )
        .bind(object_type)
        .bind(relation)
        .bind(config_json)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn delete_relation_config(&self, object_type: &str, relation: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM relation_configs WHERE object_type = $1 AND relation = $2")
                .bind(object_type)
                .bind(relation)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_condition_definition(&self, definition: ConditionDefinition) -> Result<()> {
        let parameters = serde_json::to_value(&definition.parameters).map_err(store_error)?;
        sqlx::query(
            r#"
            INSERT INTO condition_definitions (name, expression, parameters)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET expression = EXCLUDED.expression, parameters = EXCLUDED.parameters
            "#,
        )
        .bind(&definition.name)
        .bind(&definition.expression)
        .bind(parameters)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn delete_condition_definition(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM condition_definitions WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }
}
