use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{DocumentStore, VersionToken, VersionedDocument};
use crate::error::StoreError;

/// Postgres-backed versioned store over the `documents` table
pub struct PgDocumentStore {
    pub pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, key: &str) -> Result<VersionToken, StoreError> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT version FROM documents WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.map(VersionToken).unwrap_or(VersionToken::ABSENT))
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body, version
            FROM documents
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(VersionedDocument {
                body: Some(row.try_get::<serde_json::Value, _>("body")?),
                version: VersionToken(row.try_get::<i64, _>("version")?),
            }),
            None => Ok(VersionedDocument::absent()),
        }
    }

    async fn write(
        &self,
        key: &str,
        body: serde_json::Value,
        expected: VersionToken,
    ) -> Result<VersionToken, StoreError> {
        let result = if expected.is_absent() {
            sqlx::query(
                r#"
                INSERT INTO documents (key, body, version, updated_at)
                VALUES ($1, $2, 1, NOW())
                ON CONFLICT (key) DO NOTHING
                "#,
            )
            .bind(key)
            .bind(&body)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE documents
                SET body = $2, version = version + 1, updated_at = NOW()
                WHERE key = $1 AND version = $3
                "#,
            )
            .bind(key)
            .bind(&body)
            .bind(expected.0)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            let actual = self.current_version(key).await?;
            debug!("⚠ CAS rejected on {}: expected {}, found {}", key, expected, actual);
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }

        Ok(expected.next())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}%", prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT key FROM documents
            WHERE key LIKE $1
            ORDER BY key
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }
}
