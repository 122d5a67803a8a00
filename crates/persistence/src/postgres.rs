use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{Collection, Document, DocumentGateway, PersistenceError, Result};

/// PostgreSQL-backed document gateway.
///
/// Documents live in a single `documents` table keyed by
/// `(collection, id)` with a JSONB body; counters live in `counters`.
#[derive(Clone)]
pub struct PostgresDocumentGateway {
    pool: PgPool,
}

impl PostgresDocumentGateway {
    /// Creates a new PostgreSQL document gateway.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url` and returns a gateway over it.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_document(row: PgRow) -> Result<Document> {
        Ok(Document {
            id: row.try_get("id")?,
            body: row.try_get("body")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl DocumentGateway for PostgresDocumentGateway {
    async fn list(&self, collection: Collection) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, body, updated_at
            FROM documents
            WHERE collection = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, body, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn put(&self, collection: Collection, id: &str, body: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id)
            DO UPDATE SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<()> {
        // jsonb || jsonb merges top-level keys, matching the in-memory gateway
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = body || $3, updated_at = now()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(patch)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, collection: Collection) -> Result<usize> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1")
            .bind(collection.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn increment_counter(&self, name: &str) -> Result<u64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO counters (name, value)
            VALUES ($1, 1)
            ON CONFLICT (name)
            DO UPDATE SET value = counters.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(value as u64)
    }

    async fn reset_counter(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM counters WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
