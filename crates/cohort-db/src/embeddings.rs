//! Vector store implementation over pgvector.
//!
//! Components are stored as pgvector `vector` values (single-precision), so
//! the write path and the query path see the same `f32` values. Distances use
//! the `<->` (L2) operator.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use cohort_core::{EntityKind, Error, Neighbor, Result, VectorStore, Visibility};

/// PostgreSQL implementation of VectorStore.
#[derive(Clone)]
pub struct PgVectorStore {
    pool: Pool<Postgres>,
}

impl PgVectorStore {
    /// Create a new PgVectorStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Replace an embedding within an existing transaction.
    ///
    /// Locks the entity row first so a concurrent delete cannot slip between
    /// the existence check and the insert.
    pub async fn upsert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entity_id: Uuid,
        vector: &[f32],
    ) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidInput("cannot store an empty vector".into()));
        }

        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM entity WHERE id = $1 FOR UPDATE")
                .bind(entity_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(Error::Database)?;
        if exists.is_none() {
            return Err(Error::EntityNotFound(entity_id));
        }

        sqlx::query("DELETE FROM entity_embedding WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO entity_embedding (entity_id, vector, created_at) VALUES ($1, $2, $3)",
        )
        .bind(entity_id)
        .bind(Vector::from(vector.to_vec()))
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("UPDATE entity SET embedding_updated_at = $2 WHERE id = $1")
            .bind(entity_id)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    #[instrument(
        skip(self, vector),
        fields(
            subsystem = "db",
            component = "vector_store",
            op = "upsert",
            dimension = vector.len()
        )
    )]
    async fn upsert(&self, entity_id: Uuid, vector: &[f32]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        // Dropping the transaction on error rolls it back.
        self.upsert_tx(&mut tx, entity_id, vector).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn get_vector(&self, entity_id: Uuid) -> Result<Option<Vec<f32>>> {
        let vector: Option<Vector> =
            sqlx::query_scalar("SELECT vector FROM entity_embedding WHERE entity_id = $1")
                .bind(entity_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(vector.map(|v| v.to_vec()))
    }

    async fn knn(
        &self,
        query: &[f32],
        k: usize,
        kind: Option<EntityKind>,
    ) -> Result<Vec<Neighbor>> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        // Visibility is checked here, not at embedding time, so hiding an
        // entity takes effect without re-embedding.
        let rows = sqlx::query(
            r#"
            SELECT e.entity_id,
                   n.kind,
                   e.vector <-> $1::vector AS distance
            FROM entity_embedding e
            JOIN entity n ON n.id = e.entity_id
            WHERE n.visibility = ANY($2)
              AND ($3::text IS NULL OR n.kind = $3)
            ORDER BY e.vector <-> $1::vector, e.entity_id
            LIMIT $4
            "#,
        )
        .bind(Vector::from(query.to_vec()))
        .bind(Visibility::publishable_strs())
        .bind(kind.map(|k| k.as_str()))
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let neighbors = rows
            .into_iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                Ok(Neighbor {
                    entity_id: row.try_get("entity_id")?,
                    kind: kind.parse()?,
                    distance: row.try_get::<f64, _>("distance")? as f32,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            subsystem = "db",
            component = "vector_store",
            op = "knn",
            k,
            result_count = neighbors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "KNN query complete"
        );
        Ok(neighbors)
    }

    async fn delete(&self, entity_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let deleted = sqlx::query("DELETE FROM entity_embedding WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected()
            > 0;
        sqlx::query("UPDATE entity SET embedding_updated_at = NULL WHERE id = $1")
            .bind(entity_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(deleted)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entity_embedding")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }
}
