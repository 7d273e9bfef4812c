//! Entity (profile / posting) read repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cohort_core::{
    Entity, EntityKind, EntityRepository, Error, PendingEmbeddingFilter, Result, Visibility,
};

/// Columns selected for every entity read, in [`parse_entity`] order.
pub(crate) const ENTITY_COLUMNS: &str = "id, kind, name, title, description, location, tags, \
     interests, category, visibility, contact, image_ref, created_at, embedding_updated_at";

/// PostgreSQL implementation of EntityRepository.
#[derive(Clone)]
pub struct PgEntityRepository {
    pool: Pool<Postgres>,
}

impl PgEntityRepository {
    /// Create a new PgEntityRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_entity(row: &PgRow) -> Result<Entity> {
    let kind: String = row.try_get("kind")?;
    let visibility: String = row.try_get("visibility")?;
    Ok(Entity {
        id: row.try_get("id")?,
        kind: kind.parse()?,
        name: row.try_get("name")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        tags: row.try_get("tags")?,
        interests: row.try_get("interests")?,
        category: row.try_get("category")?,
        visibility: visibility.parse()?,
        contact: row.try_get("contact")?,
        image_ref: row.try_get("image_ref")?,
        created_at: row.try_get("created_at")?,
        embedding_updated_at: row.try_get("embedding_updated_at")?,
    })
}

fn kind_strs(kinds: &[EntityKind]) -> Vec<String> {
    kinds.iter().map(|k| k.as_str().to_string()).collect()
}

fn visibility_strs(visibilities: &[Visibility]) -> Vec<String> {
    visibilities
        .iter()
        .map(|v| v.as_str().to_string())
        .collect()
}

#[async_trait]
impl EntityRepository for PgEntityRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Entity>> {
        let query = format!("SELECT {} FROM entity WHERE id = $1", ENTITY_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(parse_entity).transpose()
    }

    async fn list_pending_embedding(&self, filter: &PendingEmbeddingFilter) -> Result<Vec<Entity>> {
        // Required text: profiles need a name, postings a title and description.
        let query = format!(
            r#"
            SELECT {}
            FROM entity
            WHERE embedding_updated_at IS NULL
              AND kind = ANY($1)
              AND (cardinality($2::text[]) = 0 OR visibility = ANY($2))
              AND (
                   (kind = 'profile' AND NULLIF(btrim(name), '') IS NOT NULL)
                OR (kind = 'posting'
                    AND NULLIF(btrim(title), '') IS NOT NULL
                    AND NULLIF(btrim(description), '') IS NOT NULL)
              )
            ORDER BY created_at, id
            LIMIT $3
            "#,
            ENTITY_COLUMNS
        );

        let limit: Option<i64> = (filter.limit > 0).then_some(filter.limit as i64);

        let rows = sqlx::query(&query)
            .bind(kind_strs(&filter.kinds))
            .bind(visibility_strs(&filter.visibilities))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(parse_entity).collect()
    }

    async fn list_profiles_with_any_tag(&self, tags: &[String]) -> Result<Vec<Entity>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let lowered: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();

        let query = format!(
            r#"
            SELECT {}
            FROM entity
            WHERE kind = 'profile'
              AND visibility = ANY($2)
              AND EXISTS (SELECT 1 FROM unnest(tags) AS t WHERE lower(btrim(t)) = ANY($1))
            ORDER BY created_at, id
            "#,
            ENTITY_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(&lowered)
            .bind(Visibility::publishable_strs())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(parse_entity).collect()
    }

    async fn list_postings_since(&self, since: DateTime<Utc>) -> Result<Vec<Entity>> {
        let query = format!(
            r#"
            SELECT {}
            FROM entity
            WHERE kind = 'posting'
              AND visibility = ANY($2)
              AND created_at >= $1
            ORDER BY created_at, id
            "#,
            ENTITY_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(since)
            .bind(Visibility::publishable_strs())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(parse_entity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_columns_cover_model() {
        for column in [
            "id",
            "kind",
            "tags",
            "interests",
            "visibility",
            "embedding_updated_at",
        ] {
            assert!(ENTITY_COLUMNS.contains(column), "missing {}", column);
        }
    }

    #[test]
    fn test_kind_strs() {
        assert_eq!(
            kind_strs(&[EntityKind::Profile, EntityKind::Posting]),
            vec!["profile".to_string(), "posting".to_string()]
        );
    }
}
