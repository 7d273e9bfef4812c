//! Notification dedup record repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use cohort_core::{
    Error, NewNotification, NotificationKey, NotificationRecord, NotificationRepository, Result,
};

const RECORD_COLUMNS: &str = "recipient_id, kind, subject_id, created_at, sent_at, text, image_ref";

/// PostgreSQL notification repository.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<NotificationRecord> {
        let kind: String = row.try_get("kind")?;
        Ok(NotificationRecord {
            key: NotificationKey {
                recipient_id: row.try_get("recipient_id")?,
                kind: kind.parse()?,
                subject_id: row.try_get("subject_id")?,
            },
            created_at: row.try_get("created_at")?,
            sent_at: row.try_get("sent_at")?,
            text: row.try_get("text")?,
            image_ref: row.try_get("image_ref")?,
        })
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn try_create(
        &self,
        notification: NewNotification,
    ) -> Result<Option<NotificationRecord>> {
        // The primary key is the dedup key: of two concurrent inserts only
        // one gets a row back.
        let query = format!(
            "INSERT INTO notification (recipient_id, kind, subject_id, created_at, text, image_ref)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (recipient_id, kind, subject_id) DO NOTHING
             RETURNING {}",
            RECORD_COLUMNS
        );
        let key = notification.key;
        let row = sqlx::query(&query)
            .bind(key.recipient_id)
            .bind(key.kind.as_str())
            .bind(key.subject_id)
            .bind(Utc::now())
            .bind(&notification.text)
            .bind(&notification.image_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn mark_sent(&self, key: &NotificationKey) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification SET sent_at = $4
             WHERE recipient_id = $1 AND kind = $2 AND subject_id = $3 AND sent_at IS NULL",
        )
        .bind(key.recipient_id)
        .bind(key.kind.as_str())
        .bind(key.subject_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, key: &NotificationKey) -> Result<Option<NotificationRecord>> {
        let query = format!(
            "SELECT {} FROM notification
             WHERE recipient_id = $1 AND kind = $2 AND subject_id = $3",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(key.recipient_id)
            .bind(key.kind.as_str())
            .bind(key.subject_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list_unsent(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>> {
        let query = format!(
            "SELECT {} FROM notification
             WHERE sent_at IS NULL AND created_at < $1
             ORDER BY created_at
             LIMIT $2",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }
}
