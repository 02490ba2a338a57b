//! SQLite implementation of PendingGrabRepository

use super::{from_json, parse_enum};
use crate::database::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outpost_core::models::PendingGrab;
use outpost_core::repositories::PendingGrabRepository;
use outpost_core::Result;
use sqlx::Row;
use uuid::Uuid;

pub struct SqlitePendingGrabRepository {
    pool: DatabasePool,
}

impl SqlitePendingGrabRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_grab(row: &sqlx::sqlite::SqliteRow) -> Result<PendingGrab> {
    Ok(PendingGrab {
        id: row.try_get("id")?,
        media_id: row.try_get("media_id")?,
        media_kind: parse_enum(&row.try_get::<String, _>("media_kind")?, "media_kind")?,
        release: from_json(&row.try_get::<String, _>("release")?, "release")?,
        not_before: row.try_get("not_before")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl PendingGrabRepository for SqlitePendingGrabRepository {
    async fn add(&self, grab: &PendingGrab) -> Result<()> {
        sqlx::query(
            "INSERT INTO pending_grabs (id, media_id, media_kind, release, not_before, \
             created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(grab.id)
        .bind(grab.media_id)
        .bind(grab.media_kind.to_string())
        .bind(grab.release.to_string())
        .bind(grab.not_before)
        .bind(grab.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingGrab>> {
        let rows = sqlx::query(
            "SELECT id, media_id, media_kind, release, not_before, created_at \
             FROM pending_grabs WHERE not_before <= ? ORDER BY not_before ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_grab).collect()
    }

    async fn find_for_media(&self, media_id: Uuid) -> Result<Option<PendingGrab>> {
        let row = sqlx::query(
            "SELECT id, media_id, media_kind, release, not_before, created_at \
             FROM pending_grabs WHERE media_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_grab).transpose()
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM pending_grabs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
