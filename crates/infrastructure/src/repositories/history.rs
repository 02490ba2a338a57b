//! SQLite implementation of HistoryRepository

use super::parse_enum;
use crate::database::DatabasePool;
use async_trait::async_trait;
use outpost_core::models::ImportHistory;
use outpost_core::repositories::HistoryRepository;
use outpost_core::Result;
use sqlx::Row;
use uuid::Uuid;

pub struct SqliteHistoryRepository {
    pool: DatabasePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn add(&self, entry: &ImportHistory) -> Result<()> {
        sqlx::query(
            "INSERT INTO import_history (id, download_id, source_path, dest_path, media_id, \
             media_kind, success, error, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(entry.download_id)
        .bind(entry.source_path.as_str())
        .bind(entry.dest_path.as_str())
        .bind(entry.media_id)
        .bind(entry.media_kind.to_string())
        .bind(entry.success)
        .bind(entry.error.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_download(&self, download_id: Uuid) -> Result<Vec<ImportHistory>> {
        let rows = sqlx::query(
            "SELECT id, download_id, source_path, dest_path, media_id, media_kind, success, \
             error, created_at FROM import_history WHERE download_id = ? ORDER BY created_at ASC",
        )
        .bind(download_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ImportHistory {
                    id: row.try_get("id")?,
                    download_id: row.try_get("download_id")?,
                    source_path: row.try_get("source_path")?,
                    dest_path: row.try_get("dest_path")?,
                    media_id: row.try_get("media_id")?,
                    media_kind: parse_enum(&row.try_get::<String, _>("media_kind")?, "media_kind")?,
                    success: row.try_get("success")?,
                    error: row.try_get("error")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
