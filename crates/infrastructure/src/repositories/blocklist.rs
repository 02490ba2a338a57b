//! SQLite implementation of BlocklistRepository

use super::parse_enum;
use crate::database::DatabasePool;
use async_trait::async_trait;
use chrono::Utc;
use outpost_core::models::{BlocklistEntry, GroupFailure};
use outpost_core::repositories::BlocklistRepository;
use outpost_core::Result;
use sqlx::Row;

pub struct SqliteBlocklistRepository {
    pool: DatabasePool,
}

impl SqliteBlocklistRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlocklistRepository for SqliteBlocklistRepository {
    async fn add(&self, entry: &BlocklistEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO blocklist (id, media_id, media_kind, release_title, release_group, \
             reason, error_message, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(entry.media_id)
        .bind(entry.media_kind.map(|k| k.to_string()))
        .bind(entry.release_title.as_str())
        .bind(entry.release_group.as_deref())
        .bind(entry.reason.as_str())
        .bind(entry.error_message.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn contains_title(&self, release_title: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM blocklist WHERE release_title = ? AND release_title != ''",
        )
        .bind(release_title)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    async fn contains_group(&self, release_group: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM blocklist \
             WHERE release_title = '' AND release_group = ? COLLATE NOCASE",
        )
        .bind(release_group)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    async fn list(&self) -> Result<Vec<BlocklistEntry>> {
        let rows = sqlx::query(
            "SELECT id, media_id, media_kind, release_title, release_group, reason, \
             error_message, created_at FROM blocklist ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: Option<String> = row.try_get("media_kind")?;
                Ok(BlocklistEntry {
                    id: row.try_get("id")?,
                    media_id: row.try_get("media_id")?,
                    media_kind: kind.map(|k| parse_enum(&k, "media_kind")).transpose()?,
                    release_title: row.try_get("release_title")?,
                    release_group: row.try_get("release_group")?,
                    reason: row.try_get("reason")?,
                    error_message: row.try_get("error_message")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn bump_group_failures(&self, release_group: &str) -> Result<GroupFailure> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO group_failures (release_group, failures, last_failed_at) \
             VALUES (?, 1, ?) \
             ON CONFLICT (release_group) DO UPDATE SET \
             failures = failures + 1, last_failed_at = excluded.last_failed_at \
             RETURNING release_group, failures, last_failed_at",
        )
        .bind(release_group)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(GroupFailure {
            release_group: row.try_get("release_group")?,
            failures: row.try_get("failures")?,
            last_failed_at: row.try_get("last_failed_at")?,
        })
    }

    async fn group_failures(&self, release_group: &str) -> Result<Option<GroupFailure>> {
        let row = sqlx::query(
            "SELECT release_group, failures, last_failed_at FROM group_failures \
             WHERE release_group = ?",
        )
        .bind(release_group)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(GroupFailure {
                release_group: row.try_get("release_group")?,
                failures: row.try_get("failures")?,
                last_failed_at: row.try_get("last_failed_at")?,
            })
        })
        .transpose()
    }
}
