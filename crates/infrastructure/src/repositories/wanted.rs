//! SQLite implementation of WantedRepository

use super::{from_json, parse_enum, to_json};
use crate::database::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outpost_core::models::{MediaKind, WantedItem};
use outpost_core::repositories::WantedRepository;
use outpost_core::Result;
use sqlx::Row;
use uuid::Uuid;

pub struct SqliteWantedRepository {
    pool: DatabasePool,
}

impl SqliteWantedRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str = "id, kind, external_id, title, year, quality_profile_id, monitored, \
     seasons, added_by, last_searched_at, current_score, cutoff_met, created_at, updated_at";

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<WantedItem> {
    Ok(WantedItem {
        id: row.try_get("id")?,
        kind: parse_enum(&row.try_get::<String, _>("kind")?, "kind")?,
        external_id: row.try_get("external_id")?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        quality_profile_id: row.try_get("quality_profile_id")?,
        monitored: row.try_get("monitored")?,
        seasons: from_json(&row.try_get::<String, _>("seasons")?, "seasons")?,
        added_by: row.try_get("added_by")?,
        last_searched_at: row.try_get("last_searched_at")?,
        current_score: row.try_get("current_score")?,
        cutoff_met: row.try_get("cutoff_met")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl WantedRepository for SqliteWantedRepository {
    async fn get(&self, id: Uuid) -> Result<Option<WantedItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wanted_items WHERE id = ?",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn find_by_external(
        &self,
        kind: MediaKind,
        external_id: i64,
    ) -> Result<Option<WantedItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wanted_items WHERE kind = ? AND external_id = ?",
            COLUMNS
        ))
        .bind(kind.to_string())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn list_needing_search(&self) -> Result<Vec<WantedItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM wanted_items WHERE monitored = 1 AND cutoff_met = 0 \
             ORDER BY last_searched_at ASC NULLS FIRST",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn find_matching(
        &self,
        kind: MediaKind,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<WantedItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wanted_items WHERE kind = ? AND lower(title) = lower(?)",
            COLUMNS
        ))
        .bind(kind.to_string())
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        let item = row.as_ref().map(row_to_item).transpose()?;
        // A year mismatch rules the match out; either side missing is fine.
        Ok(item.filter(|i| match (i.year, year) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }))
    }

    async fn upsert(&self, item: &WantedItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO wanted_items (id, kind, external_id, title, year, quality_profile_id, \
             monitored, seasons, added_by, last_searched_at, current_score, cutoff_met, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
             title = excluded.title, year = excluded.year, \
             quality_profile_id = excluded.quality_profile_id, \
             monitored = excluded.monitored, seasons = excluded.seasons, \
             added_by = excluded.added_by, last_searched_at = excluded.last_searched_at, \
             current_score = excluded.current_score, cutoff_met = excluded.cutoff_met, \
             updated_at = excluded.updated_at",
        )
        .bind(item.id)
        .bind(item.kind.to_string())
        .bind(item.external_id)
        .bind(item.title.as_str())
        .bind(item.year)
        .bind(item.quality_profile_id)
        .bind(item.monitored)
        .bind(to_json(&item.seasons, "seasons")?)
        .bind(item.added_by.as_deref())
        .bind(item.last_searched_at)
        .bind(item.current_score)
        .bind(item.cutoff_met)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_last_searched(&self, id: Uuid, when: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE wanted_items SET last_searched_at = ?, updated_at = ? WHERE id = ?")
            .bind(when)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_quality_status(&self, id: Uuid, score: i32, cutoff_met: bool) -> Result<()> {
        sqlx::query(
            "UPDATE wanted_items SET current_score = ?, cutoff_met = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(score)
        .bind(cutoff_met)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
