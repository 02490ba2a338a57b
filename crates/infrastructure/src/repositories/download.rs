//! SQLite implementation of DownloadRepository

use super::{from_json, parse_enum, to_json};
use crate::database::DatabasePool;
use async_trait::async_trait;
use outpost_core::models::{DownloadEvent, DownloadState, TrackedDownload};
use outpost_core::repositories::DownloadRepository;
use outpost_core::Result;
use sqlx::Row;
use uuid::Uuid;

pub struct SqliteDownloadRepository {
    pool: DatabasePool,
}

impl SqliteDownloadRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str = "id, client_id, external_id, request_id, media_id, media_kind, title, \
     parsed, state, previous_state, state_changed_at, size_bytes, downloaded_bytes, progress, \
     speed_bps, eta_secs, seeders, save_path, import_path, quality, format_score, grabbed_at, \
     completed_at, imported_at, ratio, seeding_time_secs, can_remove, warnings, errors, \
     import_block_reason, created_at, updated_at";

fn row_to_download(row: &sqlx::sqlite::SqliteRow) -> Result<TrackedDownload> {
    let previous_state: Option<String> = row.try_get("previous_state")?;
    Ok(TrackedDownload {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        external_id: row.try_get("external_id")?,
        request_id: row.try_get("request_id")?,
        media_id: row.try_get("media_id")?,
        media_kind: parse_enum(&row.try_get::<String, _>("media_kind")?, "media_kind")?,
        title: row.try_get("title")?,
        parsed: row
            .try_get::<Option<String>, _>("parsed")?
            .map(|p| from_json(&p, "parsed"))
            .transpose()?,
        state: parse_enum(&row.try_get::<String, _>("state")?, "state")?,
        previous_state: previous_state
            .map(|s| parse_enum(&s, "previous_state"))
            .transpose()?,
        state_changed_at: row.try_get("state_changed_at")?,
        size_bytes: row.try_get("size_bytes")?,
        downloaded_bytes: row.try_get("downloaded_bytes")?,
        progress: row.try_get("progress")?,
        speed_bps: row
            .try_get::<Option<i64>, _>("speed_bps")?
            .map(|v| v.max(0) as u64),
        eta_secs: row.try_get("eta_secs")?,
        seeders: row.try_get("seeders")?,
        save_path: row.try_get("save_path")?,
        import_path: row.try_get("import_path")?,
        quality: row.try_get("quality")?,
        format_score: row.try_get("format_score")?,
        grabbed_at: row.try_get("grabbed_at")?,
        completed_at: row.try_get("completed_at")?,
        imported_at: row.try_get("imported_at")?,
        ratio: row.try_get("ratio")?,
        seeding_time_secs: row.try_get("seeding_time_secs")?,
        can_remove: row.try_get("can_remove")?,
        warnings: from_json(&row.try_get::<String, _>("warnings")?, "warnings")?,
        errors: from_json(&row.try_get::<String, _>("errors")?, "errors")?,
        import_block_reason: row.try_get("import_block_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl DownloadRepository for SqliteDownloadRepository {
    async fn get(&self, id: Uuid) -> Result<Option<TrackedDownload>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tracked_downloads WHERE id = ?",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_download).transpose()
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<TrackedDownload>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tracked_downloads WHERE download_key = ? \
             ORDER BY created_at DESC LIMIT 1",
            COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_download).transpose()
    }

    async fn list_active(&self) -> Result<Vec<TrackedDownload>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tracked_downloads WHERE state NOT IN ('imported', 'ignored') \
             ORDER BY created_at ASC",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_download).collect()
    }

    async fn list_by_state(&self, state: DownloadState) -> Result<Vec<TrackedDownload>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tracked_downloads WHERE state = ? ORDER BY created_at ASC",
            COLUMNS
        ))
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_download).collect()
    }

    async fn upsert(&self, download: &TrackedDownload) -> Result<()> {
        sqlx::query(
            "INSERT INTO tracked_downloads (id, client_id, external_id, download_key, \
             request_id, media_id, media_kind, title, parsed, state, previous_state, \
             state_changed_at, size_bytes, downloaded_bytes, progress, speed_bps, eta_secs, \
             seeders, save_path, import_path, quality, format_score, grabbed_at, completed_at, \
             imported_at, ratio, seeding_time_secs, can_remove, warnings, errors, \
             import_block_reason, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
             ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
             request_id = excluded.request_id, media_id = excluded.media_id, \
             state = excluded.state, previous_state = excluded.previous_state, \
             state_changed_at = excluded.state_changed_at, size_bytes = excluded.size_bytes, \
             downloaded_bytes = excluded.downloaded_bytes, progress = excluded.progress, \
             speed_bps = excluded.speed_bps, eta_secs = excluded.eta_secs, \
             seeders = excluded.seeders, save_path = excluded.save_path, \
             import_path = excluded.import_path, quality = excluded.quality, \
             format_score = excluded.format_score, grabbed_at = excluded.grabbed_at, \
             completed_at = excluded.completed_at, imported_at = excluded.imported_at, \
             ratio = excluded.ratio, seeding_time_secs = excluded.seeding_time_secs, \
             can_remove = excluded.can_remove, warnings = excluded.warnings, \
             errors = excluded.errors, import_block_reason = excluded.import_block_reason, \
             updated_at = excluded.updated_at",
        )
        .bind(download.id)
        .bind(download.client_id)
        .bind(download.external_id.as_str())
        .bind(download.key())
        .bind(download.request_id)
        .bind(download.media_id)
        .bind(download.media_kind.to_string())
        .bind(download.title.as_str())
        .bind(
            download
                .parsed
                .as_ref()
                .map(|p| to_json(p, "parsed"))
                .transpose()?,
        )
        .bind(download.state.to_string())
        .bind(download.previous_state.map(|s| s.to_string()))
        .bind(download.state_changed_at)
        .bind(download.size_bytes)
        .bind(download.downloaded_bytes)
        .bind(download.progress)
        .bind(download.speed_bps.map(|v| v as i64))
        .bind(download.eta_secs)
        .bind(download.seeders)
        .bind(download.save_path.as_deref())
        .bind(download.import_path.as_deref())
        .bind(download.quality.as_deref())
        .bind(download.format_score)
        .bind(download.grabbed_at)
        .bind(download.completed_at)
        .bind(download.imported_at)
        .bind(download.ratio)
        .bind(download.seeding_time_secs)
        .bind(download.can_remove)
        .bind(to_json(&download.warnings, "warnings")?)
        .bind(to_json(&download.errors, "errors")?)
        .bind(download.import_block_reason.as_deref())
        .bind(download.created_at)
        .bind(download.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_event(&self, event: &DownloadEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO download_events (id, download_id, from_state, to_state, reason, \
             details, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id)
        .bind(event.download_id)
        .bind(event.from_state.to_string())
        .bind(event.to_state.to_string())
        .bind(event.reason.as_str())
        .bind(event.details.as_deref())
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_events(&self, download_id: Uuid) -> Result<Vec<DownloadEvent>> {
        let rows = sqlx::query(
            "SELECT id, download_id, from_state, to_state, reason, details, created_at \
             FROM download_events WHERE download_id = ? ORDER BY created_at ASC",
        )
        .bind(download_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DownloadEvent {
                    id: row.try_get("id")?,
                    download_id: row.try_get("download_id")?,
                    from_state: parse_enum(&row.try_get::<String, _>("from_state")?, "from_state")?,
                    to_state: parse_enum(&row.try_get::<String, _>("to_state")?, "to_state")?,
                    reason: row.try_get("reason")?,
                    details: row.try_get("details")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
