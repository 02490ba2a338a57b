//! SQLite implementation of RequestRepository

use super::parse_enum;
use crate::database::DatabasePool;
use async_trait::async_trait;
use chrono::Utc;
use outpost_core::models::{Request, RequestStatus};
use outpost_core::repositories::RequestRepository;
use outpost_core::Result;
use sqlx::Row;
use uuid::Uuid;

pub struct SqliteRequestRepository {
    pool: DatabasePool,
}

impl SqliteRequestRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str =
    "id, user_id, kind, external_id, title, year, status, status_reason, created_at, updated_at";

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request> {
    Ok(Request {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: parse_enum(&row.try_get::<String, _>("kind")?, "kind")?,
        external_id: row.try_get("external_id")?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        status: parse_enum(&row.try_get::<String, _>("status")?, "status")?,
        status_reason: row.try_get("status_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RequestRepository for SqliteRequestRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Request>> {
        let row = sqlx::query(&format!("SELECT {} FROM requests WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_request).transpose()
    }

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<Request>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM requests WHERE status = ? ORDER BY created_at ASC",
            COLUMNS
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_request).collect()
    }

    async fn upsert(&self, request: &Request) -> Result<()> {
        sqlx::query(
            "INSERT INTO requests (id, user_id, kind, external_id, title, year, status, \
             status_reason, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET status = excluded.status, \
             status_reason = excluded.status_reason, updated_at = excluded.updated_at",
        )
        .bind(request.id)
        .bind(request.user_id.as_str())
        .bind(request.kind.to_string())
        .bind(request.external_id)
        .bind(request.title.as_str())
        .bind(request.year)
        .bind(request.status.to_string())
        .bind(request.status_reason.as_deref())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn link_download(&self, request_id: Uuid, download_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO request_download_links (request_id, download_id, created_at) \
             VALUES (?, ?, ?)",
        )
        .bind(request_id)
        .bind(download_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_download(&self, download_id: Uuid) -> Result<Option<Request>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM requests r \
             JOIN request_download_links l ON l.request_id = r.id \
             WHERE l.download_id = ? ORDER BY l.created_at DESC LIMIT 1",
            COLUMNS
                .split(", ")
                .map(|c| format!("r.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(download_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_request).transpose()
    }
}
