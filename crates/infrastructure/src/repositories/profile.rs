//! SQLite implementation of ProfileRepository

use super::{from_json, to_json};
use crate::database::DatabasePool;
use async_trait::async_trait;
use outpost_core::models::{CustomFormat, QualityProfile};
use outpost_core::repositories::ProfileRepository;
use outpost_core::Result;
use sqlx::Row;
use uuid::Uuid;

pub struct SqliteProfileRepository {
    pool: DatabasePool,
}

impl SqliteProfileRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<QualityProfile> {
    Ok(QualityProfile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        allowed: from_json(&row.try_get::<String, _>("allowed")?, "allowed")?,
        min_score: row.try_get("min_score")?,
        cutoff_score: row.try_get("cutoff_score")?,
        upgrade_until: row.try_get("upgrade_until")?,
        upgrades_allowed: row.try_get("upgrades_allowed")?,
        min_score_increment: row.try_get("min_score_increment")?,
        format_scores: from_json(&row.try_get::<String, _>("format_scores")?, "format_scores")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ProfileRepository for SqliteProfileRepository {
    async fn get_profile(&self, id: Uuid) -> Result<Option<QualityProfile>> {
        let row = sqlx::query(
            "SELECT id, name, allowed, min_score, cutoff_score, upgrade_until, \
             upgrades_allowed, min_score_increment, format_scores, created_at, updated_at \
             FROM quality_profiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_profile).transpose()
    }

    async fn upsert_profile(&self, profile: &QualityProfile) -> Result<()> {
        profile.validate()?;
        sqlx::query(
            "INSERT INTO quality_profiles (id, name, allowed, min_score, cutoff_score, \
             upgrade_until, upgrades_allowed, min_score_increment, format_scores, created_at, \
             updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
             name = excluded.name, allowed = excluded.allowed, \
             min_score = excluded.min_score, cutoff_score = excluded.cutoff_score, \
             upgrade_until = excluded.upgrade_until, \
             upgrades_allowed = excluded.upgrades_allowed, \
             min_score_increment = excluded.min_score_increment, \
             format_scores = excluded.format_scores, updated_at = excluded.updated_at",
        )
        .bind(profile.id)
        .bind(profile.name.as_str())
        .bind(to_json(&profile.allowed, "allowed")?)
        .bind(profile.min_score)
        .bind(profile.cutoff_score)
        .bind(profile.upgrade_until)
        .bind(profile.upgrades_allowed)
        .bind(profile.min_score_increment)
        .bind(to_json(&profile.format_scores, "format_scores")?)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_formats(&self) -> Result<Vec<CustomFormat>> {
        let rows =
            sqlx::query("SELECT id, name, score, enabled, conditions FROM custom_formats")
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(|row| {
                Ok(CustomFormat {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    score: row.try_get("score")?,
                    enabled: row.try_get("enabled")?,
                    conditions: from_json(&row.try_get::<String, _>("conditions")?, "conditions")?,
                })
            })
            .collect()
    }

    async fn upsert_format(&self, format: &CustomFormat) -> Result<()> {
        sqlx::query(
            "INSERT INTO custom_formats (id, name, score, enabled, conditions) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, score = excluded.score, \
             enabled = excluded.enabled, conditions = excluded.conditions",
        )
        .bind(format.id)
        .bind(format.name.as_str())
        .bind(format.score)
        .bind(format.enabled)
        .bind(to_json(&format.conditions, "conditions")?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
