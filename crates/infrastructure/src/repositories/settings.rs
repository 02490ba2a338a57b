//! SQLite implementation of SettingsRepository
//!
//! A plain key/value table. Structured settings are stored as JSON under
//! well-known keys and fall back to their defaults when absent.

use crate::database::DatabasePool;
use async_trait::async_trait;
use outpost_core::models::{FormatSettings, NamingSettings};
use outpost_core::repositories::SettingsRepository;
use outpost_core::{OutpostError, Result};
use sqlx::Row;

const FORMAT_SETTINGS_KEY: &str = "format_settings";
const NAMING_SETTINGS_KEY: &str = "naming_settings";

pub struct SqliteSettingsRepository {
    pool: DatabasePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => {
                let parsed =
                    serde_json::from_str(&value).map_err(|e| OutpostError::DatabaseError {
                        message: format!("bad {} setting: {}", key, e),
                    })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_string(value).map_err(|e| OutpostError::DatabaseError {
            message: format!("cannot encode {} setting: {}", key, e),
        })?;
        self.set(key, &encoded).await
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn format_settings(&self) -> Result<FormatSettings> {
        Ok(self
            .get_json(FORMAT_SETTINGS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn set_format_settings(&self, settings: &FormatSettings) -> Result<()> {
        self.set_json(FORMAT_SETTINGS_KEY, settings).await
    }

    async fn naming_settings(&self) -> Result<NamingSettings> {
        Ok(self
            .get_json(NAMING_SETTINGS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn set_naming_settings(&self, settings: &NamingSettings) -> Result<()> {
        self.set_json(NAMING_SETTINGS_KEY, settings).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("value")).transpose().map_err(Into::into)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
