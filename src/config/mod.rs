//! Application configuration
//!
//! Loaded once from the environment at startup (a `.env` file is honoured
//! in development). Only secrets and paths come from the environment;
//! indexers, download clients and naming rules live in the settings table.

use outpost_core::{OutpostError, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    pub db_path: PathBuf,
    pub data_path: PathBuf,
    pub cache_path: PathBuf,
    pub log_path: Option<PathBuf>,

    pub tmdb_api_key: Option<String>,
    pub prowlarr_url: Option<String>,
    pub prowlarr_api_key: Option<String>,
    pub session_secret: Option<String>,

    pub scheduler: SchedulerIntervals,
}

/// Loop intervals, overridable for development.
#[derive(Debug, Clone)]
pub struct SchedulerIntervals {
    pub tracker: Duration,
    pub search: Duration,
    pub rss: Duration,
    pub storage: Duration,
    pub min_free_bytes: u64,
    pub release_delay: Duration,
}

impl Default for SchedulerIntervals {
    fn default() -> Self {
        Self {
            tracker: Duration::from_secs(30),
            search: Duration::from_secs(60 * 60),
            rss: Duration::from_secs(15 * 60),
            storage: Duration::from_secs(5 * 60),
            min_free_bytes: 5 * 1024 * 1024 * 1024,
            release_delay: Duration::ZERO,
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_secs(key: &str) -> Option<Duration> {
    env(key).and_then(|v| v.parse().ok()).map(Duration::from_secs)
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let data_path = PathBuf::from(env("DATA_PATH").unwrap_or_else(|| "./data".to_string()));

        let port = match env("PORT") {
            Some(raw) => raw.parse().map_err(|_| OutpostError::NotConfigured {
                what: "PORT".to_string(),
                message: format!("not a port number: {}", raw),
            })?,
            None => 8085,
        };

        let mut scheduler = SchedulerIntervals::default();
        if let Some(d) = env_secs("TRACKER_INTERVAL_SECS") {
            scheduler.tracker = d;
        }
        if let Some(d) = env_secs("SEARCH_INTERVAL_SECS") {
            scheduler.search = d;
        }
        if let Some(d) = env_secs("RSS_INTERVAL_SECS") {
            scheduler.rss = d;
        }
        if let Some(d) = env_secs("RELEASE_DELAY_SECS") {
            scheduler.release_delay = d;
        }

        Ok(Self {
            host: env("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            db_path: env("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_path.join("outpost.db")),
            cache_path: env("CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_path.join("cache")),
            log_path: env("LOG_PATH").map(PathBuf::from),
            data_path,
            tmdb_api_key: env("TMDB_API_KEY"),
            prowlarr_url: env("PROWLARR_URL"),
            prowlarr_api_key: env("PROWLARR_API_KEY"),
            session_secret: env("SESSION_SECRET"),
            scheduler,
        })
    }

    /// Default library roots under the data path.
    pub fn default_library_roots(&self) -> (PathBuf, PathBuf) {
        (
            self.data_path.join("media/movies"),
            self.data_path.join("media/tv"),
        )
    }
}
