//! qBittorrent Web API client
//!
//! Cookie-based login followed by form POSTs against `torrents/*`
//! endpoints. The session is re-established when it ages out.

use crate::models::{
    magnet_info_hash, ClientDefinition, DownloadClient, DownloadItem, DownloadItemStatus,
};
use async_trait::async_trait;
use outpost_core::{OutpostError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_MAX_AGE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    last_auth_time: Option<Instant>,
}

pub struct QbittorrentClient {
    definition: ClientDefinition,
    client: Client,
    base_url: Url,
    session: Arc<RwLock<SessionState>>,
}

/// Torrent entry from `torrents/info`.
#[derive(Debug, Deserialize)]
struct TorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    dlspeed: u64,
    size: i64,
    completed: i64,
    eta: i64,
    ratio: f64,
    seeding_time: Option<i64>,
    category: String,
    save_path: String,
}

impl QbittorrentClient {
    pub fn new(definition: ClientDefinition) -> Result<Self> {
        let base_url =
            Url::parse(&definition.base_url).map_err(|e| OutpostError::NotConfigured {
                what: format!("client:{}", definition.name),
                message: format!("invalid base URL: {}", e),
            })?;

        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| OutpostError::network(&definition.name, e))?;

        Ok(Self {
            definition,
            client,
            base_url,
            session: Arc::new(RwLock::new(SessionState::default())),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| OutpostError::protocol(&self.definition.name, e))
    }

    async fn needs_login(&self) -> bool {
        let state = self.session.read().await;
        if !state.authenticated {
            return true;
        }
        state
            .last_auth_time
            .map(|t| t.elapsed() > SESSION_MAX_AGE)
            .unwrap_or(true)
    }

    async fn login(&self) -> Result<()> {
        let url = self.endpoint("api/v2/auth/login")?;

        let mut form = HashMap::new();
        form.insert("username", self.definition.username.as_str());
        form.insert("password", self.definition.password.as_str());

        debug!(client = %self.definition.name, "logging in to qBittorrent");
        let response = self
            .client
            .post(url)
            .form(&form)
            .timeout(RPC_TIMEOUT)
            .send()
            .await
            .map_err(|e| OutpostError::network(&self.definition.name, e))?;

        if !response.status().is_success() {
            return Err(OutpostError::AuthFailed {
                service: self.definition.name.clone(),
                message: format!("login failed with status {}", response.status()),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| OutpostError::network(&self.definition.name, e))?;
        if body.contains("Fails") {
            return Err(OutpostError::AuthFailed {
                service: self.definition.name.clone(),
                message: "invalid credentials".to_string(),
            });
        }

        let mut state = self.session.write().await;
        state.authenticated = true;
        state.last_auth_time = Some(Instant::now());
        info!(client = %self.definition.name, "qBittorrent session established");
        Ok(())
    }

    async fn ensure_session(&self) -> Result<()> {
        if self.needs_login().await {
            self.login().await?;
        }
        Ok(())
    }

    async fn post_form(&self, path: &str, form: &HashMap<&str, String>) -> Result<()> {
        self.ensure_session().await?;
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .form(form)
            .timeout(RPC_TIMEOUT)
            .send()
            .await
            .map_err(|e| OutpostError::network(&self.definition.name, e))?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            // Session expired server-side; force a fresh login next call.
            self.session.write().await.authenticated = false;
            return Err(OutpostError::AuthFailed {
                service: self.definition.name.clone(),
                message: "session rejected".to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(OutpostError::protocol(
                &self.definition.name,
                format!("unexpected status {}", response.status()),
            ));
        }
        Ok(())
    }

    /// Map qBittorrent state strings onto the normalised status set.
    fn map_status(state: &str) -> DownloadItemStatus {
        match state {
            "downloading" | "stalledDL" | "metaDL" | "forcedDL" | "checkingDL" | "allocating" => {
                DownloadItemStatus::Downloading
            }
            "pausedDL" | "stoppedDL" => DownloadItemStatus::Paused,
            "queuedDL" => DownloadItemStatus::Queued,
            "uploading" | "stalledUP" | "queuedUP" | "forcedUP" | "pausedUP" | "stoppedUP"
            | "checkingUP" => DownloadItemStatus::Completed,
            "error" | "missingFiles" => DownloadItemStatus::Error,
            _ => DownloadItemStatus::Queued,
        }
    }
}

#[async_trait]
impl DownloadClient for QbittorrentClient {
    fn definition(&self) -> &ClientDefinition {
        &self.definition
    }

    async fn test(&self) -> Result<()> {
        self.login().await
    }

    async fn list(&self) -> Result<Vec<DownloadItem>> {
        self.ensure_session().await?;
        let mut url = self.endpoint("api/v2/torrents/info")?;
        if let Some(category) = &self.definition.category {
            url.query_pairs_mut().append_pair("category", category);
        }

        let response = self
            .client
            .get(url)
            .timeout(RPC_TIMEOUT)
            .send()
            .await
            .map_err(|e| OutpostError::network(&self.definition.name, e))?;

        if !response.status().is_success() {
            return Err(OutpostError::protocol(
                &self.definition.name,
                format!("torrents/info returned {}", response.status()),
            ));
        }

        let torrents: Vec<TorrentInfo> = response
            .json()
            .await
            .map_err(|e| OutpostError::protocol(&self.definition.name, e))?;

        Ok(torrents
            .into_iter()
            .map(|t| {
                let status = Self::map_status(&t.state);
                DownloadItem {
                    client_id: self.definition.id,
                    external_id: t.hash,
                    name: t.name,
                    size_bytes: t.size,
                    downloaded_bytes: t.completed,
                    progress: t.progress.clamp(0.0, 1.0),
                    speed_bps: t.dlspeed,
                    eta_secs: if t.eta >= 0 && t.eta < 8640000 {
                        Some(t.eta)
                    } else {
                        None
                    },
                    ratio: Some(t.ratio),
                    seeding_time_secs: t.seeding_time,
                    status,
                    save_path: Some(t.save_path),
                    category: Some(t.category),
                    error_message: if status == DownloadItemStatus::Error {
                        Some("client reported an errored torrent".to_string())
                    } else {
                        None
                    },
                }
            })
            .collect())
    }

    async fn add_torrent(&self, link: &str, category: Option<&str>) -> Result<Option<String>> {
        let mut form = HashMap::new();
        form.insert("urls", link.to_string());
        if let Some(cat) = category.or(self.definition.category.as_deref()) {
            form.insert("category", cat.to_string());
        }
        self.post_form("api/v2/torrents/add", &form).await?;
        // The add endpoint does not echo the hash; magnets carry it inline.
        Ok(magnet_info_hash(link))
    }

    async fn add_nzb(&self, _link: &str, _category: Option<&str>) -> Result<Option<String>> {
        Err(OutpostError::NoSuitableClient {
            protocol: "usenet".to_string(),
        })
    }

    async fn remove(&self, external_id: &str, delete_files: bool) -> Result<()> {
        let mut form = HashMap::new();
        form.insert("hashes", external_id.to_string());
        form.insert("deleteFiles", delete_files.to_string());
        self.post_form("api/v2/torrents/delete", &form).await
    }

    async fn pause(&self, external_id: &str) -> Result<()> {
        let mut form = HashMap::new();
        form.insert("hashes", external_id.to_string());
        self.post_form("api/v2/torrents/pause", &form).await
    }

    async fn resume(&self, external_id: &str) -> Result<()> {
        let mut form = HashMap::new();
        form.insert("hashes", external_id.to_string());
        self.post_form("api/v2/torrents/resume", &form).await
    }
}
