//! SABnzbd client
//!
//! Query-string API: every call is a GET against `/api` with `apikey`,
//! `output=json` and a `mode`. Active downloads come from `mode=queue`,
//! finished ones from `mode=history`; both are merged into one listing.

use crate::models::{ClientDefinition, DownloadClient, DownloadItem, DownloadItemStatus};
use async_trait::async_trait;
use outpost_core::{OutpostError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SabnzbdClient {
    definition: ClientDefinition,
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    queue: Queue,
}

#[derive(Debug, Deserialize)]
struct Queue {
    #[serde(default)]
    slots: Vec<QueueSlot>,
}

#[derive(Debug, Deserialize)]
struct QueueSlot {
    nzo_id: String,
    filename: String,
    status: String,
    /// Total size in megabytes, as a string.
    mb: String,
    /// Remaining megabytes, as a string.
    mbleft: String,
    #[serde(default)]
    timeleft: String,
    #[serde(default)]
    cat: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    history: History,
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(default)]
    slots: Vec<HistorySlot>,
}

#[derive(Debug, Deserialize)]
struct HistorySlot {
    nzo_id: String,
    name: String,
    status: String,
    #[serde(default)]
    bytes: i64,
    #[serde(default)]
    storage: Option<String>,
    #[serde(default)]
    fail_message: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    status: bool,
    #[serde(default)]
    nzo_ids: Vec<String>,
}

impl SabnzbdClient {
    pub fn new(definition: ClientDefinition) -> Result<Self> {
        let base_url =
            Url::parse(&definition.base_url).map_err(|e| OutpostError::NotConfigured {
                what: format!("client:{}", definition.name),
                message: format!("invalid base URL: {}", e),
            })?;
        let client = Client::builder()
            .build()
            .map_err(|e| OutpostError::network(&definition.name, e))?;
        Ok(Self {
            definition,
            client,
            base_url,
        })
    }

    fn api_url(&self, mode: &str, extra: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join("api")
            .map_err(|e| OutpostError::protocol(&self.definition.name, e))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("apikey", &self.definition.api_key);
            pairs.append_pair("output", "json");
            pairs.append_pair("mode", mode);
            for (k, v) in extra {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(client = %self.definition.name, %url, "sabnzbd api call");
        let response = self
            .client
            .get(url)
            .timeout(RPC_TIMEOUT)
            .send()
            .await
            .map_err(|e| OutpostError::network(&self.definition.name, e))?;

        match response.status() {
            s if s == reqwest::StatusCode::UNAUTHORIZED || s == reqwest::StatusCode::FORBIDDEN => {
                return Err(OutpostError::AuthFailed {
                    service: self.definition.name.clone(),
                    message: "API key rejected".to_string(),
                })
            }
            s if s.is_server_error() => {
                return Err(OutpostError::network(
                    &self.definition.name,
                    format!("server error {}", s),
                ))
            }
            s if !s.is_success() => {
                return Err(OutpostError::protocol(
                    &self.definition.name,
                    format!("unexpected status {}", s),
                ))
            }
            _ => {}
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OutpostError::protocol(&self.definition.name, e))
    }

    fn map_queue_status(status: &str) -> DownloadItemStatus {
        match status.to_lowercase().as_str() {
            "downloading" | "fetching" | "verifying" | "repairing" | "extracting" => {
                DownloadItemStatus::Downloading
            }
            "paused" => DownloadItemStatus::Paused,
            "queued" | "grabbing" | "propagating" => DownloadItemStatus::Queued,
            "completed" => DownloadItemStatus::Completed,
            "failed" => DownloadItemStatus::Error,
            _ => DownloadItemStatus::Queued,
        }
    }

    fn queue_item(&self, slot: QueueSlot) -> DownloadItem {
        let size_mb: f64 = slot.mb.parse().unwrap_or(0.0);
        let left_mb: f64 = slot.mbleft.parse().unwrap_or(0.0);
        let size_bytes = (size_mb * 1024.0 * 1024.0) as i64;
        let downloaded = ((size_mb - left_mb).max(0.0) * 1024.0 * 1024.0) as i64;
        let progress = if size_mb > 0.0 {
            ((size_mb - left_mb) / size_mb).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let eta_secs = parse_timeleft(&slot.timeleft);

        DownloadItem {
            client_id: self.definition.id,
            external_id: slot.nzo_id,
            name: slot.filename,
            size_bytes,
            downloaded_bytes: downloaded,
            progress,
            speed_bps: 0,
            eta_secs,
            ratio: None,
            seeding_time_secs: None,
            status: Self::map_queue_status(&slot.status),
            save_path: None,
            category: slot.cat,
            error_message: None,
        }
    }

    fn history_item(&self, slot: HistorySlot) -> DownloadItem {
        let failed = slot.status.eq_ignore_ascii_case("failed");
        DownloadItem {
            client_id: self.definition.id,
            external_id: slot.nzo_id,
            name: slot.name,
            size_bytes: slot.bytes,
            downloaded_bytes: slot.bytes,
            progress: 1.0,
            speed_bps: 0,
            eta_secs: None,
            ratio: None,
            seeding_time_secs: None,
            status: if failed {
                DownloadItemStatus::Error
            } else {
                DownloadItemStatus::Completed
            },
            save_path: slot.storage,
            category: slot.category,
            error_message: slot.fail_message.filter(|m| !m.is_empty()),
        }
    }
}

/// SABnzbd reports time left as `H:MM:SS` (or `D:HH:MM:SS`).
fn parse_timeleft(timeleft: &str) -> Option<i64> {
    if timeleft.is_empty() {
        return None;
    }
    let parts: Vec<i64> = timeleft
        .split(':')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    let secs = match parts.as_slice() {
        [d, h, m, s] => d * 86400 + h * 3600 + m * 60 + s,
        [h, m, s] => h * 3600 + m * 60 + s,
        [m, s] => m * 60 + s,
        [s] => *s,
        _ => return None,
    };
    Some(secs)
}

#[async_trait]
impl DownloadClient for SabnzbdClient {
    fn definition(&self) -> &ClientDefinition {
        &self.definition
    }

    async fn test(&self) -> Result<()> {
        let url = self.api_url("version", &[])?;
        let _: serde_json::Value = self.get_json(url).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DownloadItem>> {
        let queue_url = self.api_url("queue", &[])?;
        let queue: QueueResponse = self.get_json(queue_url).await?;

        let history_url = self.api_url("history", &[("limit", "100")])?;
        let history: HistoryResponse = self.get_json(history_url).await?;

        let mut items: Vec<DownloadItem> = queue
            .queue
            .slots
            .into_iter()
            .map(|s| self.queue_item(s))
            .collect();
        items.extend(history.history.slots.into_iter().map(|s| self.history_item(s)));
        Ok(items)
    }

    async fn add_torrent(&self, _link: &str, _category: Option<&str>) -> Result<Option<String>> {
        Err(OutpostError::NoSuitableClient {
            protocol: "torrent".to_string(),
        })
    }

    async fn add_nzb(&self, link: &str, category: Option<&str>) -> Result<Option<String>> {
        let category = category.or(self.definition.category.as_deref()).unwrap_or("");
        let url = self.api_url("addurl", &[("name", link), ("cat", category)])?;
        let response: AddResponse = self.get_json(url).await?;
        if !response.status {
            return Err(OutpostError::protocol(
                &self.definition.name,
                "addurl rejected",
            ));
        }
        Ok(response.nzo_ids.into_iter().next())
    }

    async fn remove(&self, external_id: &str, delete_files: bool) -> Result<()> {
        let del_files = if delete_files { "1" } else { "0" };
        let url = self.api_url(
            "queue",
            &[
                ("name", "delete"),
                ("value", external_id),
                ("del_files", del_files),
            ],
        )?;
        let _: serde_json::Value = self.get_json(url).await?;
        Ok(())
    }

    async fn pause(&self, external_id: &str) -> Result<()> {
        let url = self.api_url("queue", &[("name", "pause"), ("value", external_id)])?;
        let _: serde_json::Value = self.get_json(url).await?;
        Ok(())
    }

    async fn resume(&self, external_id: &str) -> Result<()> {
        let url = self.api_url("queue", &[("name", "resume"), ("value", external_id)])?;
        let _: serde_json::Value = self.get_json(url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn definition(base_url: &str) -> ClientDefinition {
        let mut def = ClientDefinition::new(3, "sab", ClientKind::Sabnzbd, base_url);
        def.api_key = "key".to_string();
        def
    }

    #[test]
    fn timeleft_parsing() {
        assert_eq!(parse_timeleft("0:12:30"), Some(750));
        assert_eq!(parse_timeleft("1:00:00:00"), Some(86400));
        assert_eq!(parse_timeleft(""), None);
    }

    #[tokio::test]
    async fn list_merges_queue_and_history() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("mode", "queue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "queue": {"slots": [{
                    "nzo_id": "SABnzbd_nzo_1",
                    "filename": "Movie.2024.1080p.WEB-GRP",
                    "status": "Downloading",
                    "mb": "1000.0",
                    "mbleft": "250.0",
                    "timeleft": "0:05:00"
                }]}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("mode", "history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "history": {"slots": [{
                    "nzo_id": "SABnzbd_nzo_2",
                    "name": "Other.2024.720p.WEB-GRP",
                    "status": "Completed",
                    "bytes": 700_000_000u64,
                    "storage": "/downloads/complete/Other.2024.720p.WEB-GRP"
                }]}
            })))
            .mount(&server)
            .await;

        let client = SabnzbdClient::new(definition(&server.uri())).unwrap();
        let items = client.list().await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].status, DownloadItemStatus::Downloading);
        assert!((items[0].progress - 0.75).abs() < 1e-9);
        assert_eq!(items[0].eta_secs, Some(300));
        assert_eq!(items[1].status, DownloadItemStatus::Completed);
        assert_eq!(
            items[1].save_path.as_deref(),
            Some("/downloads/complete/Other.2024.720p.WEB-GRP")
        );
    }

    #[tokio::test]
    async fn add_nzb_returns_nzo_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("mode", "addurl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "nzo_ids": ["SABnzbd_nzo_99"]
            })))
            .mount(&server)
            .await;

        let client = SabnzbdClient::new(definition(&server.uri())).unwrap();
        let id = client
            .add_nzb("https://indexer.example/get/42.nzb", None)
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("SABnzbd_nzo_99"));
    }
}
