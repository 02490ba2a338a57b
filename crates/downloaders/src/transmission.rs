//! Transmission RPC client
//!
//! JSON-RPC against `/transmission/rpc`. Transmission issues a CSRF
//! session id via a 409 response; the client captures it and retries the
//! request once with the `X-Transmission-Session-Id` header.

use crate::models::{ClientDefinition, DownloadClient, DownloadItem, DownloadItemStatus};
use async_trait::async_trait;
use outpost_core::{OutpostError, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// Transmission torrent status codes.
const STATUS_STOPPED: i64 = 0;
const STATUS_QUEUED_VERIFY: i64 = 1;
const STATUS_VERIFYING: i64 = 2;
const STATUS_QUEUED_DOWNLOAD: i64 = 3;
const STATUS_DOWNLOADING: i64 = 4;
const STATUS_QUEUED_SEED: i64 = 5;
const STATUS_SEEDING: i64 = 6;

pub struct TransmissionClient {
    definition: ClientDefinition,
    client: Client,
    rpc_url: Url,
    session_id: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransmissionTorrent {
    hash_string: String,
    name: String,
    status: i64,
    total_size: i64,
    percent_done: f64,
    rate_download: i64,
    eta: i64,
    upload_ratio: f64,
    #[serde(default)]
    seconds_seeding: Option<i64>,
    download_dir: String,
    #[serde(default)]
    error_string: Option<String>,
    #[serde(default)]
    error: i64,
}

impl TransmissionClient {
    pub fn new(definition: ClientDefinition) -> Result<Self> {
        let base = definition.base_url.trim_end_matches('/');
        let rpc_url = Url::parse(&format!("{}/transmission/rpc", base)).map_err(|e| {
            OutpostError::NotConfigured {
                what: format!("client:{}", definition.name),
                message: format!("invalid base URL: {}", e),
            }
        })?;

        let client = Client::builder()
            .build()
            .map_err(|e| OutpostError::network(&definition.name, e))?;

        Ok(Self {
            definition,
            client,
            rpc_url,
            session_id: Arc::new(RwLock::new(None)),
        })
    }

    /// Issue one RPC call, handling the 409 session-id handshake.
    async fn rpc(&self, body: serde_json::Value) -> Result<RpcResponse> {
        for attempt in 0..2 {
            let mut request = self
                .client
                .post(self.rpc_url.clone())
                .timeout(RPC_TIMEOUT)
                .json(&body);

            if !self.definition.username.is_empty() {
                request = request.basic_auth(
                    &self.definition.username,
                    Some(&self.definition.password),
                );
            }
            if let Some(id) = self.session_id.read().await.clone() {
                request = request.header(SESSION_HEADER, id);
            }

            let response = request
                .send()
                .await
                .map_err(|e| OutpostError::network(&self.definition.name, e))?;

            match response.status() {
                StatusCode::CONFLICT if attempt == 0 => {
                    let new_id = response
                        .headers()
                        .get(SESSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string())
                        .ok_or_else(|| {
                            OutpostError::protocol(
                                &self.definition.name,
                                "409 without session id header",
                            )
                        })?;
                    debug!(client = %self.definition.name, "transmission session id refreshed");
                    *self.session_id.write().await = Some(new_id);
                    continue;
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(OutpostError::AuthFailed {
                        service: self.definition.name.clone(),
                        message: "credentials rejected".to_string(),
                    })
                }
                status if status.is_server_error() => {
                    return Err(OutpostError::network(
                        &self.definition.name,
                        format!("server error {}", status),
                    ))
                }
                status if !status.is_success() => {
                    return Err(OutpostError::protocol(
                        &self.definition.name,
                        format!("unexpected status {}", status),
                    ))
                }
                _ => {}
            }

            let parsed: RpcResponse = response
                .json()
                .await
                .map_err(|e| OutpostError::protocol(&self.definition.name, e))?;
            if parsed.result != "success" {
                return Err(OutpostError::protocol(
                    &self.definition.name,
                    format!("rpc result: {}", parsed.result),
                ));
            }
            return Ok(parsed);
        }

        Err(OutpostError::protocol(
            &self.definition.name,
            "session handshake did not converge",
        ))
    }

    fn map_status(torrent: &TransmissionTorrent) -> DownloadItemStatus {
        if torrent.error != 0 {
            return DownloadItemStatus::Error;
        }
        match torrent.status {
            STATUS_STOPPED => {
                // Stopped after completion is a finished download, otherwise
                // it is paused.
                if torrent.percent_done >= 1.0 {
                    DownloadItemStatus::Completed
                } else {
                    DownloadItemStatus::Paused
                }
            }
            STATUS_QUEUED_VERIFY | STATUS_QUEUED_DOWNLOAD => DownloadItemStatus::Queued,
            STATUS_VERIFYING | STATUS_DOWNLOADING => DownloadItemStatus::Downloading,
            STATUS_QUEUED_SEED | STATUS_SEEDING => DownloadItemStatus::Completed,
            _ => DownloadItemStatus::Queued,
        }
    }
}

#[async_trait]
impl DownloadClient for TransmissionClient {
    fn definition(&self) -> &ClientDefinition {
        &self.definition
    }

    async fn test(&self) -> Result<()> {
        self.rpc(json!({"method": "session-get"})).await.map(|_| ())
    }

    async fn list(&self) -> Result<Vec<DownloadItem>> {
        let response = self
            .rpc(json!({
                "method": "torrent-get",
                "arguments": {
                    "fields": [
                        "hashString", "name", "status", "totalSize", "percentDone",
                        "rateDownload", "eta", "uploadRatio", "secondsSeeding",
                        "downloadDir", "errorString", "error"
                    ]
                }
            }))
            .await?;

        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            torrents: Vec<TransmissionTorrent>,
        }
        let args: Args = serde_json::from_value(response.arguments)
            .map_err(|e| OutpostError::protocol(&self.definition.name, e))?;

        Ok(args
            .torrents
            .into_iter()
            .map(|t| {
                let status = Self::map_status(&t);
                let downloaded = (t.total_size as f64 * t.percent_done) as i64;
                DownloadItem {
                    client_id: self.definition.id,
                    external_id: t.hash_string.to_lowercase(),
                    name: t.name,
                    size_bytes: t.total_size,
                    downloaded_bytes: downloaded,
                    progress: t.percent_done.clamp(0.0, 1.0),
                    speed_bps: t.rate_download.max(0) as u64,
                    eta_secs: if t.eta >= 0 { Some(t.eta) } else { None },
                    ratio: Some(t.upload_ratio),
                    seeding_time_secs: t.seconds_seeding,
                    status,
                    save_path: Some(t.download_dir),
                    category: None,
                    error_message: t.error_string.filter(|s| !s.is_empty()),
                }
            })
            .collect())
    }

    async fn add_torrent(&self, link: &str, _category: Option<&str>) -> Result<Option<String>> {
        let response = self
            .rpc(json!({
                "method": "torrent-add",
                "arguments": {"filename": link}
            }))
            .await?;

        // Either torrent-added or torrent-duplicate carries the hash.
        let hash = response
            .arguments
            .get("torrent-added")
            .or_else(|| response.arguments.get("torrent-duplicate"))
            .and_then(|t| t.get("hashString"))
            .and_then(|h| h.as_str())
            .map(|h| h.to_lowercase());
        Ok(hash)
    }

    async fn add_nzb(&self, _link: &str, _category: Option<&str>) -> Result<Option<String>> {
        Err(OutpostError::NoSuitableClient {
            protocol: "usenet".to_string(),
        })
    }

    async fn remove(&self, external_id: &str, delete_files: bool) -> Result<()> {
        self.rpc(json!({
            "method": "torrent-remove",
            "arguments": {
                "ids": [external_id],
                "delete-local-data": delete_files
            }
        }))
        .await
        .map(|_| ())
    }

    async fn pause(&self, external_id: &str) -> Result<()> {
        self.rpc(json!({
            "method": "torrent-stop",
            "arguments": {"ids": [external_id]}
        }))
        .await
        .map(|_| ())
    }

    async fn resume(&self, external_id: &str) -> Result<()> {
        self.rpc(json!({
            "method": "torrent-start",
            "arguments": {"ids": [external_id]}
        }))
        .await
        .map(|_| ())
    }
}
