//! NZBGet JSON-RPC client
//!
//! POSTs to `/jsonrpc` with basic auth. Active items come from
//! `listgroups`, finished ones from `history`; `append` submits and
//! `editqueue` drives pause/resume/delete.

use crate::models::{ClientDefinition, DownloadClient, DownloadItem, DownloadItemStatus};
use async_trait::async_trait;
use outpost_core::{OutpostError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

pub struct NzbgetClient {
    definition: ClientDefinition,
    client: Client,
    rpc_url: Url,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NzbGroup {
    #[serde(rename = "NZBID")]
    nzb_id: i64,
    #[serde(rename = "NZBName")]
    nzb_name: String,
    status: String,
    #[serde(rename = "FileSizeMB")]
    file_size_mb: i64,
    #[serde(rename = "RemainingSizeMB")]
    remaining_size_mb: i64,
    #[serde(default)]
    download_rate: i64,
    #[serde(default)]
    dest_dir: String,
    #[serde(default)]
    category: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NzbHistoryItem {
    #[serde(rename = "NZBID")]
    nzb_id: i64,
    name: String,
    status: String,
    #[serde(rename = "FileSizeMB")]
    file_size_mb: i64,
    #[serde(default)]
    dest_dir: String,
    #[serde(default)]
    category: String,
}

impl NzbgetClient {
    pub fn new(definition: ClientDefinition) -> Result<Self> {
        let base = definition.base_url.trim_end_matches('/');
        let rpc_url =
            Url::parse(&format!("{}/jsonrpc", base)).map_err(|e| OutpostError::NotConfigured {
                what: format!("client:{}", definition.name),
                message: format!("invalid base URL: {}", e),
            })?;
        let client = Client::builder()
            .build()
            .map_err(|e| OutpostError::network(&definition.name, e))?;
        Ok(Self {
            definition,
            client,
            rpc_url,
        })
    }

    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let mut request = self
            .client
            .post(self.rpc_url.clone())
            .timeout(RPC_TIMEOUT)
            .json(&json!({"method": method, "params": params}));
        if !self.definition.username.is_empty() {
            request = request.basic_auth(&self.definition.username, Some(&self.definition.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| OutpostError::network(&self.definition.name, e))?;

        match response.status() {
            s if s == reqwest::StatusCode::UNAUTHORIZED => {
                return Err(OutpostError::AuthFailed {
                    service: self.definition.name.clone(),
                    message: "credentials rejected".to_string(),
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

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| OutpostError::protocol(&self.definition.name, e))?;
        Ok(envelope.result)
    }

    fn map_group_status(status: &str) -> DownloadItemStatus {
        match status {
            s if s.starts_with("DOWNLOADING") || s.starts_with("POST") => {
                DownloadItemStatus::Downloading
            }
            s if s.starts_with("PAUSED") => DownloadItemStatus::Paused,
            s if s.starts_with("QUEUED") || s.starts_with("FETCHING") => DownloadItemStatus::Queued,
            _ => DownloadItemStatus::Queued,
        }
    }

    fn group_item(&self, group: NzbGroup) -> DownloadItem {
        let size = group.file_size_mb * 1024 * 1024;
        let remaining = group.remaining_size_mb * 1024 * 1024;
        let downloaded = (size - remaining).max(0);
        let progress = if size > 0 {
            downloaded as f64 / size as f64
        } else {
            0.0
        };

        DownloadItem {
            client_id: self.definition.id,
            external_id: group.nzb_id.to_string(),
            name: group.nzb_name,
            size_bytes: size,
            downloaded_bytes: downloaded,
            progress: progress.clamp(0.0, 1.0),
            speed_bps: group.download_rate.max(0) as u64,
            eta_secs: None,
            ratio: None,
            seeding_time_secs: None,
            status: Self::map_group_status(&group.status),
            save_path: if group.dest_dir.is_empty() {
                None
            } else {
                Some(group.dest_dir)
            },
            category: if group.category.is_empty() {
                None
            } else {
                Some(group.category)
            },
            error_message: None,
        }
    }

    fn history_item(&self, item: NzbHistoryItem) -> DownloadItem {
        // History statuses look like SUCCESS/ALL, FAILURE/PAR, WARNING/SCRIPT.
        let failed = item.status.starts_with("FAILURE");
        let size = item.file_size_mb * 1024 * 1024;

        DownloadItem {
            client_id: self.definition.id,
            external_id: item.nzb_id.to_string(),
            name: item.name,
            size_bytes: size,
            downloaded_bytes: size,
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
            save_path: if item.dest_dir.is_empty() {
                None
            } else {
                Some(item.dest_dir)
            },
            category: if item.category.is_empty() {
                None
            } else {
                Some(item.category)
            },
            error_message: if failed { Some(item.status) } else { None },
        }
    }
}

#[async_trait]
impl DownloadClient for NzbgetClient {
    fn definition(&self) -> &ClientDefinition {
        &self.definition
    }

    async fn test(&self) -> Result<()> {
        let _: serde_json::Value = self.rpc("version", json!([])).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DownloadItem>> {
        let groups: Vec<NzbGroup> = self.rpc("listgroups", json!([0])).await?;
        let history: Vec<NzbHistoryItem> = self.rpc("history", json!([false])).await?;

        let mut items: Vec<DownloadItem> =
            groups.into_iter().map(|g| self.group_item(g)).collect();
        items.extend(history.into_iter().map(|h| self.history_item(h)));
        Ok(items)
    }

    async fn add_torrent(&self, _link: &str, _category: Option<&str>) -> Result<Option<String>> {
        Err(OutpostError::NoSuitableClient {
            protocol: "torrent".to_string(),
        })
    }

    async fn add_nzb(&self, link: &str, category: Option<&str>) -> Result<Option<String>> {
        let category = category.or(self.definition.category.as_deref()).unwrap_or("");
        // append(NZBFilename, Content, Category, Priority, AddToTop, AddPaused,
        //        DupeKey, DupeScore, DupeMode)
        let id: i64 = self
            .rpc(
                "append",
                json!(["", link, category, 0, false, false, "", 0, "SCORE"]),
            )
            .await?;
        if id <= 0 {
            return Err(OutpostError::protocol(
                &self.definition.name,
                "append rejected the nzb",
            ));
        }
        Ok(Some(id.to_string()))
    }

    async fn remove(&self, external_id: &str, _delete_files: bool) -> Result<()> {
        let id: i64 = external_id
            .parse()
            .map_err(|_| OutpostError::protocol(&self.definition.name, "non-numeric nzb id"))?;
        let _: bool = self
            .rpc("editqueue", json!(["GroupFinalDelete", "", [id]]))
            .await?;
        Ok(())
    }

    async fn pause(&self, external_id: &str) -> Result<()> {
        let id: i64 = external_id
            .parse()
            .map_err(|_| OutpostError::protocol(&self.definition.name, "non-numeric nzb id"))?;
        let _: bool = self.rpc("editqueue", json!(["GroupPause", "", [id]])).await?;
        Ok(())
    }

    async fn resume(&self, external_id: &str) -> Result<()> {
        let id: i64 = external_id
            .parse()
            .map_err(|_| OutpostError::protocol(&self.definition.name, "non-numeric nzb id"))?;
        let _: bool = self
            .rpc("editqueue", json!(["GroupResume", "", [id]]))
            .await?;
        Ok(())
    }
}
