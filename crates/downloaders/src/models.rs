//! Download client models and the uniform client trait

use async_trait::async_trait;
use outpost_core::models::ReleaseProtocol;
use outpost_core::Result;
use serde::{Deserialize, Serialize};

/// Normalised status every client maps its own vocabulary onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadItemStatus {
    Queued,
    Downloading,
    Paused,
    Completed,
    Error,
}

impl std::fmt::Display for DownloadItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DownloadItemStatus::Queued => "queued",
            DownloadItemStatus::Downloading => "downloading",
            DownloadItemStatus::Paused => "paused",
            DownloadItemStatus::Completed => "completed",
            DownloadItemStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One download as reported by a client, normalised across clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    pub client_id: i32,
    pub external_id: String,
    pub name: String,
    pub size_bytes: i64,
    pub downloaded_bytes: i64,
    /// 0.0 to 1.0
    pub progress: f64,
    pub speed_bps: u64,
    pub eta_secs: Option<i64>,
    pub ratio: Option<f64>,
    pub seeding_time_secs: Option<i64>,
    pub status: DownloadItemStatus,
    pub save_path: Option<String>,
    pub category: Option<String>,
    pub error_message: Option<String>,
}

/// Download client implementation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    QBittorrent,
    Transmission,
    Sabnzbd,
    Nzbget,
}

impl ClientKind {
    /// The transfer protocol this client speaks.
    pub fn protocol(&self) -> ReleaseProtocol {
        match self {
            ClientKind::QBittorrent | ClientKind::Transmission => ReleaseProtocol::Torrent,
            ClientKind::Sabnzbd | ClientKind::Nzbget => ReleaseProtocol::Usenet,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::QBittorrent => "qbittorrent",
            ClientKind::Transmission => "transmission",
            ClientKind::Sabnzbd => "sabnzbd",
            ClientKind::Nzbget => "nzbget",
        }
    }
}

impl std::str::FromStr for ClientKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "qbittorrent" => Ok(ClientKind::QBittorrent),
            "transmission" => Ok(ClientKind::Transmission),
            "sabnzbd" => Ok(ClientKind::Sabnzbd),
            "nzbget" => Ok(ClientKind::Nzbget),
            other => Err(format!("unknown client kind: {}", other)),
        }
    }
}

/// Static configuration of one download client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDefinition {
    pub id: i32,
    pub name: String,
    pub kind: ClientKind,
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub api_key: String,
    /// Category/label submitted downloads are tagged with.
    pub category: Option<String>,
    pub enabled: bool,
    /// Lower number = preferred when several clients match a protocol.
    pub priority: i32,
}

impl ClientDefinition {
    pub fn new(id: i32, name: impl Into<String>, kind: ClientKind, base_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            base_url: base_url.into(),
            username: String::new(),
            password: String::new(),
            api_key: String::new(),
            category: Some("outpost".to_string()),
            enabled: true,
            priority: 25,
        }
    }

    pub fn protocol(&self) -> ReleaseProtocol {
        self.kind.protocol()
    }
}

/// Uniform submit/list/delete interface over all download clients.
#[async_trait]
pub trait DownloadClient: Send + Sync + 'static {
    fn definition(&self) -> &ClientDefinition;

    async fn test(&self) -> Result<()>;

    async fn list(&self) -> Result<Vec<DownloadItem>>;

    /// Submit a torrent link or magnet. Returns the client-side id when the
    /// client reports one.
    async fn add_torrent(&self, link: &str, category: Option<&str>) -> Result<Option<String>>;

    /// Submit an NZB link. Returns the client-side id when reported.
    async fn add_nzb(&self, link: &str, category: Option<&str>) -> Result<Option<String>>;

    async fn remove(&self, external_id: &str, delete_files: bool) -> Result<()>;

    async fn pause(&self, external_id: &str) -> Result<()>;

    async fn resume(&self, external_id: &str) -> Result<()>;
}

/// Extract the info hash from a magnet link, for use as an external id.
pub fn magnet_info_hash(link: &str) -> Option<String> {
    let marker = "btih:";
    let start = link.find(marker)? + marker.len();
    let rest = &link[start..];
    let end = rest.find('&').unwrap_or(rest.len());
    let hash = &rest[..end];
    if hash.len() >= 32 {
        Some(hash.to_lowercase())
    } else {
        None
    }
}
