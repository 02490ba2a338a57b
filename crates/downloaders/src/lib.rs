//! Outpost download client gateway
//!
//! Uniform submit/list/delete over qBittorrent, Transmission, SABnzbd and
//! NZBGet, with normalised status mapping and protocol-based submission
//! routing.

pub mod models;
pub mod nzbget;
pub mod qbittorrent;
pub mod router;
pub mod sabnzbd;
pub mod transmission;

// Re-export public types
pub use models::{
    magnet_info_hash, ClientDefinition, ClientKind, DownloadClient, DownloadItem,
    DownloadItemStatus,
};
pub use nzbget::NzbgetClient;
pub use qbittorrent::QbittorrentClient;
pub use router::{build_client, ClientRouter, Submission};
pub use sabnzbd::SabnzbdClient;
pub use transmission::TransmissionClient;
