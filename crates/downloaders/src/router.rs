//! Submission routing across download clients
//!
//! A torrent release goes to a torrent-capable enabled client, an NZB to a
//! usenet-capable one. When several match, the highest-priority (lowest
//! number) client wins; when none do, submission fails with
//! `NoSuitableClient`.

use crate::models::{ClientDefinition, ClientKind, DownloadClient};
use crate::nzbget::NzbgetClient;
use crate::qbittorrent::QbittorrentClient;
use crate::sabnzbd::SabnzbdClient;
use crate::transmission::TransmissionClient;
use outpost_core::models::ReleaseProtocol;
use outpost_core::{OutpostError, Result};
use std::sync::Arc;
use tracing::{info, instrument};

/// Construct the right client for a definition.
pub fn build_client(definition: ClientDefinition) -> Result<Arc<dyn DownloadClient>> {
    let client: Arc<dyn DownloadClient> = match definition.kind {
        ClientKind::QBittorrent => Arc::new(QbittorrentClient::new(definition)?),
        ClientKind::Transmission => Arc::new(TransmissionClient::new(definition)?),
        ClientKind::Sabnzbd => Arc::new(SabnzbdClient::new(definition)?),
        ClientKind::Nzbget => Arc::new(NzbgetClient::new(definition)?),
    };
    Ok(client)
}

/// What a successful submission looked like.
#[derive(Debug, Clone)]
pub struct Submission {
    pub client_id: i32,
    pub client_name: String,
    /// Client-side id when the client reported one.
    pub external_id: Option<String>,
}

pub struct ClientRouter {
    clients: Vec<Arc<dyn DownloadClient>>,
}

impl ClientRouter {
    pub fn new(clients: Vec<Arc<dyn DownloadClient>>) -> Self {
        Self { clients }
    }

    pub fn clients(&self) -> &[Arc<dyn DownloadClient>] {
        &self.clients
    }

    pub fn client_by_id(&self, client_id: i32) -> Option<Arc<dyn DownloadClient>> {
        self.clients
            .iter()
            .find(|c| c.definition().id == client_id)
            .cloned()
    }

    /// The enabled client that should receive a release of the protocol.
    pub fn route(&self, protocol: ReleaseProtocol) -> Result<Arc<dyn DownloadClient>> {
        self.clients
            .iter()
            .filter(|c| c.definition().enabled && c.definition().protocol() == protocol)
            .min_by_key(|c| c.definition().priority)
            .cloned()
            .ok_or(OutpostError::NoSuitableClient {
                protocol: protocol.to_string(),
            })
    }

    /// Submit a link, picking the client by protocol.
    #[instrument(skip(self, link))]
    pub async fn submit(
        &self,
        protocol: ReleaseProtocol,
        link: &str,
        category: Option<&str>,
    ) -> Result<Submission> {
        let client = self.route(protocol)?;
        let definition = client.definition();

        let external_id = match protocol {
            ReleaseProtocol::Torrent => client.add_torrent(link, category).await?,
            ReleaseProtocol::Usenet => client.add_nzb(link, category).await?,
        };

        info!(
            client = %definition.name,
            %protocol,
            external_id = external_id.as_deref().unwrap_or("<pending>"),
            "release submitted to download client"
        );

        Ok(Submission {
            client_id: definition.id,
            client_name: definition.name.clone(),
            external_id,
        })
    }
}
