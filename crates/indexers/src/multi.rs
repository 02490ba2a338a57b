//! Indexer gateway: routing, fan-out and partial-success merge
//!
//! Searches fan out to every enabled indexer that serves the media kind,
//! with bounded concurrency. Per-indexer failures are collected and
//! returned alongside successful results; one broken indexer never sinks
//! a search.

use crate::categories::indexer_supports_kind;
use crate::models::{
    IndexerClient, IndexerDefinition, IndexerFailure, IndexerKind, IndexerRelease, SearchOutcome,
    SearchParams,
};
use crate::prowlarr::ProwlarrClient;
use crate::torznab::XmlIndexerClient;
use futures::stream::{self, StreamExt};
use outpost_core::models::MediaKind;
use outpost_core::Result;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Bound on in-flight indexer queries during fan-out.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 8;

/// Construct the right client for a definition. The registry the rest of
/// the system uses to go from stored configuration to a live client.
pub fn build_client(definition: IndexerDefinition) -> Result<Arc<dyn IndexerClient>> {
    let client: Arc<dyn IndexerClient> = match definition.kind {
        IndexerKind::Torznab | IndexerKind::Newznab => {
            Arc::new(XmlIndexerClient::new(definition)?)
        }
        IndexerKind::Prowlarr => Arc::new(ProwlarrClient::new(definition)?),
    };
    Ok(client)
}

pub struct IndexerGateway {
    clients: Vec<Arc<dyn IndexerClient>>,
    concurrency: usize,
}

impl IndexerGateway {
    pub fn new(clients: Vec<Arc<dyn IndexerClient>>) -> Self {
        Self {
            clients,
            concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn clients(&self) -> &[Arc<dyn IndexerClient>] {
        &self.clients
    }

    /// Enabled clients that should serve the given media kind.
    fn eligible(&self, kind: MediaKind) -> Vec<Arc<dyn IndexerClient>> {
        self.clients
            .iter()
            .filter(|c| {
                let def = c.definition();
                def.enabled && indexer_supports_kind(&def.categories, kind)
            })
            .cloned()
            .collect()
    }

    /// Fan a search out across eligible indexers and merge the results.
    #[instrument(skip(self, params), fields(kind = %kind))]
    pub async fn search(&self, kind: MediaKind, params: &SearchParams) -> SearchOutcome {
        let targets = self.eligible(kind);
        debug!(indexers = targets.len(), "fanning out search");

        let results = stream::iter(targets)
            .map(|client| search_client(client, params.clone()))
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        merge(results)
    }

    /// `FetchLatest` on every enabled indexer, for the RSS sweep.
    #[instrument(skip(self))]
    pub async fn fetch_latest(&self) -> SearchOutcome {
        let targets: Vec<_> = self
            .clients
            .iter()
            .filter(|c| c.definition().enabled)
            .cloned()
            .collect();

        let results = stream::iter(targets)
            .map(fetch_latest_client)
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        merge(results)
    }
}

type IndexerOutcomeFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = (i32, String, Result<Vec<IndexerRelease>>)> + Send>>;

fn search_client(client: Arc<dyn IndexerClient>, params: SearchParams) -> IndexerOutcomeFuture {
    Box::pin(async move {
        let def = client.definition();
        let outcome = client.search(&params).await;
        (def.id, def.name.clone(), outcome)
    })
}

fn fetch_latest_client(client: Arc<dyn IndexerClient>) -> IndexerOutcomeFuture {
    Box::pin(async move {
        let def = client.definition();
        let outcome = client.fetch_latest().await;
        (def.id, def.name.clone(), outcome)
    })
}

fn merge(results: Vec<(i32, String, Result<Vec<IndexerRelease>>)>) -> SearchOutcome {
    let mut outcome = SearchOutcome::default();
    for (indexer_id, indexer, result) in results {
        match result {
            Ok(mut releases) => outcome.releases.append(&mut releases),
            Err(e) => {
                warn!(indexer = %indexer, error = %e, "indexer query failed");
                outcome.failures.push(IndexerFailure {
                    indexer_id,
                    indexer,
                    error: e.to_string(),
                });
            }
        }
    }
    outcome
}
