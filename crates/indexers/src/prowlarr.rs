//! Prowlarr API client
//!
//! Prowlarr aggregates many indexers behind one JSON API: searches go to
//! `/api/v1/search` with an `X-Api-Key` header and come back as a JSON
//! array, each result labelled with its transfer protocol.

use crate::models::{
    IndexerCaps, IndexerClient, IndexerDefinition, IndexerRelease, SearchParams, SearchType,
};
use crate::rate_limit::{RateLimitPolicy, RateLimiter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outpost_core::models::ReleaseProtocol;
use outpost_core::{OutpostError, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

/// One entry of the Prowlarr search response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProwlarrResult {
    title: String,
    #[serde(default)]
    guid: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    magnet_url: Option<String>,
    #[serde(default)]
    info_hash: Option<String>,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    seeders: Option<i32>,
    #[serde(default)]
    leechers: Option<i32>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    publish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    categories: Vec<ProwlarrCategory>,
    #[serde(default)]
    imdb_id: Option<serde_json::Value>,
    #[serde(default)]
    tvdb_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProwlarrCategory {
    id: i32,
}

/// Entry of the `/api/v1/indexer` listing, used for capability discovery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProwlarrIndexer {
    #[serde(default)]
    enable: bool,
    #[serde(default)]
    capabilities: Option<ProwlarrCapabilities>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProwlarrCapabilities {
    #[serde(default)]
    search_params: Vec<String>,
    #[serde(default)]
    tv_search_params: Vec<String>,
    #[serde(default)]
    movie_search_params: Vec<String>,
    #[serde(default)]
    categories: Vec<ProwlarrCategory>,
}

pub struct ProwlarrClient {
    definition: IndexerDefinition,
    client: Client,
    rate_limiter: RateLimiter,
    base_url: Url,
}

impl ProwlarrClient {
    pub fn new(definition: IndexerDefinition) -> Result<Self> {
        let base_url =
            Url::parse(&definition.base_url).map_err(|e| OutpostError::NotConfigured {
                what: "prowlarr".to_string(),
                message: format!("invalid base URL: {}", e),
            })?;

        let client = Client::builder()
            .user_agent("Outpost/0.4")
            .build()
            .map_err(|e| OutpostError::network("prowlarr", e))?;

        let rate_limiter =
            RateLimiter::new(definition.requests_per_minute, RateLimitPolicy::Wait);

        Ok(Self {
            definition,
            client,
            rate_limiter,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| OutpostError::protocol("prowlarr", e))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        timeout: Duration,
    ) -> Result<T> {
        self.rate_limiter.acquire("prowlarr").await?;

        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.definition.api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| OutpostError::network("prowlarr", e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(OutpostError::AuthFailed {
                    service: "prowlarr".to_string(),
                    message: "API key rejected".to_string(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(OutpostError::RateLimited {
                    service: "prowlarr".to_string(),
                    retry_after_secs: None,
                })
            }
            status if status.is_server_error() => {
                return Err(OutpostError::network(
                    "prowlarr",
                    format!("server error {}", status),
                ))
            }
            status if !status.is_success() => {
                return Err(OutpostError::protocol(
                    "prowlarr",
                    format!("unexpected status {}", status),
                ))
            }
            _ => {}
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OutpostError::protocol("prowlarr", e))
    }

    fn convert(&self, result: ProwlarrResult) -> Option<IndexerRelease> {
        let protocol = match result.protocol.as_deref() {
            Some("usenet") => ReleaseProtocol::Usenet,
            _ => ReleaseProtocol::Torrent,
        };
        let download_url = result
            .download_url
            .clone()
            .or_else(|| result.magnet_url.clone())?;
        let imdb_id = match result.imdb_id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => {
                Some(format!("tt{}", s.trim_start_matches("tt")))
            }
            Some(serde_json::Value::Number(n)) => n.as_i64().map(|v| format!("tt{:07}", v)),
            _ => None,
        };

        Some(IndexerRelease {
            indexer_id: self.definition.id,
            guid: result.guid.unwrap_or_else(|| download_url.clone()),
            title: result.title,
            download_url,
            magnet_url: result.magnet_url,
            info_hash: result.info_hash,
            size_bytes: result.size,
            seeders: result.seeders,
            leechers: result.leechers,
            categories: result.categories.into_iter().map(|c| c.id).collect(),
            imdb_id,
            tvdb_id: result.tvdb_id,
            protocol,
            published_at: result.publish_date,
        })
    }
}

#[async_trait]
impl IndexerClient for ProwlarrClient {
    fn definition(&self) -> &IndexerDefinition {
        &self.definition
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<IndexerRelease>> {
        let mut url = self.endpoint("/api/v1/search")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("type", params.search_type.as_str());
            if let Some(ref query) = params.query {
                pairs.append_pair("query", query);
            }
            if let Some(ref imdb) = params.imdb_id {
                pairs.append_pair("imdbId", imdb);
            }
            if let Some(tmdb) = params.tmdb_id {
                pairs.append_pair("tmdbId", &tmdb.to_string());
            }
            if let Some(tvdb) = params.tvdb_id {
                pairs.append_pair("tvdbId", &tvdb.to_string());
            }
            if let Some(season) = params.season {
                pairs.append_pair("season", &season.to_string());
            }
            if let Some(episode) = params.episode {
                pairs.append_pair("episode", &episode.to_string());
            }
            if !params.categories.is_empty() {
                let cats = params
                    .categories
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.append_pair("categories", &cats);
            }
            if let Some(limit) = params.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = params.offset {
                pairs.append_pair("offset", &offset.to_string());
            }
        }

        debug!(%url, "searching prowlarr");
        let results: Vec<ProwlarrResult> = self.get_json(url, SEARCH_TIMEOUT).await?;
        Ok(results
            .into_iter()
            .filter_map(|r| self.convert(r))
            .collect())
    }

    async fn capabilities(&self) -> Result<IndexerCaps> {
        let url = self.endpoint("/api/v1/indexer")?;
        let indexers: Vec<ProwlarrIndexer> = self.get_json(url, TEST_TIMEOUT).await?;

        // The union of every enabled downstream indexer's capabilities.
        let mut caps = IndexerCaps {
            supports_rss: true,
            ..Default::default()
        };
        for indexer in indexers.into_iter().filter(|i| i.enable) {
            let Some(c) = indexer.capabilities else {
                continue;
            };
            if !c.search_params.is_empty() && !caps.supports(SearchType::Search) {
                caps.search_types.push(SearchType::Search);
            }
            if !c.tv_search_params.is_empty() && !caps.supports(SearchType::TvSearch) {
                caps.search_types.push(SearchType::TvSearch);
            }
            if !c.movie_search_params.is_empty() && !caps.supports(SearchType::Movie) {
                caps.search_types.push(SearchType::Movie);
            }
            for cat in c.categories {
                if !caps.categories.contains(&cat.id) {
                    caps.categories.push(cat.id);
                }
            }
        }
        Ok(caps)
    }

    async fn test_connection(&self) -> Result<()> {
        let url = self.endpoint("/api/v1/health")?;
        let _: serde_json::Value = self.get_json(url, TEST_TIMEOUT).await?;
        Ok(())
    }

    async fn fetch_latest(&self) -> Result<Vec<IndexerRelease>> {
        let params = SearchParams {
            search_type: SearchType::Search,
            limit: Some(100),
            ..Default::default()
        };
        self.search(&params).await
    }
}
