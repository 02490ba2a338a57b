//! Indexer gateway models and the client trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outpost_core::models::ReleaseProtocol;
use outpost_core::Result;
use serde::{Deserialize, Serialize};

/// Search operation requested from an indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Search,
    Movie,
    TvSearch,
    Music,
    Book,
}

impl SearchType {
    /// Wire name used by the `t=` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Search => "search",
            SearchType::Movie => "movie",
            SearchType::TvSearch => "tvsearch",
            SearchType::Music => "music",
            SearchType::Book => "book",
        }
    }
}

/// Parameters for one indexer query. External ids are preferred over the
/// free-text query when an indexer supports them.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub search_type: SearchType,
    pub query: Option<String>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub tvdb_id: Option<i64>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub categories: Vec<i32>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            search_type: SearchType::Search,
            query: None,
            imdb_id: None,
            tmdb_id: None,
            tvdb_id: None,
            season: None,
            episode: None,
            categories: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

impl SearchParams {
    /// Movie search, id-based when available.
    pub fn movie(title: &str, tmdb_id: Option<i64>, imdb_id: Option<String>) -> Self {
        Self {
            search_type: SearchType::Movie,
            query: if tmdb_id.is_none() && imdb_id.is_none() {
                Some(title.to_string())
            } else {
                None
            },
            tmdb_id,
            imdb_id,
            categories: vec![crate::categories::CAT_MOVIES],
            ..Default::default()
        }
    }

    /// Episode or season search for a show.
    pub fn episode(
        title: &str,
        tvdb_id: Option<i64>,
        season: Option<i32>,
        episode: Option<i32>,
    ) -> Self {
        Self {
            search_type: SearchType::TvSearch,
            query: if tvdb_id.is_none() {
                Some(title.to_string())
            } else {
                None
            },
            tvdb_id,
            season,
            episode,
            categories: vec![crate::categories::CAT_TV],
            ..Default::default()
        }
    }
}

/// Implementation variant of an indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerKind {
    Torznab,
    Newznab,
    Prowlarr,
}

impl IndexerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexerKind::Torznab => "torznab",
            IndexerKind::Newznab => "newznab",
            IndexerKind::Prowlarr => "prowlarr",
        }
    }
}

impl std::str::FromStr for IndexerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "torznab" => Ok(IndexerKind::Torznab),
            "newznab" => Ok(IndexerKind::Newznab),
            "prowlarr" => Ok(IndexerKind::Prowlarr),
            other => Err(format!("unknown indexer kind: {}", other)),
        }
    }
}

/// Static configuration of one indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerDefinition {
    pub id: i32,
    pub name: String,
    pub kind: IndexerKind,
    pub base_url: String,
    pub api_key: String,
    pub enabled: bool,
    /// Lower number = preferred.
    pub priority: i32,
    /// Categories the indexer serves; empty means unknown/general.
    pub categories: Vec<i32>,
    /// Requests allowed per minute against this indexer.
    pub requests_per_minute: u32,
}

impl IndexerDefinition {
    pub fn new(id: i32, name: impl Into<String>, kind: IndexerKind, base_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            base_url: base_url.into(),
            api_key: String::new(),
            enabled: true,
            priority: 25,
            categories: Vec::new(),
            requests_per_minute: 60,
        }
    }

    /// Default protocol for releases this indexer serves. Prowlarr labels
    /// each result itself.
    pub fn default_protocol(&self) -> ReleaseProtocol {
        match self.kind {
            IndexerKind::Torznab => ReleaseProtocol::Torrent,
            IndexerKind::Newznab => ReleaseProtocol::Usenet,
            IndexerKind::Prowlarr => ReleaseProtocol::Torrent,
        }
    }
}

/// Capability report from `t=caps` (or the Prowlarr indexer listing).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerCaps {
    pub search_types: Vec<SearchType>,
    pub categories: Vec<i32>,
    pub supports_rss: bool,
}

impl IndexerCaps {
    pub fn supports(&self, search_type: SearchType) -> bool {
        self.search_types.contains(&search_type)
    }
}

/// One release candidate as returned by an indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerRelease {
    pub indexer_id: i32,
    pub title: String,
    pub guid: String,
    pub download_url: String,
    pub magnet_url: Option<String>,
    pub info_hash: Option<String>,
    pub size_bytes: Option<i64>,
    pub seeders: Option<i32>,
    pub leechers: Option<i32>,
    pub categories: Vec<i32>,
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<i64>,
    pub protocol: ReleaseProtocol,
    pub published_at: Option<DateTime<Utc>>,
}

/// A per-indexer failure carried alongside the merged result set.
#[derive(Debug, Clone)]
pub struct IndexerFailure {
    pub indexer_id: i32,
    pub indexer: String,
    pub error: String,
}

/// Merged fan-out result: successes plus the failures that occurred.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub releases: Vec<IndexerRelease>,
    pub failures: Vec<IndexerFailure>,
}

impl SearchOutcome {
    pub fn is_total_failure(&self) -> bool {
        self.releases.is_empty() && !self.failures.is_empty()
    }
}

/// Uniform interface over Torznab, Newznab and Prowlarr.
#[async_trait]
pub trait IndexerClient: Send + Sync + 'static {
    fn definition(&self) -> &IndexerDefinition;

    async fn search(&self, params: &SearchParams) -> Result<Vec<IndexerRelease>>;

    async fn capabilities(&self) -> Result<IndexerCaps>;

    async fn test_connection(&self) -> Result<()>;

    /// Most recent releases, used by the RSS sweep.
    async fn fetch_latest(&self) -> Result<Vec<IndexerRelease>>;
}
