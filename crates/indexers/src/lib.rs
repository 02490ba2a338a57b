//! Outpost indexer gateway
//!
//! A uniform query interface over Torznab, Newznab and Prowlarr with
//! capability discovery, newznab category routing, per-indexer rate
//! limiting and bounded parallel fan-out with partial-success merge.

pub mod categories;
pub mod models;
pub mod multi;
pub mod prowlarr;
pub mod rate_limit;
pub mod torznab;

// Re-export public types
pub use models::{
    IndexerCaps, IndexerClient, IndexerDefinition, IndexerFailure, IndexerKind, IndexerRelease,
    SearchOutcome, SearchParams, SearchType,
};
pub use multi::{build_client, IndexerGateway, DEFAULT_FANOUT_CONCURRENCY};
pub use prowlarr::ProwlarrClient;
pub use rate_limit::{RateLimitPolicy, RateLimiter};
pub use torznab::XmlIndexerClient;
