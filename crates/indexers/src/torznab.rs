//! Torznab/Newznab indexer client
//!
//! Both variants speak the same query-string API (`?apikey=…&t=…`) and
//! return an RSS feed whose `<item>` elements carry extension attributes
//! (`<torznab:attr name value>` / `<newznab:attr …>`). Torznab serves
//! torrents, Newznab serves usenet; everything else is shared.

use crate::models::{
    IndexerCaps, IndexerClient, IndexerDefinition, IndexerKind, IndexerRelease, SearchParams,
    SearchType,
};
use crate::rate_limit::{RateLimitPolicy, RateLimiter};
use async_trait::async_trait;
use chrono::DateTime;
use outpost_core::models::ReleaseProtocol;
use outpost_core::{OutpostError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Cap/test calls get a short timeout, searches a longer one.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct XmlIndexerClient {
    definition: IndexerDefinition,
    client: Client,
    rate_limiter: RateLimiter,
}

impl XmlIndexerClient {
    pub fn new(definition: IndexerDefinition) -> Result<Self> {
        debug_assert!(matches!(
            definition.kind,
            IndexerKind::Torznab | IndexerKind::Newznab
        ));

        let client = Client::builder()
            .user_agent("Outpost/0.4")
            .build()
            .map_err(|e| OutpostError::network(&definition.name, e))?;
        let rate_limiter =
            RateLimiter::new(definition.requests_per_minute, RateLimitPolicy::Wait);

        Ok(Self {
            definition,
            client,
            rate_limiter,
        })
    }

    fn api_url(&self) -> Result<Url> {
        let base = self.definition.base_url.trim_end_matches('/');
        Url::parse(&format!("{}/api", base)).map_err(|e| OutpostError::NotConfigured {
            what: format!("indexer:{}", self.definition.name),
            message: format!("invalid base URL: {}", e),
        })
    }

    fn build_query(&self, op: &str, params: Option<&SearchParams>) -> Result<Url> {
        let mut url = self.api_url()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("apikey", &self.definition.api_key);
            pairs.append_pair("t", op);

            if let Some(params) = params {
                if let Some(ref query) = params.query {
                    pairs.append_pair("q", query);
                }
                if let Some(ref imdb) = params.imdb_id {
                    // The newznab convention wants the bare numeric id.
                    pairs.append_pair("imdbid", imdb.trim_start_matches("tt"));
                }
                if let Some(tmdb) = params.tmdb_id {
                    pairs.append_pair("tmdbid", &tmdb.to_string());
                }
                if let Some(tvdb) = params.tvdb_id {
                    pairs.append_pair("tvdbid", &tvdb.to_string());
                }
                if let Some(season) = params.season {
                    pairs.append_pair("season", &season.to_string());
                }
                if let Some(episode) = params.episode {
                    pairs.append_pair("ep", &episode.to_string());
                }
                if !params.categories.is_empty() {
                    let cats = params
                        .categories
                        .iter()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    pairs.append_pair("cat", &cats);
                }
                if let Some(limit) = params.limit {
                    pairs.append_pair("limit", &limit.to_string());
                }
                if let Some(offset) = params.offset {
                    pairs.append_pair("offset", &offset.to_string());
                }
            }
        }
        Ok(url)
    }

    async fn fetch(&self, url: Url, timeout: Duration) -> Result<String> {
        self.rate_limiter.acquire(&self.definition.name).await?;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| OutpostError::network(&self.definition.name, e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(OutpostError::AuthFailed {
                    service: self.definition.name.clone(),
                    message: "indexer rejected the API key".to_string(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(OutpostError::RateLimited {
                    service: self.definition.name.clone(),
                    retry_after_secs: retry_after,
                });
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

        response
            .text()
            .await
            .map_err(|e| OutpostError::network(&self.definition.name, e))
    }
}

#[async_trait]
impl IndexerClient for XmlIndexerClient {
    fn definition(&self) -> &IndexerDefinition {
        &self.definition
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<IndexerRelease>> {
        let url = self.build_query(params.search_type.as_str(), Some(params))?;
        debug!(indexer = %self.definition.name, %url, "searching indexer");
        let body = self.fetch(url, SEARCH_TIMEOUT).await?;
        parse_feed(
            &body,
            self.definition.id,
            self.definition.default_protocol(),
            &self.definition.name,
        )
    }

    async fn capabilities(&self) -> Result<IndexerCaps> {
        let url = self.build_query("caps", None)?;
        let body = self.fetch(url, TEST_TIMEOUT).await?;
        parse_caps(&body, &self.definition.name)
    }

    async fn test_connection(&self) -> Result<()> {
        self.capabilities().await.map(|_| ())
    }

    async fn fetch_latest(&self) -> Result<Vec<IndexerRelease>> {
        let params = SearchParams {
            search_type: SearchType::Search,
            limit: Some(100),
            ..Default::default()
        };
        let url = self.build_query("search", Some(&params))?;
        let body = self.fetch(url, SEARCH_TIMEOUT).await?;
        parse_feed(
            &body,
            self.definition.id,
            self.definition.default_protocol(),
            &self.definition.name,
        )
    }
}

#[derive(Default)]
struct ItemBuilder {
    title: String,
    guid: String,
    link: String,
    enclosure_url: Option<String>,
    size: Option<i64>,
    seeders: Option<i32>,
    leechers: Option<i32>,
    magnet_url: Option<String>,
    info_hash: Option<String>,
    imdb_id: Option<String>,
    tvdb_id: Option<i64>,
    categories: Vec<i32>,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ItemBuilder {
    fn apply_attr(&mut self, name: &str, value: &str) {
        match name {
            "seeders" => self.seeders = value.parse().ok(),
            "peers" | "leechers" => self.leechers = value.parse().ok(),
            "size" => {
                if self.size.is_none() {
                    self.size = value.parse().ok();
                }
            }
            "magneturl" => self.magnet_url = Some(value.to_string()),
            "infohash" => self.info_hash = Some(value.to_string()),
            "imdb" | "imdbid" => {
                let id = value.trim_start_matches("tt");
                if !id.is_empty() {
                    self.imdb_id = Some(format!("tt{}", id));
                }
            }
            "tvdbid" => self.tvdb_id = value.parse().ok(),
            "category" => {
                if let Ok(cat) = value.parse() {
                    if !self.categories.contains(&cat) {
                        self.categories.push(cat);
                    }
                }
            }
            _ => {}
        }
    }

    fn build(self, indexer_id: i32, protocol: ReleaseProtocol) -> Option<IndexerRelease> {
        if self.title.is_empty() {
            return None;
        }
        let download_url = self
            .enclosure_url
            .or_else(|| if self.link.is_empty() { None } else { Some(self.link.clone()) })?;
        let guid = if self.guid.is_empty() {
            download_url.clone()
        } else {
            self.guid
        };
        Some(IndexerRelease {
            indexer_id,
            title: self.title,
            guid,
            download_url,
            magnet_url: self.magnet_url,
            info_hash: self.info_hash,
            size_bytes: self.size,
            seeders: self.seeders,
            leechers: self.leechers,
            categories: self.categories,
            imdb_id: self.imdb_id,
            tvdb_id: self.tvdb_id,
            protocol,
            published_at: self.published_at,
        })
    }
}

fn is_attr_tag(name: &str) -> bool {
    name == "attr" || name.ends_with(":attr")
}

/// Parse an RSS search response into releases.
pub fn parse_feed(
    xml: &str,
    indexer_id: i32,
    protocol: ReleaseProtocol,
    service: &str,
) -> Result<Vec<IndexerRelease>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut releases = Vec::new();
    let mut item: Option<ItemBuilder> = None;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "item" {
                    item = Some(ItemBuilder::default());
                    current_tag = None;
                } else if item.is_some() {
                    current_tag = Some(name);
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if let Some(it) = item.as_mut() {
                    if is_attr_tag(&name) {
                        let mut attr_name = String::new();
                        let mut attr_value = String::new();
                        for attr in e.attributes().flatten() {
                            let value = attr.unescape_value().unwrap_or_default().to_string();
                            match attr.key.as_ref() {
                                b"name" => attr_name = value,
                                b"value" => attr_value = value,
                                _ => {}
                            }
                        }
                        it.apply_attr(&attr_name, &attr_value);
                    } else if name == "enclosure" {
                        for attr in e.attributes().flatten() {
                            let value = attr.unescape_value().unwrap_or_default().to_string();
                            match attr.key.as_ref() {
                                b"url" => it.enclosure_url = Some(value),
                                b"length" => {
                                    if it.size.is_none() {
                                        it.size = value.parse().ok();
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().to_string();
                apply_text(&mut item, current_tag.as_deref(), &text);
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t.into_inner()).to_string();
                apply_text(&mut item, current_tag.as_deref(), &text);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "item" {
                    if let Some(built) = item.take().and_then(|it| it.build(indexer_id, protocol))
                    {
                        releases.push(built);
                    } else {
                        warn!(service, "skipping unparseable feed item");
                    }
                }
                current_tag = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OutpostError::protocol(service, e)),
            _ => {}
        }
    }

    Ok(releases)
}

fn apply_text(item: &mut Option<ItemBuilder>, tag: Option<&str>, text: &str) {
    let (Some(it), Some(tag)) = (item.as_mut(), tag) else {
        return;
    };
    match tag {
        "title" => it.title = text.to_string(),
        "guid" => it.guid = text.to_string(),
        "link" => it.link = text.to_string(),
        "size" => it.size = text.parse().ok(),
        "category" => {
            if let Ok(cat) = text.parse() {
                if !it.categories.contains(&cat) {
                    it.categories.push(cat);
                }
            }
        }
        "pubDate" => {
            it.published_at = DateTime::parse_from_rfc2822(text)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc));
        }
        _ => {}
    }
}

/// Parse a `t=caps` response.
pub fn parse_caps(xml: &str, service: &str) -> Result<IndexerCaps> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut caps = IndexerCaps {
        supports_rss: true,
        ..Default::default()
    };

    let handle_search_tag = |name: &str, e: &quick_xml::events::BytesStart<'_>,
                             caps: &mut IndexerCaps| {
        let search_type = match name {
            "search" => Some(SearchType::Search),
            "tv-search" => Some(SearchType::TvSearch),
            "movie-search" => Some(SearchType::Movie),
            "music-search" => Some(SearchType::Music),
            "book-search" => Some(SearchType::Book),
            _ => None,
        };
        if let Some(st) = search_type {
            let available = e
                .attributes()
                .flatten()
                .find(|a| a.key.as_ref() == b"available")
                .map(|a| a.unescape_value().unwrap_or_default().to_string())
                .unwrap_or_default();
            if available == "yes" {
                caps.search_types.push(st);
            }
        } else if name == "category" || name == "subcat" {
            if let Some(id) = e
                .attributes()
                .flatten()
                .find(|a| a.key.as_ref() == b"id")
                .and_then(|a| a.unescape_value().ok()?.parse().ok())
            {
                if !caps.categories.contains(&id) {
                    caps.categories.push(id);
                }
            }
        }
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                handle_search_tag(&name, &e, &mut caps);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OutpostError::protocol(service, e)),
            _ => {}
        }
    }

    Ok(caps)
}
