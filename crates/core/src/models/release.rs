//! Parsed and scored release value objects
//!
//! `ParsedRelease` is derived purely from a release name; `ScoredRelease`
//! layers the quality decision on top and carries the origin needed to
//! actually grab the release. Neither is persisted except as snapshots on
//! tracked downloads and pending grabs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Video resolution bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    R480p,
    R576p,
    R720p,
    R1080p,
    R2160p,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::R480p => write!(f, "480p"),
            Resolution::R576p => write!(f, "576p"),
            Resolution::R720p => write!(f, "720p"),
            Resolution::R1080p => write!(f, "1080p"),
            Resolution::R2160p => write!(f, "2160p"),
        }
    }
}

/// Release source medium, most desirable first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Remux,
    Bluray,
    WebDl,
    WebRip,
    Hdtv,
    Dvd,
    Cam,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Remux => write!(f, "remux"),
            Source::Bluray => write!(f, "bluray"),
            Source::WebDl => write!(f, "webdl"),
            Source::WebRip => write!(f, "webrip"),
            Source::Hdtv => write!(f, "hdtv"),
            Source::Dvd => write!(f, "dvd"),
            Source::Cam => write!(f, "cam"),
        }
    }
}

/// HDR layer present in a release. Multiple layers coexist (e.g. DV + HDR10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdrFormat {
    DolbyVision,
    Hdr10Plus,
    Hdr10,
    Hdr,
    Hlg,
}

/// Video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    X265,
    X264,
    Xvid,
}

/// Audio codec, tested most-specific first by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    TrueHd,
    DtsX,
    DtsHd,
    Dts,
    DdPlus,
    Dd,
    Flac,
    Aac,
    Mp3,
}

/// Warning conditions that can make a release undesirable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseWarning {
    HardcodedSubs,
    Upscaled,
    CompressedAudio,
    Sample,
    ThreeD,
}

/// Everything the parser can extract from a free-form release name.
///
/// Unrecognised pieces simply stay `None`/empty; parsing never fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRelease {
    pub title: String,
    pub year: Option<i32>,

    pub season: Option<i32>,
    pub episode: Option<i32>,
    /// Last episode of a multi-episode release (`S02E05-E07`).
    pub episode_end: Option<i32>,
    pub is_season_pack: bool,
    pub is_daily: bool,
    pub air_date: Option<NaiveDate>,

    pub resolution: Option<Resolution>,
    pub source: Option<Source>,
    pub hdr: BTreeSet<HdrFormat>,
    pub codec: Option<Codec>,
    pub audio: Option<AudioCodec>,
    pub atmos: bool,
    pub channels: Option<String>,
    pub edition: Option<String>,
    pub release_group: Option<String>,

    pub proper: bool,
    pub repack: bool,
    pub real: bool,

    pub warnings: BTreeSet<ReleaseWarning>,
}

impl ParsedRelease {
    /// Whether the name carried any episode-level information.
    pub fn is_episode(&self) -> bool {
        self.season.is_some() || self.is_daily
    }
}

/// Transfer protocol of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseProtocol {
    Torrent,
    Usenet,
}

impl std::fmt::Display for ReleaseProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleaseProtocol::Torrent => write!(f, "torrent"),
            ReleaseProtocol::Usenet => write!(f, "usenet"),
        }
    }
}

/// Where a release came from and how to grab it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseOrigin {
    pub indexer_id: i32,
    pub protocol: ReleaseProtocol,
    pub download_url: String,
    pub magnet_url: Option<String>,
    pub info_hash: Option<String>,
    pub guid: String,
}

/// A matched custom format and the score it contributed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedFormat {
    pub format_id: Uuid,
    pub name: String,
    pub score: i32,
}

/// A parsed release with its quality decision attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRelease {
    /// Raw release name as the indexer returned it.
    pub release_title: String,
    pub parsed: ParsedRelease,

    /// Quality tier name derived from (resolution, source), e.g. `Bluray-1080p`.
    pub quality: String,
    pub base_score: i32,
    pub matched_formats: Vec<MatchedFormat>,
    pub total_score: i32,

    pub rejected: bool,
    pub rejection_reason: Option<String>,

    pub origin: ReleaseOrigin,
    pub size_bytes: Option<i64>,
    pub seeders: Option<i32>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ScoredRelease {
    /// Invariant check: the total is always base plus format deltas.
    pub fn score_is_consistent(&self) -> bool {
        let deltas: i32 = self.matched_formats.iter().map(|m| m.score).sum();
        self.total_score == self.base_score + deltas
    }
}
