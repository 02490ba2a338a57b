//! Release scoring and upgrade decisions
//!
//! Total score = tier base + matched custom-format deltas. Rejection is a
//! value on the result, never an error: a rejected release stays in the
//! candidate list with its reason attached so callers can log the decision.

use crate::custom_formats::matching_formats;
use crate::quality::compute_quality_tier;
use outpost_core::models::{
    CustomFormat, MatchedFormat, ParsedRelease, QualityProfile, QualityTier, ReleaseProtocol,
};
use std::cmp::Ordering;

/// Outcome of scoring one release against a profile.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub quality: QualityTier,
    pub base_score: i32,
    pub matched_formats: Vec<MatchedFormat>,
    pub total_score: i32,
    pub rejection: Option<String>,
}

/// Scoring engine carrying the custom format set.
#[derive(Debug, Default)]
pub struct DecisionEngine {
    formats: Vec<CustomFormat>,
}

impl DecisionEngine {
    pub fn new(formats: Vec<CustomFormat>) -> Self {
        Self { formats }
    }

    /// Score a parsed release against a profile.
    pub fn evaluate(
        &self,
        raw_title: &str,
        parsed: &ParsedRelease,
        profile: &QualityProfile,
    ) -> Evaluation {
        let quality = compute_quality_tier(parsed);
        let base_score = quality.base_score();
        let matched_formats = matching_formats(&self.formats, parsed, raw_title, profile);
        let format_total: i32 = matched_formats.iter().map(|m| m.score).sum();
        let total_score = base_score + format_total;

        let rejection = if let Some(warning) = parsed.warnings.iter().next() {
            Some(format!("release flagged: {:?}", warning))
        } else if !profile.allows(quality) {
            Some(format!("quality {} not allowed by profile", quality))
        } else if total_score < profile.min_score {
            Some(format!(
                "score {} below profile minimum {}",
                total_score, profile.min_score
            ))
        } else {
            None
        };

        Evaluation {
            quality,
            base_score,
            matched_formats,
            total_score,
            rejection,
        }
    }

    /// Whether a candidate score replaces an existing import.
    ///
    /// Upgrades stop at `upgrade_until`, and a replacement must beat the
    /// existing score by the profile's minimum increment.
    pub fn is_upgrade(&self, profile: &QualityProfile, existing: i32, candidate: i32) -> bool {
        profile.upgrades_allowed
            && existing < profile.upgrade_until
            && candidate - existing >= profile.min_score_increment
    }

    pub fn formats(&self) -> &[CustomFormat] {
        &self.formats
    }
}

/// Ordering between two equally-acceptable candidates: higher total first;
/// on ties, more seeders for torrents, then earlier publish date.
pub fn compare_candidates(
    a_total: i32,
    a_protocol: ReleaseProtocol,
    a_seeders: Option<i32>,
    a_published: Option<chrono::DateTime<chrono::Utc>>,
    b_total: i32,
    b_protocol: ReleaseProtocol,
    b_seeders: Option<i32>,
    b_published: Option<chrono::DateTime<chrono::Utc>>,
) -> Ordering {
    match b_total.cmp(&a_total) {
        Ordering::Equal => {}
        other => return other,
    }

    if a_protocol == ReleaseProtocol::Torrent && b_protocol == ReleaseProtocol::Torrent {
        match b_seeders.unwrap_or(0).cmp(&a_seeders.unwrap_or(0)) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    // Earlier publish date wins.
    match (a_published, b_published) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
