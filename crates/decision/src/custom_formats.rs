//! Custom format matching
//!
//! A custom format is a conjunction of term tests over parsed-release
//! attributes. Matching is pure; the score a match contributes comes from
//! the quality profile (falling back to the format's own score).

use outpost_core::models::{
    CustomFormat, FormatCondition, MatchedFormat, ParsedFlag, ParsedRelease, QualityProfile,
};
use regex::RegexBuilder;
use tracing::warn;

/// Whether a single condition holds for a release.
fn condition_matches(condition: &FormatCondition, parsed: &ParsedRelease, raw_title: &str) -> bool {
    let (result, negate) = match condition {
        FormatCondition::TitleRegex { pattern, negate } => {
            let matched = match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => re.is_match(raw_title),
                Err(e) => {
                    warn!(pattern, error = %e, "invalid custom format regex");
                    false
                }
            };
            (matched, *negate)
        }
        FormatCondition::SourceIs { source, negate } => (parsed.source == Some(*source), *negate),
        FormatCondition::ResolutionIs { resolution, negate } => {
            (parsed.resolution == Some(*resolution), *negate)
        }
        FormatCondition::CodecIs { codec, negate } => (parsed.codec == Some(*codec), *negate),
        FormatCondition::AudioIs { audio, negate } => (parsed.audio == Some(*audio), *negate),
        FormatCondition::HdrHas { format, negate } => (parsed.hdr.contains(format), *negate),
        FormatCondition::GroupIs { group, negate } => (
            parsed
                .release_group
                .as_deref()
                .map(|g| g.eq_ignore_ascii_case(group))
                .unwrap_or(false),
            *negate,
        ),
        FormatCondition::FlagSet { flag, negate } => {
            let set = match flag {
                ParsedFlag::Proper => parsed.proper,
                ParsedFlag::Repack => parsed.repack,
                ParsedFlag::Real => parsed.real,
                ParsedFlag::Atmos => parsed.atmos,
                ParsedFlag::SeasonPack => parsed.is_season_pack,
                ParsedFlag::Daily => parsed.is_daily,
            };
            (set, *negate)
        }
    };
    result != negate
}

/// Whether every condition of a format holds.
pub fn format_matches(format: &CustomFormat, parsed: &ParsedRelease, raw_title: &str) -> bool {
    format.enabled
        && !format.conditions.is_empty()
        && format
            .conditions
            .iter()
            .all(|c| condition_matches(c, parsed, raw_title))
}

/// Every matching format with the score it contributes under the profile.
pub fn matching_formats(
    formats: &[CustomFormat],
    parsed: &ParsedRelease,
    raw_title: &str,
    profile: &QualityProfile,
) -> Vec<MatchedFormat> {
    formats
        .iter()
        .filter(|f| format_matches(f, parsed, raw_title))
        .map(|f| MatchedFormat {
            format_id: f.id,
            name: f.name.clone(),
            score: profile.format_score(f),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_release;
    use outpost_core::models::{AudioCodec, HdrFormat, Source};

    fn profile() -> QualityProfile {
        QualityProfile::new("test")
    }

    #[test]
    fn conjunction_requires_all_conditions() {
        let format = CustomFormat::new("DV Remux", 200)
            .with_condition(FormatCondition::HdrHas {
                format: HdrFormat::DolbyVision,
                negate: false,
            })
            .with_condition(FormatCondition::SourceIs {
                source: Source::Remux,
                negate: false,
            });

        let remux = parse_release("Movie.2020.2160p.UHD.BluRay.REMUX.DV.TrueHD-GRP");
        let webdl = parse_release("Movie.2020.2160p.WEB-DL.DV.DDP5.1-GRP");

        assert!(format_matches(&format, &remux, "x"));
        assert!(!format_matches(&format, &webdl, "x"));
    }

    #[test]
    fn negated_conditions_invert() {
        let format = CustomFormat::new("Not x265", 10).with_condition(FormatCondition::CodecIs {
            codec: outpost_core::models::Codec::X265,
            negate: true,
        });

        let x264 = parse_release("Movie.2020.1080p.BluRay.x264-GRP");
        let x265 = parse_release("Movie.2020.1080p.BluRay.x265-GRP");

        assert!(format_matches(&format, &x264, "x"));
        assert!(!format_matches(&format, &x265, "x"));
    }

    #[test]
    fn title_regex_runs_on_the_raw_name() {
        let format =
            CustomFormat::new("Hybrid", 50).with_condition(FormatCondition::TitleRegex {
                pattern: r"\bhybrid\b".to_string(),
                negate: false,
            });

        let raw = "Movie.2020.Hybrid.2160p.REMUX-GRP";
        let parsed = parse_release(raw);
        assert!(format_matches(&format, &parsed, raw));
    }

    #[test]
    fn disabled_and_empty_formats_never_match() {
        let mut format = CustomFormat::new("Atmos", 100).with_condition(FormatCondition::AudioIs {
            audio: AudioCodec::TrueHd,
            negate: false,
        });
        let parsed = parse_release("Movie.2020.TrueHD.BluRay-GRP");

        assert!(format_matches(&format, &parsed, "x"));
        format.enabled = false;
        assert!(!format_matches(&format, &parsed, "x"));

        let empty = CustomFormat::new("Empty", 10);
        assert!(!format_matches(&empty, &parsed, "x"));
    }

    #[test]
    fn profile_overrides_apply_to_matches() {
        let format = CustomFormat::new("Atmos", 100).with_condition(FormatCondition::FlagSet {
            flag: ParsedFlag::Atmos,
            negate: false,
        });
        let mut profile = profile();
        profile.format_scores.insert(format.id, 321);

        let parsed = parse_release("Movie.2020.TrueHD.Atmos.BluRay-GRP");
        let matches = matching_formats(&[format], &parsed, "x", &profile);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 321);
    }
}
