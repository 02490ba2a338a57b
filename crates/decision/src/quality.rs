//! Quality tier derivation
//!
//! Joins (resolution, source) into the fixed tier table. Fallbacks apply
//! when one side is missing; the result is stable for a given parse.

use outpost_core::models::{ParsedRelease, QualityTier, Resolution, Source};

/// Compute the quality tier for a parsed release.
pub fn compute_quality_tier(parsed: &ParsedRelease) -> QualityTier {
    use QualityTier::*;

    match (parsed.source, parsed.resolution) {
        (Some(Source::Remux), Some(Resolution::R2160p)) => Remux2160p,
        (Some(Source::Remux), _) => Remux1080p,

        (Some(Source::Bluray), Some(Resolution::R2160p)) => Bluray2160p,
        (Some(Source::Bluray), Some(Resolution::R1080p)) => Bluray1080p,
        (Some(Source::Bluray), _) => Bluray720p,

        (Some(Source::WebDl), Some(Resolution::R2160p)) => WebDl2160p,
        (Some(Source::WebDl), Some(Resolution::R1080p)) => WebDl1080p,
        (Some(Source::WebDl), _) => WebDl720p,

        (Some(Source::WebRip), Some(Resolution::R2160p)) => WebRip2160p,
        (Some(Source::WebRip), Some(Resolution::R1080p)) => WebRip1080p,
        (Some(Source::WebRip), _) => WebRip720p,

        (Some(Source::Hdtv), Some(Resolution::R2160p)) => Hdtv2160p,
        (Some(Source::Hdtv), Some(Resolution::R1080p)) => Hdtv1080p,
        (Some(Source::Hdtv), _) => Hdtv720p,

        (Some(Source::Dvd), _) => Dvd,
        (Some(Source::Cam), _) => Cam,

        // No source: assume a broadcast capture at the seen resolution.
        (None, Some(Resolution::R2160p)) => Hdtv2160p,
        (None, Some(Resolution::R1080p)) => Hdtv1080p,
        (None, Some(Resolution::R720p)) => Hdtv720p,
        (None, Some(Resolution::R576p)) | (None, Some(Resolution::R480p)) => Dvd,
        (None, None) => Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_release;

    #[test]
    fn tier_join_matches_fixture_names() {
        let cases = [
            (
                "The.Matrix.1999.2160p.UHD.BluRay.REMUX.HDR.DV.TrueHD.Atmos.7.1-FraMeSToR",
                "Remux-2160p",
            ),
            ("Show.Name.S02E05.1080p.WEB-DL.DDP5.1.H.264-NTb", "WEBDL-1080p"),
            ("Movie.2020.1080p.BluRay.x264-GRP", "Bluray-1080p"),
            ("Movie.2020.2160p.WEB-DL.x265-GRP", "WEBDL-2160p"),
            ("Movie.2020.720p.HDTV.x264-GRP", "HDTV-720p"),
            ("Movie.2020.DVDRip.x264-GRP", "DVD"),
        ];
        for (name, tier) in cases {
            let parsed = parse_release(name);
            assert_eq!(compute_quality_tier(&parsed).name(), tier, "{name}");
        }
    }

    #[test]
    fn missing_source_falls_back_by_resolution() {
        let parsed = parse_release("Movie.2020.1080p.x264-GRP");
        assert_eq!(compute_quality_tier(&parsed), QualityTier::Hdtv1080p);
    }

    #[test]
    fn tier_is_stable_across_runs() {
        let parsed = parse_release("Movie.2020.1080p.BluRay.x264-GRP");
        let first = compute_quality_tier(&parsed);
        for _ in 0..10 {
            assert_eq!(compute_quality_tier(&parsed), first);
        }
    }
}
