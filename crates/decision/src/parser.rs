//! Release name parser
//!
//! Pure function from a free-form release name to a `ParsedRelease`.
//! Regex families are applied in priority order: sources most-specific
//! first (remux before bluray before webdl before webrip before hdtv
//! before dvd), audio codecs likewise. Unrecognised pieces stay empty;
//! parsing never fails.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use outpost_core::models::{
    AudioCodec, Codec, HdrFormat, ParsedRelease, ReleaseWarning, Resolution, Source,
};
use regex::{Regex, RegexBuilder};

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("static parser regex")
}

static EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| ci(r"\.(mkv|mp4|avi|mov|wmv|webm|m4v|ts|m2ts|nzb|torrent)$"));

static GROUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)$").unwrap());

/// Trailing tokens that look like a group but are quality vocabulary.
const GROUP_DENYLIST: &[&str] = &["dl", "rip", "web", "hdtv", "264", "265", "x264", "x265", "hd"];

static RESOLUTION_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(2160p|1080p|720p|576p|480p|4k|uhd)\b"));

// Source families, tested in this order; the first hit wins.
static REMUX_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bremux\b"));
static BLURAY_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(blu[- ]?ray|bdrip|brrip|bd25|bd50)\b"));
static WEBDL_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(web[- ]?dl|web)\b"));
static WEBRIP_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bweb[- ]?rip\b"));
static HDTV_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(hdtv|pdtv|sdtv)\b"));
static DVD_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(dvd|dvdrip|dvd5|dvd9)\b"));
static CAM_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(cam|camrip|hdcam|hdts|telesync|telecine)\b"));

// HDR layers are a set; every matching family is recorded.
static DV_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(dv|dovi|dolby[ ]?vision)\b"));
static HDR10PLUS_RE: Lazy<Regex> = Lazy::new(|| ci(r"hdr10\+|\bhdr10plus\b"));
static HDR10_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bhdr10\b"));
static HDR_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bhdr\b"));
static HLG_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bhlg\b"));

static X265_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b([xh] ?265|hevc)\b"));
static X264_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b([xh] ?264|avc)\b"));
static XVID_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bxvid\b"));

// Audio, most-specific first: atmos, truehd, dtsx, dtshd, dts, ddplus,
// dd, flac, aac, mp3.
static ATMOS_RE: Lazy<Regex> = Lazy::new(|| ci(r"\batmos\b"));
static TRUEHD_RE: Lazy<Regex> = Lazy::new(|| ci(r"\btrue[- ]?hd\b"));
static DTSX_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bdts[- ]?x\b"));
static DTSHD_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bdts[- ]?hd( ?(ma|hra|hr))?\b"));
static DTS_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bdts\b"));
static DDPLUS_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(ddp|dd\+|eac3|e[- ]?ac[- ]?3)"));
static DD_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(dd[0-9]|dd\b|ac3\b)"));
static FLAC_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bflac\b"));
static AAC_RE: Lazy<Regex> = Lazy::new(|| ci(r"\baac\b"));
static MP3_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bmp3\b"));

static CHANNELS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([1-9])[ .]([01])\b").unwrap());

static SEASON_EPISODE_RE: Lazy<Regex> =
    Lazy::new(|| ci(r"\bS(\d{1,2}) ?E(\d{1,3})(?:-?E?(\d{1,3}))?\b"));
static SEASON_PACK_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(?:S(\d{1,2})|Season (\d{1,2}))\b"));

static DAILY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})[ -](\d{2})[ -](\d{2})\b").unwrap());

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

static PROPER_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bproper\b"));
static REPACK_RE: Lazy<Regex> = Lazy::new(|| ci(r"\brepack\b"));
// REAL is only meaningful uppercase; "Real Steel" is a title, not a flag.
static REAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bREAL\b").unwrap());

static EDITION_RE: Lazy<Regex> = Lazy::new(|| {
    ci(r"\b(extended|director'?s cut|unrated|theatrical|imax|remastered|special edition|criterion)\b")
});

static HARDSUB_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(hc|hardsub(bed)?|korsub)\b"));
static UPSCALED_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bupscaled?\b"));
static SAMPLE_RE: Lazy<Regex> = Lazy::new(|| ci(r"\bsample\b"));
static THREED_RE: Lazy<Regex> = Lazy::new(|| ci(r"\b(3d|hsbs|half[- ]?sbs|sbs)\b"));

/// Everything that terminates the title portion of a release name.
static TITLE_CUT_RE: Lazy<Regex> = Lazy::new(|| {
    ci(
        r"\b(19\d{2}|20\d{2})\b|\bS\d{1,2}(?: ?E\d{1,3})?\b|\bSeason \d{1,2}\b|\b(2160p|1080p|720p|576p|480p|4k|uhd|remux|blu[- ]?ray|bdrip|brrip|web[- ]?dl|web[- ]?rip|hdtv|pdtv|sdtv|dvdrip|dvd|hdcam|telesync|[xh] ?26[45]|hevc|xvid)\b",
    )
});

/// Parse a release name into its structured attributes.
pub fn parse_release(name: &str) -> ParsedRelease {
    let raw = name.trim();
    let no_ext = EXTENSION_RE.replace(raw, "").into_owned();

    // Canonicalise separators: dots and underscores become spaces, dashes
    // survive so the trailing group marker stays intact.
    let canonical = no_ext
        .replace(['.', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut parsed = ParsedRelease::default();

    // Release group: last `-GROUP` token.
    if let Some(caps) = GROUP_RE.captures(&canonical) {
        let group = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if !GROUP_DENYLIST.contains(&group.to_lowercase().as_str()) {
            parsed.release_group = Some(group.to_string());
        }
    }

    // Daily date before the plain year so `2024 01 15` is not read as a year
    // token alone.
    if let Some(caps) = DAILY_RE.captures(&canonical) {
        let year: i32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let day: u32 = caps[3].parse().unwrap_or(0);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            parsed.is_daily = true;
            parsed.air_date = Some(date);
        }
    }

    if let Some(caps) = SEASON_EPISODE_RE.captures(&canonical) {
        parsed.season = caps.get(1).and_then(|m| m.as_str().parse().ok());
        parsed.episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
        parsed.episode_end = caps.get(3).and_then(|m| m.as_str().parse().ok());
    } else if !parsed.is_daily {
        if let Some(caps) = SEASON_PACK_RE.captures(&canonical) {
            let season = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse().ok());
            if season.is_some() {
                parsed.season = season;
                parsed.is_season_pack = true;
            }
        }
    }

    // Year: the last candidate not belonging to the daily date.
    let daily_span = if parsed.is_daily {
        DAILY_RE.find(&canonical).map(|m| (m.start(), m.end()))
    } else {
        None
    };
    for m in YEAR_RE.find_iter(&canonical) {
        if let Some((start, end)) = daily_span {
            if m.start() >= start && m.end() <= end {
                continue;
            }
        }
        parsed.year = m.as_str().parse().ok();
    }

    parsed.resolution = RESOLUTION_RE
        .captures(&canonical)
        .and_then(|caps| match caps[1].to_lowercase().as_str() {
            "2160p" | "4k" | "uhd" => Some(Resolution::R2160p),
            "1080p" => Some(Resolution::R1080p),
            "720p" => Some(Resolution::R720p),
            "576p" => Some(Resolution::R576p),
            "480p" => Some(Resolution::R480p),
            _ => None,
        });

    parsed.source = if REMUX_RE.is_match(&canonical) {
        Some(Source::Remux)
    } else if BLURAY_RE.is_match(&canonical) {
        Some(Source::Bluray)
    } else if WEBRIP_RE.is_match(&canonical) {
        // WEBRip is checked ahead of the bare `web` fallback below.
        Some(Source::WebRip)
    } else if WEBDL_RE.is_match(&canonical) {
        Some(Source::WebDl)
    } else if HDTV_RE.is_match(&canonical) {
        Some(Source::Hdtv)
    } else if DVD_RE.is_match(&canonical) {
        Some(Source::Dvd)
    } else if CAM_RE.is_match(&canonical) {
        Some(Source::Cam)
    } else {
        None
    };

    if DV_RE.is_match(&canonical) {
        parsed.hdr.insert(HdrFormat::DolbyVision);
    }
    if HDR10PLUS_RE.is_match(&canonical) {
        parsed.hdr.insert(HdrFormat::Hdr10Plus);
    } else if HDR10_RE.is_match(&canonical) {
        parsed.hdr.insert(HdrFormat::Hdr10);
    } else if HDR_RE.is_match(&canonical) {
        parsed.hdr.insert(HdrFormat::Hdr);
    }
    if HLG_RE.is_match(&canonical) {
        parsed.hdr.insert(HdrFormat::Hlg);
    }

    parsed.codec = if X265_RE.is_match(&canonical) {
        Some(Codec::X265)
    } else if X264_RE.is_match(&canonical) {
        Some(Codec::X264)
    } else if XVID_RE.is_match(&canonical) {
        Some(Codec::Xvid)
    } else {
        None
    };

    parsed.atmos = ATMOS_RE.is_match(&canonical);
    parsed.audio = if TRUEHD_RE.is_match(&canonical) {
        Some(AudioCodec::TrueHd)
    } else if DTSX_RE.is_match(&canonical) {
        Some(AudioCodec::DtsX)
    } else if DTSHD_RE.is_match(&canonical) {
        Some(AudioCodec::DtsHd)
    } else if DTS_RE.is_match(&canonical) {
        Some(AudioCodec::Dts)
    } else if DDPLUS_RE.is_match(&canonical) {
        Some(AudioCodec::DdPlus)
    } else if DD_RE.is_match(&canonical) {
        Some(AudioCodec::Dd)
    } else if FLAC_RE.is_match(&canonical) {
        Some(AudioCodec::Flac)
    } else if AAC_RE.is_match(&canonical) {
        Some(AudioCodec::Aac)
    } else if MP3_RE.is_match(&canonical) {
        Some(AudioCodec::Mp3)
    } else {
        None
    };

    parsed.channels = CHANNELS_RE
        .captures(&canonical)
        .map(|caps| format!("{}.{}", &caps[1], &caps[2]));

    parsed.proper = PROPER_RE.is_match(&canonical);
    parsed.repack = REPACK_RE.is_match(&canonical);
    parsed.real = REAL_RE.is_match(&canonical);

    parsed.edition = EDITION_RE
        .captures(&canonical)
        .map(|caps| caps[1].to_string());

    if HARDSUB_RE.is_match(&canonical) {
        parsed.warnings.insert(ReleaseWarning::HardcodedSubs);
    }
    if UPSCALED_RE.is_match(&canonical) {
        parsed.warnings.insert(ReleaseWarning::Upscaled);
    }
    if SAMPLE_RE.is_match(&canonical) {
        parsed.warnings.insert(ReleaseWarning::Sample);
    }
    if THREED_RE.is_match(&canonical) {
        parsed.warnings.insert(ReleaseWarning::ThreeD);
    }
    if parsed.audio == Some(AudioCodec::Mp3) {
        parsed.warnings.insert(ReleaseWarning::CompressedAudio);
    }

    parsed.title = extract_title(&canonical);

    parsed
}

/// The title is everything before the first year, season/episode or quality
/// token.
fn extract_title(canonical: &str) -> String {
    let cut = TITLE_CUT_RE
        .find(canonical)
        .map(|m| m.start())
        .unwrap_or(canonical.len());

    let head = &canonical[..cut];
    // Drop a trailing group marker when nothing cut the title earlier.
    let head = match GROUP_RE.find(head) {
        Some(m) => &head[..m.start()],
        None => head,
    };

    head.trim_matches(|c: char| c == ' ' || c == '-')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::models::{AudioCodec, Codec, HdrFormat, Resolution, Source};

    #[test]
    fn parses_uhd_remux_with_layered_hdr() {
        let parsed = parse_release(
            "The.Matrix.1999.2160p.UHD.BluRay.REMUX.HDR.DV.TrueHD.Atmos.7.1-FraMeSToR",
        );

        assert_eq!(parsed.title, "The Matrix");
        assert_eq!(parsed.year, Some(1999));
        assert_eq!(parsed.resolution, Some(Resolution::R2160p));
        assert_eq!(parsed.source, Some(Source::Remux));
        assert!(parsed.hdr.contains(&HdrFormat::DolbyVision));
        assert!(
            parsed.hdr.contains(&HdrFormat::Hdr) || parsed.hdr.contains(&HdrFormat::Hdr10)
        );
        assert_eq!(parsed.audio, Some(AudioCodec::TrueHd));
        assert!(parsed.atmos);
        assert_eq!(parsed.channels.as_deref(), Some("7.1"));
        assert_eq!(parsed.release_group.as_deref(), Some("FraMeSToR"));
        assert!(parsed.codec.is_none());
    }

    #[test]
    fn parses_episode_webdl() {
        let parsed = parse_release("Show.Name.S02E05.1080p.WEB-DL.DDP5.1.H.264-NTb");

        assert_eq!(parsed.title, "Show Name");
        assert_eq!(parsed.season, Some(2));
        assert_eq!(parsed.episode, Some(5));
        assert_eq!(parsed.resolution, Some(Resolution::R1080p));
        assert_eq!(parsed.source, Some(Source::WebDl));
        assert_eq!(parsed.audio, Some(AudioCodec::DdPlus));
        assert_eq!(parsed.channels.as_deref(), Some("5.1"));
        assert_eq!(parsed.codec, Some(Codec::X264));
        assert_eq!(parsed.release_group.as_deref(), Some("NTb"));
    }

    #[test]
    fn parses_multi_episode_span() {
        let parsed = parse_release("Show.Name.S01E03-E05.720p.HDTV.x264-GRP");

        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episode, Some(3));
        assert_eq!(parsed.episode_end, Some(5));
        assert!(!parsed.is_season_pack);
    }

    #[test]
    fn parses_season_pack() {
        let parsed = parse_release("Show.Name.S03.1080p.BluRay.x265-GRP");

        assert_eq!(parsed.season, Some(3));
        assert!(parsed.episode.is_none());
        assert!(parsed.is_season_pack);
        assert_eq!(parsed.source, Some(Source::Bluray));
        assert_eq!(parsed.codec, Some(Codec::X265));
    }

    #[test]
    fn parses_daily_show_dates() {
        for name in [
            "Late.Show.2024.01.15.720p.HDTV.x264-GRP",
            "Late.Show.2024-01-15.720p.HDTV.x264-GRP",
        ] {
            let parsed = parse_release(name);
            assert!(parsed.is_daily, "{name}");
            assert_eq!(
                parsed.air_date,
                NaiveDate::from_ymd_opt(2024, 1, 15),
                "{name}"
            );
            assert_eq!(parsed.title, "Late Show", "{name}");
        }
    }

    #[test]
    fn invalid_daily_date_is_not_daily() {
        let parsed = parse_release("Show.2024.13.45.720p.HDTV-GRP");
        assert!(!parsed.is_daily);
        assert!(parsed.air_date.is_none());
    }

    #[test]
    fn source_priority_prefers_remux_over_bluray() {
        let parsed = parse_release("Movie.2020.1080p.BluRay.Remux.AVC-GRP");
        assert_eq!(parsed.source, Some(Source::Remux));
    }

    #[test]
    fn webrip_is_not_mistaken_for_webdl() {
        let parsed = parse_release("Movie.2020.1080p.WEBRip.x264-GRP");
        assert_eq!(parsed.source, Some(Source::WebRip));

        let parsed = parse_release("Movie.2020.1080p.WEB.x264-GRP");
        assert_eq!(parsed.source, Some(Source::WebDl));
    }

    #[test]
    fn proper_and_repack_flags() {
        let parsed = parse_release("Movie.2020.PROPER.1080p.BluRay.x264-GRP");
        assert!(parsed.proper);

        let parsed = parse_release("Movie.2020.REPACK.1080p.BluRay.x264-GRP");
        assert!(parsed.repack);
    }

    #[test]
    fn warning_flags_are_detected() {
        let parsed = parse_release("Movie.2020.1080p.HC.WEBRip.x264-GRP");
        assert!(parsed.warnings.contains(&ReleaseWarning::HardcodedSubs));

        let parsed = parse_release("Movie.2020.3D.HSBS.1080p.BluRay-GRP");
        assert!(parsed.warnings.contains(&ReleaseWarning::ThreeD));

        let parsed = parse_release("Movie.2020.1080p.WEBRip.MP3-GRP");
        assert!(parsed.warnings.contains(&ReleaseWarning::CompressedAudio));
    }

    #[test]
    fn unrecognised_pieces_stay_empty() {
        let parsed = parse_release("Some Random Words");
        assert_eq!(parsed.title, "Some Random Words");
        assert!(parsed.year.is_none());
        assert!(parsed.resolution.is_none());
        assert!(parsed.source.is_none());
        assert!(parsed.release_group.is_none());
    }

    #[test]
    fn file_extension_is_ignored() {
        let parsed = parse_release("Movie.2020.1080p.BluRay.x264-GRP.mkv");
        assert_eq!(parsed.release_group.as_deref(), Some("GRP"));
        assert_eq!(parsed.year, Some(2020));
    }

    #[test]
    fn edition_is_captured() {
        let parsed = parse_release("Movie.2020.EXTENDED.1080p.BluRay.x264-GRP");
        assert_eq!(parsed.edition.as_deref().map(str::to_lowercase), Some("extended".into()));
    }

    #[test]
    fn parser_is_deterministic() {
        let name = "The.Matrix.1999.2160p.UHD.BluRay.REMUX.HDR.DV.TrueHD.Atmos.7.1-FraMeSToR";
        assert_eq!(parse_release(name), parse_release(name));
    }
}
