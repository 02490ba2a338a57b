//! Persisted operator settings consumed by the acquisition core

use serde::{Deserialize, Serialize};

/// Container and keyword rules applied when filtering releases and files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatSettings {
    /// File containers accepted for import.
    pub accepted_containers: Vec<String>,
    /// A release or file name containing any of these is refused.
    pub rejected_keywords: Vec<String>,
    /// Whether failures feed the automatic blocklist.
    pub auto_blocklist: bool,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            accepted_containers: [
                "mkv", "mp4", "avi", "mov", "webm", "m4v", "ts", "m2ts",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rejected_keywords: [
                "bdmv", "iso", "rar", "cam", "hdts", "hdcam", "telesync", "telecine", "sample",
                "3d", "hsbs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            auto_blocklist: true,
        }
    }
}

impl FormatSettings {
    /// Case-insensitive rejected-keyword test over a name.
    pub fn rejects(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        self.rejected_keywords
            .iter()
            .find(|kw| lower.contains(kw.as_str()))
            .map(|s| s.as_str())
    }

    pub fn accepts_container(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.accepted_containers.iter().any(|c| c == &ext)
    }
}

/// Per-kind folder and file naming templates.
///
/// Placeholders: `{Title}`, `{Year}`, `{Season:00}`, `{Episode:00}`,
/// `{AirDate}`. A zero/absent year drops the `({Year})` group entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingSettings {
    pub movie_folder: String,
    pub movie_file: String,
    pub tv_folder: String,
    pub tv_file: String,
    pub daily_file: String,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            movie_folder: "{Title} ({Year})".to_string(),
            movie_file: "{Title} ({Year})".to_string(),
            tv_folder: "{Title}".to_string(),
            tv_file: "{Title} - S{Season:00}E{Episode:00}".to_string(),
            daily_file: "{Title} - {AirDate}".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_settings_match_known_containers() {
        let settings = FormatSettings::default();
        assert!(settings.accepts_container("mkv"));
        assert!(settings.accepts_container(".MP4"));
        assert!(!settings.accepts_container("iso"));
    }

    #[test]
    fn rejected_keywords_are_case_insensitive() {
        let settings = FormatSettings::default();
        // "cam" precedes "hdcam" in the keyword list and matches first.
        assert_eq!(settings.rejects("Movie.2023.HDCAM.x264-BAD"), Some("cam"));
        assert_eq!(settings.rejects("Movie.2023.BDMV"), Some("bdmv"));
        assert!(settings.rejects("Movie.2023.1080p.BluRay-GOOD").is_none());
    }
}
