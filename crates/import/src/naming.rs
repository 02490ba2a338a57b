//! Naming template expansion and filename sanitisation
//!
//! Templates carry `{Title}`, `{Year}`, `{Season:00}`, `{Episode:00}` and
//! `{AirDate}` placeholders. Each placeholder is substituted exactly once;
//! a missing year drops the whole `({Year})` group rather than leaving
//! empty parentheses behind.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use outpost_core::models::{MediaKind, NamingSettings, ParsedRelease};
use regex::Regex;

/// Values available to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateValues {
    pub title: String,
    pub year: Option<i32>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub air_date: Option<NaiveDate>,
}

impl TemplateValues {
    /// Build template values for a wanted title, preferring the catalog
    /// title over whatever the release name parsed to.
    pub fn new(title: impl Into<String>, year: Option<i32>, parsed: &ParsedRelease) -> Self {
        Self {
            title: title.into(),
            year: year.or(parsed.year).filter(|&y| y != 0),
            season: parsed.season,
            episode: parsed.episode,
            air_date: parsed.air_date,
        }
    }
}

static YEAR_GROUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" ?\(\{Year\}\)").unwrap());

/// Expand a template against the values. Single substitution per
/// placeholder occurrence.
pub fn expand_template(template: &str, values: &TemplateValues) -> String {
    let mut out = template.to_string();

    match values.year {
        Some(year) => {
            out = out.replacen("{Year}", &year.to_string(), 1);
        }
        None => {
            // Drop "({Year})" with its surrounding space, then any bare token.
            out = YEAR_GROUP_RE.replace(&out, "").into_owned();
            out = out.replacen("{Year}", "", 1);
        }
    }

    out = out.replacen("{Title}", &values.title, 1);
    out = out.replacen(
        "{Season:00}",
        &format!("{:02}", values.season.unwrap_or(0)),
        1,
    );
    out = out.replacen(
        "{Episode:00}",
        &format!("{:02}", values.episode.unwrap_or(0)),
        1,
    );
    if let Some(date) = values.air_date {
        out = out.replacen("{AirDate}", &date.format("%Y-%m-%d").to_string(), 1);
    } else {
        out = out.replacen("{AirDate}", "", 1);
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip characters that are unsafe in file names: `/ \ : * ? " < > |`.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => {}
            ':' => out.push_str(" -"),
            _ => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Folder and file templates applicable to one import.
#[derive(Debug, Clone)]
pub struct SelectedTemplates {
    pub folder: String,
    pub file: String,
}

/// Pick the naming templates for a media kind, switching to the daily
/// template when the release parsed as a dated episode.
pub fn select_templates(
    settings: &NamingSettings,
    kind: MediaKind,
    parsed: &ParsedRelease,
) -> SelectedTemplates {
    match kind {
        MediaKind::Movie => SelectedTemplates {
            folder: settings.movie_folder.clone(),
            file: settings.movie_file.clone(),
        },
        MediaKind::Show => SelectedTemplates {
            folder: settings.tv_folder.clone(),
            file: if parsed.is_daily {
                settings.daily_file.clone()
            } else {
                settings.tv_file.clone()
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_template_expands_title_and_year() {
        let values = TemplateValues {
            title: "The Matrix".to_string(),
            year: Some(1999),
            ..Default::default()
        };
        assert_eq!(
            expand_template("{Title} ({Year})", &values),
            "The Matrix (1999)"
        );
    }

    #[test]
    fn missing_year_drops_the_parenthesised_group() {
        let values = TemplateValues {
            title: "Unknown Film".to_string(),
            year: None,
            ..Default::default()
        };
        assert_eq!(expand_template("{Title} ({Year})", &values), "Unknown Film");
    }

    #[test]
    fn substitution_happens_once() {
        let values = TemplateValues {
            title: "Movie {Year}".to_string(),
            year: Some(2020),
            ..Default::default()
        };
        // The year substitutes before the title, so a year-like token inside
        // the title text survives untouched.
        assert_eq!(
            expand_template("{Title} ({Year})", &values),
            "Movie {Year} (2020)"
        );
    }

    #[test]
    fn episode_template_pads_numbers() {
        let values = TemplateValues {
            title: "Show Name".to_string(),
            season: Some(2),
            episode: Some(5),
            ..Default::default()
        };
        assert_eq!(
            expand_template("{Title} - S{Season:00}E{Episode:00}", &values),
            "Show Name - S02E05"
        );
    }

    #[test]
    fn daily_template_uses_air_date() {
        let values = TemplateValues {
            title: "Late Show".to_string(),
            air_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            ..Default::default()
        };
        assert_eq!(
            expand_template("{Title} - {AirDate}", &values),
            "Late Show - 2024-01-15"
        );
    }

    #[test]
    fn sanitisation_strips_unsafe_characters() {
        assert_eq!(sanitize_filename("Alien: Covenant"), "Alien - Covenant");
        assert_eq!(sanitize_filename("What If...?"), "What If...");
        assert_eq!(sanitize_filename(r#"A/B\C*D"E<F>G|H"#), "ABCDEFGH");
    }

    #[test]
    fn daily_parses_pick_the_daily_template() {
        let settings = NamingSettings::default();
        let mut parsed = ParsedRelease::default();

        let regular = select_templates(&settings, MediaKind::Show, &parsed);
        assert_eq!(regular.file, settings.tv_file);

        parsed.is_daily = true;
        let daily = select_templates(&settings, MediaKind::Show, &parsed);
        assert_eq!(daily.file, settings.daily_file);
    }
}
