//! Save-path scanning and file classification
//!
//! Enumerates a completed download's directory recursively and buckets
//! every file into video, subtitle or extras, dropping junk per the
//! rejected-keyword list.

use once_cell::sync::Lazy;
use outpost_core::models::FormatSettings;
use outpost_core::{OutpostError, Result};
use regex::RegexBuilder;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::{debug, warn};

const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "sub", "idx", "ass", "ssa", "vtt"];

/// Extras markers, matched case-insensitively against any path component.
static EXTRAS_RE: Lazy<regex::Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r"\b(extras|featurettes|bonus|deleted scenes|behind the scenes|making of|interview|trailer|gag reel|bloopers)\b",
    )
    .case_insensitive(true)
    .build()
    .expect("static extras regex")
});

/// How a file participates in an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Video,
    Subtitle,
    Extra,
}

#[derive(Debug, Clone)]
pub struct ClassifiedFile {
    pub path: PathBuf,
    pub size: u64,
    pub class: FileClass,
}

/// Everything found under a save path, already classified.
#[derive(Debug, Clone, Default)]
pub struct ScannedFiles {
    pub videos: Vec<ClassifiedFile>,
    pub subtitles: Vec<ClassifiedFile>,
    pub extras: Vec<ClassifiedFile>,
}

impl ScannedFiles {
    /// The main file is the largest non-extra video.
    pub fn main_video(&self) -> Option<&ClassifiedFile> {
        self.videos.iter().max_by_key(|f| f.size)
    }
}

/// Whether any component of the path marks the file as extras content.
fn is_extra(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| EXTRAS_RE.is_match(s))
            .unwrap_or(false)
    })
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub struct FileScanner {
    settings: FormatSettings,
}

impl FileScanner {
    pub fn new(settings: FormatSettings) -> Self {
        Self { settings }
    }

    /// Scan a save path. A plain file is treated as a one-video download.
    pub async fn scan(&self, save_path: &Path) -> Result<ScannedFiles> {
        let metadata = fs::metadata(save_path)
            .await
            .map_err(|e| OutpostError::FilesystemIO {
                path: save_path.display().to_string(),
                error: e.to_string(),
            })?;

        let mut scanned = ScannedFiles::default();
        if metadata.is_file() {
            self.classify_into(save_path, metadata.len(), &mut scanned);
            return Ok(scanned);
        }

        self.scan_recursive(save_path, 0, &mut scanned).await?;
        debug!(
            videos = scanned.videos.len(),
            subtitles = scanned.subtitles.len(),
            extras = scanned.extras.len(),
            "save path scanned"
        );
        Ok(scanned)
    }

    fn scan_recursive<'a>(
        &'a self,
        path: &'a Path,
        depth: u8,
        scanned: &'a mut ScannedFiles,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if depth > 8 {
                return Ok(());
            }

            let mut entries = match fs::read_dir(path).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read directory");
                    return Ok(());
                }
            };

            while let Some(entry) =
                entries
                    .next_entry()
                    .await
                    .map_err(|e| OutpostError::FilesystemIO {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    })?
            {
                let entry_path = entry.path();
                let file_type =
                    entry
                        .file_type()
                        .await
                        .map_err(|e| OutpostError::FilesystemIO {
                            path: entry_path.display().to_string(),
                            error: e.to_string(),
                        })?;

                if file_type.is_dir() {
                    self.scan_recursive(&entry_path, depth + 1, scanned).await?;
                } else if file_type.is_file() {
                    let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                    self.classify_into(&entry_path, size, scanned);
                }
            }
            Ok(())
        })
    }

    fn classify_into(&self, path: &Path, size: u64, scanned: &mut ScannedFiles) {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if let Some(keyword) = self.settings.rejects(name) {
            debug!(file = name, keyword, "dropping junk file");
            return;
        }

        let ext = extension_of(path);
        let file = ClassifiedFile {
            path: path.to_path_buf(),
            size,
            class: FileClass::Video,
        };

        if SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
            scanned.subtitles.push(ClassifiedFile {
                class: FileClass::Subtitle,
                ..file
            });
        } else if self.settings.accepts_container(&ext) {
            if is_extra(path) {
                scanned.extras.push(ClassifiedFile {
                    class: FileClass::Extra,
                    ..file
                });
            } else {
                scanned.videos.push(file);
            }
        }
    }
}
