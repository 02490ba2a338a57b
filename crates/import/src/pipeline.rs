//! Import pipeline
//!
//! Takes a completed download's save path, finds the main video, renames
//! it per the naming templates and moves it (with extras and subtitles)
//! into the target library. Moves are rename-first with a copy-then-delete
//! fallback for cross-device paths, and already-completed moves are rolled
//! back if a later one fails.

use crate::file_scanner::{ClassifiedFile, FileScanner};
use crate::naming::{expand_template, sanitize_filename, select_templates, TemplateValues};
use outpost_core::models::{FormatSettings, MediaKind, NamingSettings, ParsedRelease};
use outpost_core::{OutpostError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// One import destination root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub kind: MediaKind,
    pub root: PathBuf,
}

/// What the importer is asked to do for one completed download.
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub media_kind: MediaKind,
    /// Catalog title of the matched wanted item; falls back to the parsed
    /// release title.
    pub title: String,
    pub year: Option<i32>,
    pub parsed: ParsedRelease,
    pub save_path: PathBuf,
}

/// A single completed file move.
#[derive(Debug, Clone)]
pub struct MovedFile {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Result of a successful import.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub main_dest: PathBuf,
    pub dest_folder: PathBuf,
    pub moved: Vec<MovedFile>,
}

pub struct Importer {
    naming: NamingSettings,
    libraries: Vec<Library>,
    scanner: FileScanner,
}

impl Importer {
    pub fn new(naming: NamingSettings, format: FormatSettings, libraries: Vec<Library>) -> Self {
        Self {
            naming,
            libraries,
            scanner: FileScanner::new(format),
        }
    }

    /// The library a media kind imports into, falling back to the first
    /// configured library.
    fn target_library(&self, kind: MediaKind) -> Result<&Library> {
        self.libraries
            .iter()
            .find(|l| l.kind == kind)
            .or_else(|| self.libraries.first())
            .ok_or(OutpostError::NotConfigured {
                what: "library".to_string(),
                message: "no library".to_string(),
            })
    }

    /// Run the full import for one job.
    #[instrument(skip(self, job), fields(save_path = %job.save_path.display()))]
    pub async fn import(&self, job: &ImportJob) -> Result<ImportOutcome> {
        let scanned = self.scanner.scan(&job.save_path).await?;
        let main = scanned
            .main_video()
            .cloned()
            .ok_or_else(|| OutpostError::ImportNoVideo {
                path: job.save_path.display().to_string(),
            })?;

        let library = self.target_library(job.media_kind)?;
        let templates = select_templates(&self.naming, job.media_kind, &job.parsed);
        let values = TemplateValues::new(job.title.clone(), job.year, &job.parsed);

        let folder = sanitize_filename(&expand_template(&templates.folder, &values));
        let file_stem = sanitize_filename(&expand_template(&templates.file, &values));
        if folder.is_empty() || file_stem.is_empty() {
            return Err(OutpostError::ValidationError {
                field: "naming".to_string(),
                message: "template expansion produced an empty name".to_string(),
            });
        }

        let dest_folder = library.root.join(&folder);
        let main_ext = main
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mkv")
            .to_lowercase();
        let main_dest = dest_folder.join(format!("{}.{}", file_stem, main_ext));

        if path_exists(&main_dest).await {
            return Err(OutpostError::ImportPathCollision {
                path: main_dest.display().to_string(),
            });
        }

        create_dir_all(&dest_folder).await?;

        let mut moved: Vec<MovedFile> = Vec::new();
        if let Err(e) = self
            .move_all(&main, &scanned.subtitles, &scanned.extras, &dest_folder, &file_stem, &main_ext, &mut moved)
            .await
        {
            self.rollback(&moved).await;
            return Err(e);
        }

        cleanup_empty_dirs(&job.save_path).await;

        info!(
            dest = %main_dest.display(),
            files = moved.len(),
            "import completed"
        );

        Ok(ImportOutcome {
            main_dest,
            dest_folder,
            moved,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn move_all(
        &self,
        main: &ClassifiedFile,
        subtitles: &[ClassifiedFile],
        extras: &[ClassifiedFile],
        dest_folder: &Path,
        file_stem: &str,
        main_ext: &str,
        moved: &mut Vec<MovedFile>,
    ) -> Result<()> {
        let main_dest = dest_folder.join(format!("{}.{}", file_stem, main_ext));
        move_file(&main.path, &main_dest).await?;
        moved.push(MovedFile {
            source: main.path.clone(),
            dest: main_dest,
        });

        for subtitle in subtitles {
            let ext = subtitle
                .path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("srt")
                .to_lowercase();
            let name = match infer_subtitle_language(&subtitle.path) {
                Some(lang) => format!("{}.{}.{}", file_stem, lang, ext),
                None => format!("{}.{}", file_stem, ext),
            };
            let dest = dest_folder.join(name);
            if path_exists(&dest).await {
                debug!(dest = %dest.display(), "subtitle destination taken, skipping");
                continue;
            }
            move_file(&subtitle.path, &dest).await?;
            moved.push(MovedFile {
                source: subtitle.path.clone(),
                dest,
            });
        }

        if !extras.is_empty() {
            let extras_dir = dest_folder.join("Extras");
            create_dir_all(&extras_dir).await?;
            for extra in extras {
                let Some(name) = extra.path.file_name() else {
                    continue;
                };
                let dest = extras_dir.join(name);
                if path_exists(&dest).await {
                    continue;
                }
                move_file(&extra.path, &dest).await?;
                moved.push(MovedFile {
                    source: extra.path.clone(),
                    dest,
                });
            }
        }

        Ok(())
    }

    /// Undo completed moves after a mid-import failure so a retry starts
    /// from a clean save path.
    async fn rollback(&self, moved: &[MovedFile]) {
        for m in moved.iter().rev() {
            if let Err(e) = fs::rename(&m.dest, &m.source).await {
                warn!(
                    source = %m.source.display(),
                    dest = %m.dest.display(),
                    error = %e,
                    "rollback move failed"
                );
            }
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

async fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| OutpostError::FilesystemIO {
            path: path.display().to_string(),
            error: e.to_string(),
        })
}

/// Move one file: rename on the same device, copy-then-delete across
/// devices.
async fn move_file(source: &Path, dest: &Path) -> Result<()> {
    match fs::rename(source, dest).await {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(source, dest)
                .await
                .map_err(|e| OutpostError::FilesystemIO {
                    path: dest.display().to_string(),
                    error: e.to_string(),
                })?;
            fs::remove_file(source)
                .await
                .map_err(|e| OutpostError::FilesystemIO {
                    path: source.display().to_string(),
                    error: e.to_string(),
                })
        }
    }
}

/// Infer a subtitle language suffix from the file name (`.en`, `.es`,
/// `.fr`). No suffix when nothing recognisable is present.
fn infer_subtitle_language(path: &Path) -> Option<&'static str> {
    let stem = path.file_stem()?.to_str()?.to_lowercase();
    for lang in ["en", "es", "fr"] {
        if stem.ends_with(&format!(".{}", lang)) {
            return Some(match lang {
                "en" => "en",
                "es" => "es",
                _ => "fr",
            });
        }
    }
    None
}

/// Remove now-empty directories left behind under the source tree.
async fn cleanup_empty_dirs(root: &Path) {
    let Ok(metadata) = fs::metadata(root).await else {
        return;
    };
    if !metadata.is_dir() {
        return;
    }
    remove_if_empty(root).await;
}

fn remove_if_empty(path: &Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
    Box::pin(async move {
        let Ok(mut entries) = fs::read_dir(path).await else {
            return false;
        };
        let mut empty = true;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let child = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && remove_if_empty(&child).await {
                continue;
            }
            empty = false;
        }
        if empty {
            let _ = fs::remove_dir(path).await;
        }
        empty
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn touch(path: &Path, size: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, vec![1u8; size]).await.unwrap();
    }

    fn movie_libraries(tmp: &TempDir) -> Vec<Library> {
        vec![
            Library {
                name: "movies".to_string(),
                kind: MediaKind::Movie,
                root: tmp.path().join("media/movies"),
            },
            Library {
                name: "tv".to_string(),
                kind: MediaKind::Show,
                root: tmp.path().join("media/tv"),
            },
        ]
    }

    fn importer(tmp: &TempDir) -> Importer {
        Importer::new(
            NamingSettings::default(),
            FormatSettings::default(),
            movie_libraries(tmp),
        )
    }

    fn movie_job(save_path: PathBuf) -> ImportJob {
        ImportJob {
            media_kind: MediaKind::Movie,
            title: "The Matrix".to_string(),
            year: Some(1999),
            parsed: ParsedRelease::default(),
            save_path,
        }
    }

    #[tokio::test]
    async fn imports_main_file_extras_and_subtitles() {
        let tmp = TempDir::new().unwrap();
        let save = tmp.path().join("downloads/Matrix.1999");

        touch(&save.join("Matrix.1999.mkv"), 9000).await;
        touch(&save.join("Matrix.1999.en.srt"), 10).await;
        touch(&save.join("Extras/Deleted Scenes.mkv"), 100).await;
        touch(&save.join("Extras/Making Of.mkv"), 100).await;

        let outcome = importer(&tmp).import(&movie_job(save.clone())).await.unwrap();

        let dest_root = tmp.path().join("media/movies/The Matrix (1999)");
        assert_eq!(outcome.main_dest, dest_root.join("The Matrix (1999).mkv"));
        assert!(path_exists(&outcome.main_dest).await);
        assert!(path_exists(&dest_root.join("The Matrix (1999).en.srt")).await);
        assert!(path_exists(&dest_root.join("Extras/Deleted Scenes.mkv")).await);
        assert!(path_exists(&dest_root.join("Extras/Making Of.mkv")).await);

        // Source files are gone and the emptied tree cleaned up.
        assert!(!path_exists(&save.join("Matrix.1999.mkv")).await);
        assert!(!path_exists(&save).await);
    }

    #[tokio::test]
    async fn no_video_is_a_specific_error() {
        let tmp = TempDir::new().unwrap();
        let save = tmp.path().join("downloads/empty");
        fs::create_dir_all(&save).await.unwrap();

        let err = importer(&tmp).import(&movie_job(save)).await.unwrap_err();
        assert!(matches!(err, OutpostError::ImportNoVideo { .. }));
    }

    #[tokio::test]
    async fn no_libraries_is_not_configured() {
        let tmp = TempDir::new().unwrap();
        let save = tmp.path().join("downloads/Matrix.1999");
        touch(&save.join("Matrix.1999.mkv"), 100).await;

        let importer = Importer::new(
            NamingSettings::default(),
            FormatSettings::default(),
            Vec::new(),
        );
        let err = importer.import(&movie_job(save)).await.unwrap_err();
        assert!(matches!(err, OutpostError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn destination_collision_is_refused() {
        let tmp = TempDir::new().unwrap();
        let save = tmp.path().join("downloads/Matrix.1999");
        touch(&save.join("Matrix.1999.mkv"), 100).await;

        // Pre-existing import at the destination.
        touch(
            &tmp.path()
                .join("media/movies/The Matrix (1999)/The Matrix (1999).mkv"),
            50,
        )
        .await;

        let err = importer(&tmp).import(&movie_job(save.clone())).await.unwrap_err();
        assert!(matches!(err, OutpostError::ImportPathCollision { .. }));
        // Source untouched.
        assert!(path_exists(&save.join("Matrix.1999.mkv")).await);
    }

    #[tokio::test]
    async fn show_imports_use_episode_naming() {
        let tmp = TempDir::new().unwrap();
        let save = tmp.path().join("downloads/Show.S02E05");
        touch(&save.join("Show.Name.S02E05.1080p.mkv"), 500).await;

        let mut parsed = ParsedRelease::default();
        parsed.season = Some(2);
        parsed.episode = Some(5);

        let job = ImportJob {
            media_kind: MediaKind::Show,
            title: "Show Name".to_string(),
            year: None,
            parsed,
            save_path: save,
        };

        let outcome = importer(&tmp).import(&job).await.unwrap();
        assert_eq!(
            outcome.main_dest,
            tmp.path()
                .join("media/tv/Show Name/Show Name - S02E05.mkv")
        );
    }
}
