//! Core domain models

pub mod download;
pub mod history;
pub mod media;
pub mod quality;
pub mod release;
pub mod request;
pub mod settings;

pub use download::{download_key, DownloadEvent, DownloadState, TrackedDownload};
pub use history::{BlocklistEntry, GroupFailure, ImportHistory, PendingGrab};
pub use media::{MediaKind, WantedItem};
pub use quality::{CustomFormat, FormatCondition, ParsedFlag, QualityProfile, QualityTier};
pub use release::{
    AudioCodec, Codec, HdrFormat, MatchedFormat, ParsedRelease, ReleaseOrigin, ReleaseProtocol,
    ReleaseWarning, Resolution, ScoredRelease, Source,
};
pub use request::{Request, RequestDownloadLink, RequestStatus};
pub use settings::{FormatSettings, NamingSettings};
