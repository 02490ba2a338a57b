//! SQLite implementations of the core repository traits

mod blocklist;
mod download;
mod history;
mod pending;
mod profile;
mod request;
mod settings;
mod wanted;

pub use blocklist::SqliteBlocklistRepository;
pub use download::SqliteDownloadRepository;
pub use history::SqliteHistoryRepository;
pub use pending::SqlitePendingGrabRepository;
pub use profile::SqliteProfileRepository;
pub use request::SqliteRequestRepository;
pub use settings::SqliteSettingsRepository;
pub use wanted::SqliteWantedRepository;

use outpost_core::{OutpostError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;

/// Decode a stored enum string.
pub(crate) fn parse_enum<T>(value: &str, what: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(|e: String| OutpostError::DatabaseError {
        message: format!("bad {} column: {}", what, e),
    })
}

/// Decode a stored JSON column.
pub(crate) fn from_json<T: DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    serde_json::from_str(value).map_err(|e| OutpostError::DatabaseError {
        message: format!("bad {} column: {}", what, e),
    })
}

/// Encode a JSON column.
pub(crate) fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| OutpostError::DatabaseError {
        message: format!("cannot encode {}: {}", what, e),
    })
}
