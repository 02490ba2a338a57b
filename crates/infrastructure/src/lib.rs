//! Outpost infrastructure
//!
//! SQLite persistence for the acquisition core's repositories, plus the
//! disk probe and dependency health checks.

pub mod database;
pub mod monitoring;
pub mod repositories;

pub use database::{create_pool, create_test_pool, DatabasePool};
pub use monitoring::{HealthService, SysinfoDiskProbe};
pub use repositories::{
    SqliteBlocklistRepository, SqliteDownloadRepository, SqliteHistoryRepository,
    SqlitePendingGrabRepository, SqliteProfileRepository, SqliteRequestRepository,
    SqliteSettingsRepository, SqliteWantedRepository,
};
