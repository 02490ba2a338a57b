//! Outpost acquisition core
//!
//! The coordinator that turns a wanted item into files in the library:
//! release selection over the indexer gateway, the download tracker and
//! its state machine, the import hand-off, the request lifecycle and the
//! scheduler loops driving it all.

pub mod import_service;
pub mod lifecycle;
pub mod scheduler;
pub mod selector;
pub mod tracker;

pub use import_service::ImportService;
pub use lifecycle::{AutoApprovalRules, RequestLifecycle};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use selector::{ReleaseSelector, SelectionOutcome, SelectorConfig};
pub use tracker::{DownloadTracker, ReconcileSummary, TrackerConfig};
