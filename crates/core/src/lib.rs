//! Core domain models and business logic for Outpost
//!
//! This crate contains the fundamental domain models, value objects,
//! and business rules of the acquisition core: the download and request
//! state machines, quality profiles and custom formats, the blocklist,
//! and the repository traits the infrastructure crate implements.

pub mod backpressure;
pub mod blocklist;
pub mod error;
pub mod events;
pub mod health;
pub mod models;
pub mod repositories;
pub mod retry;

// Re-export core types
pub use backpressure::StoragePause;
pub use blocklist::{BlocklistService, DEFAULT_AUTO_BLOCK_AFTER};
pub use error::{OutpostError, Result};
pub use events::{EventBus, SystemEvent};
pub use health::{DiskProbe, HealthCheck, HealthReport, HealthSeverity};
pub use models::*;
pub use repositories::*;
pub use retry::{retry_with_backoff, RetryConfig, RetryPolicy};
