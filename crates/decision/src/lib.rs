//! Outpost decision module
//!
//! Release-name parsing, quality-tier derivation, custom-format matching
//! and the scoring/upgrade engine.

pub mod custom_formats;
pub mod engine;
pub mod parser;
pub mod quality;

// Re-export main types
pub use custom_formats::{format_matches, matching_formats};
pub use engine::{compare_candidates, DecisionEngine, Evaluation};
pub use parser::parse_release;
pub use quality::compute_quality_tier;
