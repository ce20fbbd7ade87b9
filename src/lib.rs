//! Size-tier classification of registered businesses.
//!
//! Loads the business registry plus the sector and municipality reference
//! tables, classifies each business by revenue and sector branch, keeps the
//! configured departments and exports the result as CSV and xlsx.

pub mod classify;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod prompt;
pub mod table;

pub use classify::{Branch, SizeTier, Thresholds};
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{Pipeline, RunReport};
