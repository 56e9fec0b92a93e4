//! Log Triage - matching engine library
//!
//! Matches log files against a catalog of known-error patterns and returns
//! the matching lines with their interpretations.

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod report;
pub mod scanner;

pub use aggregator::{MaxErrors, TriageResponse};
pub use catalog::{CatalogSource, PatternCatalog, PatternEntry};
pub use engine::{CatalogValidation, TriageEngine, TriageRequest};
pub use error::{ErrorResponse, TriageError};
pub use matcher::{MatchOptions, MatchRecord};
