//! Result aggregation
//!
//! Collects match records in line order, keeps at most `max_errors` of them
//! and counts all of them.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

use crate::error::TriageError;
use crate::matcher::MatchRecord;

/// Validated cap on the number of returned results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MaxErrors(NonZeroUsize);

impl MaxErrors {
    /// Accept only positive values; zero and negatives are rejected
    pub fn new(value: i64) -> Result<Self, TriageError> {
        usize::try_from(value)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(MaxErrors)
            .ok_or_else(|| {
                TriageError::InvalidParameter(format!(
                    "max_errors must be a positive integer, got {}",
                    value
                ))
            })
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl TryFrom<i64> for MaxErrors {
    type Error = TriageError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        MaxErrors::new(value)
    }
}

impl From<MaxErrors> for i64 {
    fn from(value: MaxErrors) -> Self {
        value.get() as i64
    }
}

/// Final output of one triage request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageResponse {
    pub total_errors: usize,
    pub displayed_errors: usize,
    pub results: Vec<MatchRecord>,
    pub log_filename: String,
    pub mappings_count: usize,
}

impl TriageResponse {
    /// Matches found but cut by the cap
    pub fn hidden_errors(&self) -> usize {
        self.total_errors.saturating_sub(self.displayed_errors)
    }

    pub fn is_truncated(&self) -> bool {
        self.total_errors > self.displayed_errors
    }
}

/// Accumulates match records for a single request
#[derive(Debug)]
pub struct ResultAggregator {
    max_errors: Option<MaxErrors>,
    total_errors: usize,
    results: Vec<MatchRecord>,
    last_line: usize,
}

impl ResultAggregator {
    pub fn new(max_errors: Option<MaxErrors>) -> Self {
        Self {
            max_errors,
            total_errors: 0,
            results: Vec::new(),
            last_line: 0,
        }
    }

    /// Record a match; records must arrive in ascending line order
    pub fn push(&mut self, record: MatchRecord) {
        debug_assert!(
            record.line_number > self.last_line,
            "match records out of line order"
        );
        self.last_line = record.line_number;
        self.total_errors += 1;

        let under_cap = self
            .max_errors
            .map_or(true, |cap| self.results.len() < cap.get());
        if under_cap {
            self.results.push(record);
        }
    }

    pub fn total_errors(&self) -> usize {
        self.total_errors
    }

    /// Whether further records would only be counted
    pub fn is_full(&self) -> bool {
        self.max_errors
            .map_or(false, |cap| self.results.len() >= cap.get())
    }

    pub fn finish(self, log_filename: impl Into<String>, mappings_count: usize) -> TriageResponse {
        TriageResponse {
            total_errors: self.total_errors,
            displayed_errors: self.results.len(),
            results: self.results,
            log_filename: log_filename.into(),
            mappings_count,
        }
    }
}
