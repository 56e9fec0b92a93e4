//! Error types for triage requests
//!
//! Every failure is terminal for the request that raised it. Callers get
//! exactly one `TriageError` and never a partial response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for triage operations
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Failed to load error mappings: {0}")]
    CatalogLoad(String),

    #[error("Failed to read log file: {0}")]
    LogRead(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl TriageError {
    /// Stable machine-readable kind, independent of the message text
    pub fn kind(&self) -> &'static str {
        match self {
            TriageError::CatalogLoad(_) => "catalog_load_error",
            TriageError::LogRead(_) => "log_read_error",
            TriageError::InvalidParameter(_) => "invalid_parameter_error",
        }
    }

    /// Convert into the serializable error body handed to the calling layer
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
        }
    }
}

/// Error body returned in place of a `TriageResponse`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl From<csv::Error> for TriageError {
    fn from(e: csv::Error) -> Self {
        TriageError::CatalogLoad(format!("CSV parse error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            TriageError::CatalogLoad("x".to_string()),
            TriageError::LogRead(std::io::Error::new(std::io::ErrorKind::Other, "x")),
            TriageError::InvalidParameter("x".to_string()),
        ];

        let kinds: std::collections::HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), 3);
    }

    #[test]
    fn test_error_response_json() {
        let err = TriageError::InvalidParameter("max_errors must be at least 1".to_string());
        let json = serde_json::to_value(err.to_response()).unwrap();

        assert_eq!(json["kind"], "invalid_parameter_error");
        assert_eq!(
            json["error"],
            "Invalid parameter: max_errors must be at least 1"
        );
        assert!(json.get("total_errors").is_none());
    }
}
