use serde_json::Value;
use thiserror::Error;

use crate::utils::output::SinkError;

/// Why a collection operation failed.
#[derive(Error, Debug)]
pub enum CollectionError {
    /// A page kept failing with transient errors
    #[error("Failed to retrieve {function}{action}, page #{page}. Latest Error: {last_error}\nMax retry count reached ({attempts}).")]
    RetriesExhausted {
        function: String,
        action: String,
        page: usize,
        attempts: usize,
        last_error: String,
    },

    /// The API refused the request outright; retrying would not help
    #[error("Failed to retrieve {function}{action}, page #{page}. Latest Error: {message}")]
    Rejected {
        function: String,
        action: String,
        page: usize,
        message: String,
    },

    /// The page threshold was hit while the caller wanted records returned in memory.
    /// Carries the records gathered up to the threshold.
    #[error("WARNING: Max pages ({pages}) in memory reached for {function} and results were requested to be returned instead of being written to log. Only partial results were returned.")]
    OversizedResult {
        function: String,
        pages: usize,
        records: Vec<Value>,
    },

    #[error("Failed to deliver results for {function}: {source}")]
    Delivery {
        function: String,
        #[source]
        source: SinkError,
    },
}

impl CollectionError {
    /// Records gathered before an oversized in-memory result was cut off
    pub fn partial_records(&self) -> Option<&[Value]> {
        match self {
            CollectionError::OversizedResult { records, .. } => Some(records),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retries_exhausted_message() {
        let err = CollectionError::RetriesExhausted {
            function: "users".to_string(),
            action: ".list".to_string(),
            page: 4,
            attempts: 3,
            last_error: "HTTP 503: backend error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to retrieve users.list, page #4. Latest Error: HTTP 503: backend error\nMax retry count reached (3)."
        );
        assert!(err.partial_records().is_none());
    }

    #[test]
    fn test_oversized_keeps_records() {
        let err = CollectionError::OversizedResult {
            function: "entries".to_string(),
            pages: 50,
            records: vec![json!({"a": 1})],
        };
        assert_eq!(err.partial_records().unwrap().len(), 1);
        assert!(err.to_string().starts_with("WARNING: Max pages (50)"));
    }
}
