//! Error types for CyxCloud
//!
//! Provides a unified error type for the placement crates. The scheduling
//! decision path itself never fails; these errors surface at the edges
//! (id allocation, registry lookups and snapshot loading).

use crate::ids::StoreId;
use thiserror::Error;

/// Result type alias for CyxCloud operations
pub type Result<T> = std::result::Result<T, CyxCloudError>;

/// Unified error type for CyxCloud
#[derive(Error, Debug)]
pub enum CyxCloudError {
    // ===== Cluster View Errors =====
    #[error("Store not found: {0}")]
    StoreNotFound(StoreId),

    #[error("Peer id allocation failed: {0}")]
    IdAllocation(String),

    // ===== Scheduler Errors =====
    #[error("Unknown scheduler type: {0}")]
    UnknownScheduler(String),

    #[error("Scheduler already registered: {0}")]
    DuplicateScheduler(String),

    #[error("Invalid scheduler arguments for {name}: {reason}")]
    InvalidSchedulerArgs { name: String, reason: String },

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CyxCloudError {
    fn from(err: serde_json::Error) -> Self {
        CyxCloudError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CyxCloudError::StoreNotFound(StoreId(4));
        assert_eq!(err.to_string(), "Store not found: 4");

        let err = CyxCloudError::InvalidSchedulerArgs {
            name: "balance-region".into(),
            reason: "unexpected argument".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid scheduler arguments for balance-region: unexpected argument"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CyxCloudError = io_err.into();
        assert!(matches!(err, CyxCloudError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u64>("not a number").unwrap_err();
        let err: CyxCloudError = json_err.into();
        assert!(matches!(err, CyxCloudError::Serialization(_)));
    }
}
