//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::models::Status;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key not found in the owning shard
    #[error("Key not found")]
    NotFound,

    /// A single value is larger than the whole shard budget
    #[error("Value of {size} bytes exceeds shard budget of {budget} bytes")]
    ValueTooLarge { size: usize, budget: usize },

    /// Fabric lane stayed full past the retry bound
    #[error("Fabric lane to core {destination} is saturated")]
    Overloaded { destination: usize },

    /// Deadline elapsed before the owning shard answered
    #[error("Request deadline elapsed")]
    Timeout,

    /// Frame or request failed validation
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Destination core is not running
    #[error("Core {0} is not accepting requests")]
    RoutingUnavailable(usize),

    /// Bootstrap configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A core failed to come up
    #[error("Startup failed: {0}")]
    Startup(String),
}

impl CacheError {
    // == Wire Status ==
    /// Maps the error onto the status byte returned to the listener.
    ///
    /// Bootstrap errors never reach a request path; they map to
    /// `RoutingUnavailable` since no core can serve the request.
    pub fn status(&self) -> Status {
        match self {
            CacheError::NotFound => Status::NotFound,
            CacheError::ValueTooLarge { .. } => Status::ValueTooLarge,
            CacheError::Overloaded { .. } => Status::Overloaded,
            CacheError::Timeout => Status::Timeout,
            CacheError::MalformedRequest(_) => Status::MalformedRequest,
            CacheError::RoutingUnavailable(_)
            | CacheError::InvalidConfig(_)
            | CacheError::Startup(_) => Status::RoutingUnavailable,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (CacheError::NotFound, Status::NotFound),
            (
                CacheError::ValueTooLarge { size: 10, budget: 5 },
                Status::ValueTooLarge,
            ),
            (CacheError::Overloaded { destination: 1 }, Status::Overloaded),
            (CacheError::Timeout, Status::Timeout),
            (
                CacheError::MalformedRequest("bad".to_string()),
                Status::MalformedRequest,
            ),
            (CacheError::RoutingUnavailable(3), Status::RoutingUnavailable),
        ];

        for (error, expected_status) in test_cases {
            assert_eq!(error.status(), expected_status, "{}", error);
        }
    }

    #[test]
    fn test_error_messages() {
        let err = CacheError::ValueTooLarge { size: 10, budget: 5 };
        assert!(err.to_string().contains("10 bytes"));
        assert!(err.to_string().contains("5 bytes"));
        assert!(CacheError::RoutingUnavailable(2).to_string().contains("Core 2"));
    }
}
