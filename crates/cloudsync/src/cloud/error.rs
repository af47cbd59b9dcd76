//! Remote provider error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Remote request failed: {0}")]
    Request(String),

    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    #[error("Fetching {what} timed out after {after_ms}ms")]
    Timeout { what: String, after_ms: u64 },

    #[error("Remote {kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Invalid inventory: {0}")]
    Inventory(String),
}

impl CloudError {
    /// Returns true if the error is likely transient and the call can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloudError::Unreachable(_) | CloudError::Timeout { .. })
    }
}

impl From<serde_yaml::Error> for CloudError {
    fn from(err: serde_yaml::Error) -> Self {
        CloudError::Inventory(err.to_string())
    }
}

pub type CloudResult<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(CloudError::Unreachable("x".into()).is_retryable());
        assert!(CloudError::Timeout {
            what: "zones".into(),
            after_ms: 10
        }
        .is_retryable());
        assert!(!CloudError::NotFound {
            kind: "region".into(),
            id: "r".into()
        }
        .is_retryable());
        assert!(!CloudError::Request("bad".into()).is_retryable());
    }
}
