//! Cluster client error types.

use thiserror::Error;

/// Errors returned by cluster requests.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Transport-level failure (connection, timeout, TLS)
    #[error("Cluster request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The cluster answered with a non-success status
    #[error("Cluster responded {status}: {reason}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, as returned by the cluster
        reason: String,
    },

    /// The response body did not match the expected shape
    #[error("Unexpected cluster response: {0}")]
    InvalidResponse(String),
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ClusterError::Api {
            status: 403,
            reason: "blocked by: [FORBIDDEN/8/index write (api)]".to_string(),
        };
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("FORBIDDEN"));
    }
}
