use std::time::Duration;
use thiserror::Error;

use crate::types::PodPlacement;

/// Failures a data source can report during one poll cycle. None of these
/// abort the collector loop; they are folded into a degraded cycle.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The endpoint could not be reached or authenticated against.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// A paginated listing failed after at least one page succeeded. The
    /// pages that did arrive are carried along and remain usable.
    #[error("partial listing ({count} pods before failure): {reason}", count = .placements.len())]
    PartialListing {
        placements: Vec<PodPlacement>,
        reason: String,
    },

    /// The backend rejected the query. Not retryable without an operator fix.
    #[error("query {expression:?} rejected: {message}")]
    Query {
        expression: String,
        message: String,
    },

    /// No response within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Unavailable(_) => true,
            SourceError::PartialListing { .. } => true,
            SourceError::Query { .. } => false,
            SourceError::Timeout(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(SourceError::Unavailable("connection refused".into()).is_retryable());
        assert!(SourceError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(SourceError::PartialListing {
            placements: vec![],
            reason: "page 2 failed".into()
        }
        .is_retryable());
        assert!(!SourceError::Query {
            expression: "rate(".into(),
            message: "parse error".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_partial_listing_display_includes_count() {
        let err = SourceError::PartialListing {
            placements: vec![PodPlacement {
                pod_name: "a".into(),
                namespace: "default".into(),
                node_name: None,
            }],
            reason: "expired continue token".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("1 pods"));
        assert!(msg.contains("expired continue token"));
    }
}
