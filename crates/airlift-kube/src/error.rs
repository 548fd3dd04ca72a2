//! Error types for airlift-kube

use airlift_core::{CoreError, MultiError};
use airlift_wasm::WasmError;
use thiserror::Error;

/// Result type for airlift-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling a release
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// The cluster does not serve this group/version/kind
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownResourceType { api_version: String, kind: String },

    /// Aggregated per-resource failures from a batched phase
    #[error(transparent)]
    Aggregate(#[from] MultiError),

    /// One or more resources are owned by another release
    #[error("failed to validate ownership: {0}")]
    OwnershipConflict(MultiError),

    /// Flight evaluation failed
    #[error("failed to evaluate flight: {0}")]
    Flight(#[from] WasmError),

    /// Flight output could not be parsed into resources
    #[error("failed to parse flight output: {0}")]
    Parse(#[from] CoreError),

    /// Release has no revision history
    #[error("release {release:?} not found")]
    ReleaseNotFound { release: String },

    /// Revision ID outside the release's history
    #[error("revision {id} is not within history (release {release:?} has {count} revision(s))")]
    RevisionNotFound {
        release: String,
        id: usize,
        count: usize,
    },

    /// A resource never reached Ready within the wait period
    #[error("resource {resource} did not become ready within the wait period")]
    ReadyTimeout { resource: String },

    /// Readiness wait failed after the release was applied; the new
    /// revision stays active
    #[error("release did not become ready within wait period: to roll back use `airlift descent`: {0}")]
    ReleaseNotReady(#[source] Box<KubeError>),

    /// Persisted state (revision secret, ownership configmap) is malformed
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Not a failure: the operation was a no-op. Printed to stderr, exits 0.
    #[error("{0}")]
    Warning(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(err: serde_json::Error) -> Self {
        KubeError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(err: serde_yaml::Error) -> Self {
        KubeError::Serialization(err.to_string())
    }
}

impl KubeError {
    pub fn warning(message: impl Into<String>) -> Self {
        KubeError::Warning(message.into())
    }

    /// Warnings reach the operator on stderr but the process exits 0.
    pub fn is_warning(&self) -> bool {
        matches!(self, KubeError::Warning(_))
    }

    /// Check for a Kubernetes 404 Not Found response
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check for a Kubernetes 409 Conflict response
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_detection() {
        assert!(KubeError::warning("nothing to do").is_warning());
        assert!(!KubeError::Storage("bad".to_string()).is_warning());
    }

    #[test]
    fn test_ownership_conflict_message() {
        let err = KubeError::OwnershipConflict(
            MultiError::from_errors(
                "conflict(s)",
                vec![r#"resource "default.apps.v1.deployment.sample-app" is owned by release "foo""#.to_string()],
            )
            .unwrap(),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("failed to validate ownership"));
        assert!(rendered.contains(r#"is owned by release "foo""#));
    }

    #[test]
    fn test_not_ready_error_directs_to_descent() {
        let err = KubeError::ReleaseNotReady(Box::new(KubeError::ReadyTimeout {
            resource: "default.apps.v1.deployment.sample-app".to_string(),
        }));
        let rendered = err.to_string();
        assert!(rendered.contains("airlift descent"));
        assert!(rendered.contains("default.apps.v1.deployment.sample-app"));
    }
}
