//! Error types for the discovery engine

use thiserror::Error;
use zeroscan_core::ValidationError;

/// Result type alias for backend and resolution operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors raised by a discovery backend or while resolving one advertisement.
///
/// None of these abort a scan: a failed browse only affects its own protocol
/// and a failed resolution only drops its own advertisement.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The backend could not be brought up
    #[error("Failed to initialize discovery backend: {0}")]
    BackendInit(String),

    /// Failed to browse for a service type
    #[error("Failed to browse for service type '{service_type}': {reason}")]
    BrowseFailed { service_type: String, reason: String },

    /// Failed to stop a running browse
    #[error("Failed to stop browsing '{service_type}': {reason}")]
    StopFailed { service_type: String, reason: String },

    /// Service resolution failed
    #[error("Failed to resolve service '{service_name}': {reason}")]
    ResolutionFailed {
        service_name: String,
        reason: String,
    },

    /// Service resolution did not complete in time
    #[error("Timed out resolving service '{service_name}' after {timeout_ms}ms")]
    ResolutionTimeout {
        service_name: String,
        timeout_ms: u64,
    },
}

impl DiscoveryError {
    /// Creates a browse failed error.
    pub fn browse_failed(service_type: impl Into<String>, reason: impl ToString) -> Self {
        Self::BrowseFailed {
            service_type: service_type.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a resolution failed error.
    pub fn resolution_failed(service_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResolutionFailed {
            service_name: service_name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Lifecycle misuse of a discovery session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `start` was called on a session that already left the idle state
    #[error("Discovery session is already running")]
    AlreadyStarted,

    /// `start` was called on a stopped session
    #[error("Discovery session has been stopped; create a new session to browse again")]
    AlreadyStopped,

    /// `start` was called outside a tokio runtime
    #[error("Discovery session requires a tokio runtime")]
    NoRuntime,
}

/// Errors surfaced by [`Resolver::resolve`](crate::Resolver::resolve)
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Arguments were rejected before any browse started
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The discovery session could not be driven
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The scan task panicked or was aborted
    #[error("Resolve task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for ResolveError {
    fn from(err: tokio::task::JoinError) -> Self {
        ResolveError::TaskFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        let err = DiscoveryError::browse_failed("_http._tcp.example.com.", "unsupported domain");
        assert!(matches!(err, DiscoveryError::BrowseFailed { .. }));
        assert!(err.to_string().contains("_http._tcp.example.com."));

        let err = DiscoveryError::resolution_failed("printer._ipp._tcp.local.", "no SRV record");
        assert!(err.to_string().contains("no SRV record"));
    }

    #[test]
    fn test_resolve_error_is_transparent() {
        let err: ResolveError = ValidationError::NoProtocols.into();
        assert_eq!(err.to_string(), ValidationError::NoProtocols.to_string());
        assert!(matches!(err, ResolveError::Validation(ValidationError::NoProtocols)));
    }
}
