//! Error types for the lifecycle handler.

use crate::outcome::FailureKind;

/// The result type used throughout ratewall-resource.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling a lifecycle event.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The invocation payload is not a lifecycle event.
    #[error("invalid lifecycle event: {message}")]
    InvalidEvent {
        /// Description of what could not be parsed.
        message: String,
    },

    /// A resource property was missing or malformed.
    #[error("invalid resource properties: {message}")]
    InvalidProperties {
        /// Description of the invalid property.
        message: String,
    },

    /// The event carried a request type the handler does not know.
    #[error("unsupported request type: {request_type:?}")]
    UnsupportedRequestType {
        /// The request type as received.
        request_type: String,
    },

    /// A Create failure was requested through the fail-injection property.
    #[error("create failure requested")]
    InjectedFailure,

    /// The target web ACL does not exist or is not visible.
    #[error("web ACL not found: {scope}/{name}/{id}")]
    ResourceNotFound {
        /// Web ACL name.
        name: String,
        /// Web ACL id.
        id: String,
        /// Web ACL scope.
        scope: String,
    },

    /// The lock token was superseded by another writer.
    #[error("lock token for web ACL {name}/{id} is stale; another writer updated it first")]
    StaleLockToken {
        /// Web ACL name.
        name: String,
        /// Web ACL id.
        id: String,
    },

    /// A control-plane call failed (transport, timeout, or service error).
    #[error("control plane error: {message}")]
    ControlPlane {
        /// Description of the failure.
        message: String,
        /// HTTP status returned by the service, when one was received.
        status_code: Option<u16>,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The completion signal could not be delivered.
    #[error("report delivery failed: {message}")]
    Report {
        /// Description of the delivery failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal error that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// An error from ratewall-core.
    #[error("core error: {0}")]
    Core(#[from] ratewall_core::Error),
}

impl Error {
    /// Creates a new invalid-properties error.
    #[must_use]
    pub fn invalid_properties(message: impl Into<String>) -> Self {
        Self::InvalidProperties {
            message: message.into(),
        }
    }

    /// Creates a new control-plane error.
    #[must_use]
    pub fn control_plane(message: impl Into<String>) -> Self {
        Self::ControlPlane {
            message: message.into(),
            status_code: None,
            source: None,
        }
    }

    /// Creates a control-plane error carrying the HTTP status received.
    #[must_use]
    pub fn control_plane_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::ControlPlane {
            message: message.into(),
            status_code: Some(status_code),
            source: None,
        }
    }

    /// Creates a new control-plane error with a source.
    #[must_use]
    pub fn control_plane_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ControlPlane {
            message: message.into(),
            status_code: None,
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new report delivery error.
    #[must_use]
    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new report delivery error with a source.
    #[must_use]
    pub fn report_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Report {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classifies the error for the `failure_kind` outcome attribute.
    ///
    /// Operators use the kind to tell a lost optimistic-lock race apart from
    /// an unavailable control plane.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::InvalidEvent { .. } => FailureKind::InvalidEvent,
            Self::InvalidProperties { .. } | Self::Core(_) => FailureKind::InvalidProperties,
            Self::UnsupportedRequestType { .. } => FailureKind::UnsupportedRequestType,
            Self::InjectedFailure => FailureKind::InjectedFailure,
            Self::ResourceNotFound { .. } => FailureKind::ResourceUnreadable,
            Self::StaleLockToken { .. } => FailureKind::LockTokenStale,
            Self::ControlPlane { .. } => FailureKind::ControlPlaneUnavailable,
            Self::Report { .. } | Self::Serialization { .. } | Self::Internal { .. } => {
                FailureKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn stale_token_is_distinct_from_unavailable() {
        let stale = Error::StaleLockToken {
            name: "acl1".into(),
            id: "id1".into(),
        };
        let down = Error::control_plane("connection reset");

        assert_eq!(stale.failure_kind(), FailureKind::LockTokenStale);
        assert_eq!(down.failure_kind(), FailureKind::ControlPlaneUnavailable);
        assert_ne!(stale.failure_kind(), down.failure_kind());
        assert!(stale.to_string().contains("stale"));
    }

    #[test]
    fn unsupported_request_type_display() {
        let err = Error::UnsupportedRequestType {
            request_type: "Rollback".into(),
        };
        assert!(err.to_string().contains("Rollback"));
        assert_eq!(err.failure_kind(), FailureKind::UnsupportedRequestType);
    }

    #[test]
    fn control_plane_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = Error::control_plane_with_source("GetWebACL failed", source);
        assert!(err.to_string().contains("control plane error"));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn core_errors_count_as_invalid_properties() {
        let err: Error = ratewall_core::Error::configuration("bad scope").into();
        assert_eq!(err.failure_kind(), FailureKind::InvalidProperties);
    }
}
