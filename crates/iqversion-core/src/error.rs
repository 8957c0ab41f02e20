//! Shared error type across iqversion crates.

use thiserror::Error;

/// Stanza error conditions (stable, RFC 6120 names).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCondition {
    /// Malformed or unparseable request.
    BadRequest,
    /// Feature not implemented by the peer.
    FeatureNotImplemented,
    /// Peer declined to answer.
    ServiceUnavailable,
    /// No answer within the deadline.
    RemoteServerTimeout,
    /// Anything else.
    InternalServerError,
}

impl ErrorCondition {
    /// Element name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCondition::BadRequest => "bad-request",
            ErrorCondition::FeatureNotImplemented => "feature-not-implemented",
            ErrorCondition::ServiceUnavailable => "service-unavailable",
            ErrorCondition::RemoteServerTimeout => "remote-server-timeout",
            ErrorCondition::InternalServerError => "internal-server-error",
        }
    }

    /// Inverse of [`ErrorCondition::as_str`]. Unknown names collapse to
    /// `InternalServerError`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "bad-request" => ErrorCondition::BadRequest,
            "feature-not-implemented" => ErrorCondition::FeatureNotImplemented,
            "service-unavailable" => ErrorCondition::ServiceUnavailable,
            "remote-server-timeout" => ErrorCondition::RemoteServerTimeout,
            _ => ErrorCondition::InternalServerError,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, VersionError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not connected")]
    NotConnected,
    #[error("timed out waiting for reply")]
    Timeout,
    #[error("remote error: {}", .0.as_str())]
    Remote(ErrorCondition),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl VersionError {
    /// Map to the stanza error condition reported to peers.
    pub fn condition(&self) -> ErrorCondition {
        match self {
            VersionError::MalformedPayload(_) | VersionError::BadRequest(_) => {
                ErrorCondition::BadRequest
            }
            VersionError::NotConnected => ErrorCondition::ServiceUnavailable,
            VersionError::Timeout => ErrorCondition::RemoteServerTimeout,
            VersionError::Remote(c) => *c,
            VersionError::Config(_) | VersionError::Internal(_) => {
                ErrorCondition::InternalServerError
            }
        }
    }
}
