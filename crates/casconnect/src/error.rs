//! Error taxonomy for the connection coordinator.
//!
//! Every failure surfaced by a [`Connection`](crate::Connection) is a single
//! [`Error`] value. Session failures keep the broker's original code and
//! message in [`Error::Protocol`]; everything else is raised locally before
//! any protocol call is made.

use thiserror::Error;

use crate::connection::Capability;
use crate::session::ErrorInfo;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Operation attempted after `close()`.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Isolation ordinal unknown, or not representable by the negotiated protocol.
    #[error("Invalid transaction isolation level: {0}")]
    InvalidIsolationLevel(i32),

    #[error("Invalid parameter value: {0}")]
    InvalidParameterValue(String),

    /// Structurally disallowed combination or an optional feature this driver
    /// does not implement.
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(Capability),

    /// Non-success code reported by the session after a protocol call.
    #[error("Protocol error {}: {}", .0.code, .0.message)]
    Protocol(ErrorInfo),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The session broke its contract (for example, returned no handle and no error).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    #[must_use]
    pub const fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }

    #[must_use]
    pub const fn is_invalid_isolation(&self) -> bool {
        matches!(self, Self::InvalidIsolationLevel(_))
    }

    #[must_use]
    pub const fn is_invalid_parameter(&self) -> bool {
        matches!(self, Self::InvalidParameterValue(_))
    }

    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedCapability(_))
    }

    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Broker error code for [`Error::Protocol`], `None` otherwise.
    #[must_use]
    pub const fn protocol_code(&self) -> Option<i32> {
        match self {
            Self::Protocol(info) => Some(info.code),
            _ => None,
        }
    }
}

impl From<ErrorInfo> for Error {
    fn from(info: ErrorInfo) -> Self {
        tracing::warn!(code = info.code, message = %info.message, "Session reported an error");
        Self::Protocol(info)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_predicate() {
        let err = Error::ConnectionClosed;
        assert!(err.is_connection_closed());
        assert!(!err.is_protocol());
        assert_eq!(err.protocol_code(), None);
    }

    #[test]
    fn test_protocol_error_keeps_code() {
        let err = Error::from(ErrorInfo::new(-493, "Syntax error"));
        assert!(err.is_protocol());
        assert_eq!(err.protocol_code(), Some(-493));
        assert!(err.to_string().contains("-493"));
        assert!(err.to_string().contains("Syntax error"));
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::UnsupportedCapability(Capability::Savepoints);
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("savepoints"));
    }

    #[test]
    fn test_invalid_isolation_display() {
        let err = Error::InvalidIsolationLevel(64);
        assert!(err.is_invalid_isolation());
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn test_config_predicate() {
        let err = Error::Config("missing URL".to_string());
        assert!(err.is_config());
        assert!(!err.is_invalid_parameter());
    }
}
