//! Stable status-code space shared with callers
//!
//! Zero is success. Every other value is a Windows system or RPC error
//! number, the numbering screen-reader controller clients have always
//! returned, so callers in any language can compare against the documented
//! constants without knowing this crate's error types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A status word returned by every controller operation
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// The operation completed
    pub const SUCCESS: Self = Self(0);
    /// The caller and the service live in different security contexts,
    /// or the service endpoint is owned by an untrusted user
    pub const ACCESS_DENIED: Self = Self(5);
    /// The service is not accepting input right now (e.g. sleep mode)
    pub const NOT_READY: Self = Self(21);
    /// An argument was rejected, locally or by the service
    pub const INVALID_PARAMETER: Self = Self(87);
    /// The service is busy
    pub const BUSY: Self = Self(170);
    /// Synchronous speech was cancelled before it finished
    pub const CANCELLED: Self = Self(1223);
    /// The service is registered but did not answer in time
    pub const TIMEOUT: Self = Self(1460);
    /// The connected service does not implement the operation
    pub const UNKNOWN_INTERFACE: Self = Self(1717);
    /// No service instance is registered
    pub const SERVER_UNAVAILABLE: Self = Self(1722);
    /// The channel broke after the service was located
    pub const CALL_FAILED: Self = Self(1726);
    /// A frame or reply could not be understood
    pub const PROTOCOL_ERROR: Self = Self(1728);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Raw value for the C ABI
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Symbolic name of a well-known code
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "SUCCESS",
            Self::ACCESS_DENIED => "ACCESS_DENIED",
            Self::NOT_READY => "NOT_READY",
            Self::INVALID_PARAMETER => "INVALID_PARAMETER",
            Self::BUSY => "BUSY",
            Self::CANCELLED => "CANCELLED",
            Self::TIMEOUT => "TIMEOUT",
            Self::UNKNOWN_INTERFACE => "UNKNOWN_INTERFACE",
            Self::SERVER_UNAVAILABLE => "SERVER_UNAVAILABLE",
            Self::CALL_FAILED => "CALL_FAILED",
            Self::PROTOCOL_ERROR => "PROTOCOL_ERROR",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<StatusCode> for u32 {
    fn from(status: StatusCode) -> Self {
        status.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_zero() {
        assert_eq!(StatusCode::SUCCESS.as_u32(), 0);
        assert!(StatusCode::SUCCESS.is_success());
        assert!(!StatusCode::TIMEOUT.is_success());
    }

    #[test]
    fn test_display_names_known_codes() {
        assert_eq!(
            StatusCode::UNKNOWN_INTERFACE.to_string(),
            "UNKNOWN_INTERFACE (1717)"
        );
        assert_eq!(StatusCode(4242).to_string(), "status 4242");
    }

    #[test]
    fn test_serializes_as_bare_integer() {
        let bytes = rmp_serde::to_vec(&StatusCode::CANCELLED).unwrap();
        let raw: u32 = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(raw, 1223);
    }
}
