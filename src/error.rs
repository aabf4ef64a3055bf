use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::context::SecurityContext;
use crate::protocol::CapabilityVersion;
use crate::status::StatusCode;

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the screen reader service
///
/// Every variant collapses to one [`StatusCode`] through [`Error::status`];
/// the variants only exist so Rust callers and logs get a readable reason.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no screen reader service is running")]
    NotRunning,

    #[error("caller is in the {caller} context but the service runs in the {service} context")]
    ContextMismatch {
        caller: SecurityContext,
        service: SecurityContext,
    },

    #[error("service endpoint is owned by uid {peer}, which this process does not trust")]
    UntrustedPeer { peer: u32 },

    #[error("access to the service endpoint was denied")]
    AccessDenied,

    #[error("service registered but not accepting connections")]
    Unresponsive,

    #[error("service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("connection to service lost: {0}")]
    Disconnected(#[source] io::Error),

    #[error("{operation} requires capability version {required}, service offers {available}")]
    Unsupported {
        operation: &'static str,
        required: CapabilityVersion,
        available: CapabilityVersion,
    },

    #[error("service rejected the request: {0}")]
    Rejected(StatusCode),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The status word this error is reported as
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotRunning => StatusCode::SERVER_UNAVAILABLE,
            Error::ContextMismatch { .. } | Error::UntrustedPeer { .. } | Error::AccessDenied => {
                StatusCode::ACCESS_DENIED
            }
            Error::Unresponsive | Error::Timeout(_) => StatusCode::TIMEOUT,
            Error::Disconnected(_) | Error::Io(_) => StatusCode::CALL_FAILED,
            Error::Unsupported { .. } => StatusCode::UNKNOWN_INTERFACE,
            Error::Rejected(status) => *status,
            Error::InvalidArgument(_) => StatusCode::INVALID_PARAMETER,
            Error::InvalidProtocol(_) | Error::Serialization(_) | Error::Deserialization(_) => {
                StatusCode::PROTOCOL_ERROR
            }
        }
    }

    /// Map a socket error raised while a request was in flight
    pub(crate) fn from_transport(err: io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(timeout),
            io::ErrorKind::InvalidData => Error::InvalidProtocol(err.to_string()),
            _ => Error::Disconnected(err),
        }
    }

    /// Map a socket error raised while opening the channel
    pub(crate) fn from_connect(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotRunning,
            io::ErrorKind::PermissionDenied => Error::AccessDenied,
            io::ErrorKind::ConnectionRefused => Error::Unresponsive,
            _ => Error::Disconnected(err),
        }
    }
}

impl From<Error> for StatusCode {
    fn from(err: Error) -> Self {
        err.status()
    }
}

/// Collapse an operation result into a single status word
pub fn to_status<T>(result: &Result<T>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::SUCCESS,
        Err(e) => e.status(),
    }
}
