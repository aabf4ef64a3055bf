//! Call marshaller: one request frame out, one status word back

use std::io;

use crate::bridge::ServiceHandle;
use crate::error::{Error, Result};
use crate::protocol::{Request, ResponseFrame, read_frame, write_frame};

/// Decoded result of a successful call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Done,
    ProcessId(u32),
}

/// Reject payloads that must never leave this process
///
/// Runs before the service is contacted, so a bad argument costs nothing
/// and nothing malformed crosses the privilege boundary.
pub fn validate(request: &Request, max_text_bytes: usize) -> Result<()> {
    let Some(text) = request.text() else {
        return Ok(());
    };
    if text.len() > max_text_bytes {
        return Err(Error::InvalidArgument(format!(
            "{} payload of {} bytes exceeds the {max_text_bytes} byte limit",
            request.method(),
            text.len()
        )));
    }
    if text.contains('\0') {
        return Err(Error::InvalidArgument(format!(
            "{} payload contains a NUL character",
            request.method()
        )));
    }
    Ok(())
}

/// Send `request` over `handle` and wait for its reply
///
/// Blocks until the service answers or the bounded timeout expires. Any
/// transport failure leaves the handle [`Broken`](crate::ConnectionState::Broken).
pub fn invoke(handle: &mut ServiceHandle, request: &Request) -> Result<Reply> {
    let limits = handle.limits();
    validate(request, limits.max_text_bytes)?;

    if !handle.is_connected() {
        return Err(Error::Disconnected(io::Error::new(
            io::ErrorKind::NotConnected,
            "service handle is broken",
        )));
    }

    let required = request.min_version();
    if required > handle.version() {
        tracing::debug!(
            method = request.method(),
            required = %required,
            available = %handle.version(),
            "operation not supported by service"
        );
        return Err(Error::Unsupported {
            operation: request.method(),
            required,
            available: handle.version(),
        });
    }

    let frame = request.to_frame()?;
    let reply_timeout = if request.waits_for_speech() {
        limits.speech_timeout
    } else {
        limits.call_timeout
    };

    tracing::debug!(method = request.method(), "sending request");
    let body = match exchange(handle, &frame, reply_timeout, limits.call_timeout) {
        Ok(body) => {
            handle.touch();
            body
        }
        Err(e) => {
            handle.mark_broken();
            return Err(Error::from_transport(e, reply_timeout));
        }
    };

    let response = match ResponseFrame::from_bytes(&body) {
        Ok(response) => response,
        Err(e) => {
            handle.mark_broken();
            return Err(e);
        }
    };

    match request {
        Request::GetProcessId => {
            let pid: u32 = response.into_result()?;
            if let Some(peer_pid) = handle.peer_pid() {
                if peer_pid != pid {
                    return Err(Error::InvalidProtocol(format!(
                        "service reported pid {pid} but the socket peer is pid {peer_pid}"
                    )));
                }
            }
            Ok(Reply::ProcessId(pid))
        }
        _ => {
            response.into_result::<()>()?;
            Ok(Reply::Done)
        }
    }
}

fn exchange(
    handle: &mut ServiceHandle,
    frame: &[u8],
    reply_timeout: std::time::Duration,
    write_timeout: std::time::Duration,
) -> io::Result<Vec<u8>> {
    let stream = handle.stream_mut();
    stream.set_write_timeout(Some(write_timeout))?;
    stream.set_read_timeout(Some(reply_timeout))?;
    write_frame(stream, frame)?;
    read_frame(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SsmlRequest;
    use crate::status::StatusCode;

    #[test]
    fn test_oversized_text_is_invalid_parameter() {
        let request = Request::SpeakText("x".repeat(11));
        let err = validate(&request, 10).unwrap_err();
        assert_eq!(err.status(), StatusCode::INVALID_PARAMETER);

        assert!(validate(&Request::SpeakText("x".repeat(10)), 10).is_ok());
    }

    #[test]
    fn test_nul_in_markup_is_invalid_parameter() {
        let request = Request::SpeakSsml(SsmlRequest::new("<speak>\0</speak>"));
        let err = validate(&request, 1024).unwrap_err();
        assert_eq!(err.status(), StatusCode::INVALID_PARAMETER);
    }

    #[test]
    fn test_payloadless_requests_always_validate() {
        assert!(validate(&Request::CancelSpeech, 0).is_ok());
        assert!(validate(&Request::GetProcessId, 0).is_ok());
    }

    #[test]
    fn test_empty_text_is_left_to_the_service() {
        assert!(validate(&Request::BrailleMessage(String::new()), 16).is_ok());
    }
}
