//! Session bridge: opening a checked channel to the service
//!
//! A handle is only handed out after three gates pass, in this order and
//! before any request payload is written:
//!
//! 1. the endpoint is registered under the caller's own security context,
//! 2. the kernel-reported owner of the socket is trusted,
//! 3. the service's handshake confirms the same context.
//!
//! Failures are returned as-is. The bridge never retries, so a caller always
//! observes the failure and can re-check its context before reconnecting.

use std::io;
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::context::{SecurityContext, effective_uid};
use crate::error::{Error, Result};
use crate::locator::ServiceEndpoint;
use crate::platform::{self, PeerIdentity};
use crate::protocol::{
    CapabilityVersion, HELLO, Hello, HelloParams, RequestFrame, ResponseFrame, read_frame,
    write_frame,
};

/// Channel health of a [`ServiceHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// An I/O error or timeout left the channel unusable; drop the handle
    /// and connect again
    Broken,
}

/// Per-handle limits copied from the client configuration
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallLimits {
    pub call_timeout: Duration,
    pub speech_timeout: Duration,
    pub max_text_bytes: usize,
}

/// A live, checked connection to one service instance
#[derive(Debug)]
pub struct ServiceHandle {
    stream: UnixStream,
    state: ConnectionState,
    caller_context: SecurityContext,
    hello: Hello,
    peer: Option<PeerIdentity>,
    limits: CallLimits,
    last_used: Instant,
}

impl ServiceHandle {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Context the service runs in
    pub fn context(&self) -> SecurityContext {
        self.hello.context
    }

    /// Capability version negotiated in the handshake
    pub fn version(&self) -> CapabilityVersion {
        self.hello.version
    }

    /// Process id the service announced in the handshake
    pub fn service_pid(&self) -> u32 {
        self.hello.pid
    }

    /// Process id reported by the kernel for the socket peer, if known
    pub fn peer_pid(&self) -> Option<u32> {
        self.peer.and_then(|p| p.pid)
    }

    /// Time since the last reply on this handle
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Whether this handle may serve another call from a caller in `caller`
    ///
    /// The handle must belong to the same caller context, be well inside the
    /// service's idle timeout, and the service must not have hung up since
    /// the last reply.
    pub fn is_fresh_for(&self, caller: SecurityContext) -> bool {
        self.is_connected()
            && self.caller_context == caller
            && !self.near_idle_timeout()
            && !platform::peer_hung_up(&self.stream)
    }

    fn near_idle_timeout(&self) -> bool {
        match self.hello.idle_timeout_ms {
            0 => false,
            ms => self.idle_for() >= Duration::from_millis(ms) / 2,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub(crate) fn limits(&self) -> CallLimits {
        self.limits
    }

    pub(crate) fn stream_mut(&mut self) -> &mut UnixStream {
        &mut self.stream
    }

    pub(crate) fn mark_broken(&mut self) {
        if self.state != ConnectionState::Broken {
            tracing::debug!(pid = self.hello.pid, "service handle marked broken");
        }
        self.state = ConnectionState::Broken;
    }
}

/// Open a channel to `endpoint` and complete the handshake
pub fn connect(endpoint: &ServiceEndpoint, config: &ClientConfig) -> Result<ServiceHandle> {
    let caller = config.context();
    if !caller.admits(endpoint.context) {
        tracing::warn!(
            caller = %caller,
            service = %endpoint.context,
            "refusing to connect across security contexts"
        );
        return Err(Error::ContextMismatch {
            caller,
            service: endpoint.context,
        });
    }

    let mut stream = UnixStream::connect(&endpoint.path).map_err(Error::from_connect)?;
    let peer = check_peer(&stream)?;

    let timeout = nonzero(config.connect_timeout());
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let hello = handshake(&mut stream, caller, timeout)?;

    if !caller.admits(hello.context) {
        tracing::warn!(
            caller = %caller,
            service = %hello.context,
            "service announced a different security context"
        );
        return Err(Error::ContextMismatch {
            caller,
            service: hello.context,
        });
    }
    if hello.version < CapabilityVersion::BASE {
        return Err(Error::InvalidProtocol(format!(
            "service announced capability version {}",
            hello.version
        )));
    }

    tracing::debug!(
        path = %endpoint.path.display(),
        version = %hello.version,
        pid = hello.pid,
        "connected to service"
    );

    Ok(ServiceHandle {
        stream,
        state: ConnectionState::Connected,
        caller_context: caller,
        hello,
        peer,
        limits: CallLimits {
            call_timeout: nonzero(config.call_timeout()),
            speech_timeout: nonzero(config.speech_timeout()),
            max_text_bytes: config.max_text_bytes(),
        },
        last_used: Instant::now(),
    })
}

/// Verify the socket owner; platforms without peer credentials skip this
fn check_peer(stream: &UnixStream) -> Result<Option<PeerIdentity>> {
    match platform::peer_identity(stream) {
        Ok(identity) => {
            if !SecurityContext::admits_peer(effective_uid(), identity.uid) {
                tracing::warn!(peer_uid = identity.uid, "service endpoint owned by untrusted user");
                return Err(Error::UntrustedPeer { peer: identity.uid });
            }
            Ok(Some(identity))
        }
        Err(e) if e.kind() == io::ErrorKind::Unsupported => Ok(None),
        Err(e) => Err(Error::from_connect(e)),
    }
}

fn handshake(stream: &mut UnixStream, caller: SecurityContext, timeout: Duration) -> Result<Hello> {
    let frame = RequestFrame::to_bytes(
        HELLO,
        &HelloParams {
            context: caller,
            version: CapabilityVersion::CURRENT,
        },
    )?;
    write_frame(stream, &frame).map_err(|e| Error::from_transport(e, timeout))?;

    let body = read_frame(stream).map_err(|e| Error::from_transport(e, timeout))?;
    ResponseFrame::from_bytes(&body)?.into_result()
}

/// Socket timeouts reject zero durations
fn nonzero(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;
    use std::path::Path;
    use std::thread;

    use crate::status::StatusCode;

    fn endpoint(path: &Path, context: SecurityContext) -> ServiceEndpoint {
        ServiceEndpoint {
            path: path.to_path_buf(),
            context,
        }
    }

    fn config(path: &Path) -> ClientConfig {
        ClientConfig::builder()
            .context(SecurityContext::Normal)
            .normal_endpoint(path)
            .connect_timeout(Duration::from_millis(200))
            .build()
    }

    /// Accept one connection, read the hello and answer with `reply`, then
    /// hold the connection until the client closes it
    fn fake_service(listener: UnixListener, reply: Option<ResponseFrame>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let body = read_frame(&mut stream).unwrap();
            let frame = RequestFrame::from_bytes(&body).unwrap();
            assert_eq!(frame.method, HELLO);
            match reply {
                Some(reply) => {
                    write_frame(&mut stream, &reply.to_bytes()).unwrap();
                    let _ = stream.read(&mut [0u8; 1]);
                }
                None => thread::sleep(Duration::from_millis(400)),
            }
        })
    }

    fn hello(context: SecurityContext, idle_timeout_ms: u64) -> ResponseFrame {
        ResponseFrame::success(&Hello {
            version: CapabilityVersion::CURRENT,
            context,
            pid: 4321,
            idle_timeout_ms,
        })
        .unwrap()
    }

    #[test]
    fn test_cross_context_endpoint_is_refused_without_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let err = connect(&endpoint(&path, SecurityContext::Secure), &config(&path)).unwrap_err();
        assert!(matches!(err, Error::ContextMismatch { .. }));
        assert_eq!(err.status(), StatusCode::ACCESS_DENIED);
    }

    #[test]
    fn test_stale_socket_is_unresponsive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normal.sock");
        drop(UnixListener::bind(&path).unwrap());

        let err = connect(&endpoint(&path, SecurityContext::Normal), &config(&path)).unwrap_err();
        assert_eq!(err.status(), StatusCode::TIMEOUT);
    }

    #[test]
    fn test_silent_service_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normal.sock");
        let server = fake_service(UnixListener::bind(&path).unwrap(), None);

        let err = connect(&endpoint(&path, SecurityContext::Normal), &config(&path)).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        server.join().unwrap();
    }

    #[test]
    fn test_service_announcing_other_context_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normal.sock");
        let server = fake_service(
            UnixListener::bind(&path).unwrap(),
            Some(hello(SecurityContext::Secure, 0)),
        );

        let err = connect(&endpoint(&path, SecurityContext::Normal), &config(&path)).unwrap_err();
        assert!(matches!(err, Error::ContextMismatch { .. }));
        server.join().unwrap();
    }

    #[test]
    fn test_successful_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normal.sock");
        let reply = ResponseFrame::success(&Hello {
            version: CapabilityVersion::BASE,
            context: SecurityContext::Normal,
            pid: 4321,
            idle_timeout_ms: 0,
        })
        .unwrap();
        let server = fake_service(UnixListener::bind(&path).unwrap(), Some(reply));

        let handle = connect(&endpoint(&path, SecurityContext::Normal), &config(&path)).unwrap();
        assert!(handle.is_connected());
        assert_eq!(handle.version(), CapabilityVersion::BASE);
        assert_eq!(handle.service_pid(), 4321);
        assert_eq!(handle.context(), SecurityContext::Normal);
        assert!(handle.is_fresh_for(SecurityContext::Normal));
        assert!(!handle.is_fresh_for(SecurityContext::Secure));
        drop(handle);
        server.join().unwrap();
    }

    #[test]
    fn test_handle_goes_stale_before_service_idle_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normal.sock");
        let server = fake_service(
            UnixListener::bind(&path).unwrap(),
            Some(hello(SecurityContext::Normal, 100)),
        );

        let mut handle =
            connect(&endpoint(&path, SecurityContext::Normal), &config(&path)).unwrap();
        assert!(handle.is_fresh_for(SecurityContext::Normal));

        thread::sleep(Duration::from_millis(60));
        assert!(!handle.is_fresh_for(SecurityContext::Normal));

        handle.touch();
        assert!(handle.is_fresh_for(SecurityContext::Normal));
        drop(handle);
        server.join().unwrap();
    }
}
