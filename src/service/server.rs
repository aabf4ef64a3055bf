//! Unix domain socket server for controller clients

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_io::{Async, Timer};
use futures_lite::future;
use futures_lite::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::ServiceConfig;
use crate::context::{SecurityContext, effective_uid};
use crate::error::{Error, Result};
use crate::platform;
use crate::protocol::{
    CapabilityVersion, HELLO, Hello, HelloParams, MAX_FRAME_LEN, RequestFrame, ResponseFrame,
};
use crate::service::handler::ControllerHandler;
use crate::service::router::Router;
use crate::status::StatusCode;

/// A registered service endpoint accepting controller connections
///
/// Dropping the host stops accepting, closes open sessions and removes the
/// socket file.
pub struct ServiceHost {
    config: ServiceConfig,
    running: Arc<AtomicBool>,
    accept_task: Option<smol::Task<()>>,
}

/// What every connection needs to answer requests
struct Session {
    router: Router,
    context: SecurityContext,
    version: CapabilityVersion,
    idle_timeout: Duration,
    running: Arc<AtomicBool>,
}

impl ServiceHost {
    /// Register the endpoint and start serving on the smol executor
    pub fn bind<H: ControllerHandler>(config: ServiceConfig, handler: H) -> Result<Self> {
        let path = config.endpoint().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if UnixStream::connect(&path).is_ok() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("a service is already registered at {}", path.display()),
            )));
        }
        // Remove a stale socket left by a crashed instance
        let _ = fs::remove_file(&path);

        let listener = UnixListener::bind(&path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        let listener = Async::new(listener)?;

        let router = Router::new(Arc::new(handler), config.version());
        let mut methods: Vec<_> = router.methods().collect();
        methods.sort_unstable();

        let running = Arc::new(AtomicBool::new(true));
        let session = Arc::new(Session {
            router,
            context: config.context(),
            version: config.version(),
            idle_timeout: config.idle_timeout(),
            running: Arc::clone(&running),
        });

        tracing::info!(
            path = %path.display(),
            context = %config.context(),
            version = %config.version(),
            methods = ?methods,
            "controller service started"
        );

        let accept_task = smol::spawn(run_server(listener, session));

        Ok(Self {
            config,
            running,
            accept_task: Some(accept_task),
        })
    }

    /// Get the socket path
    pub fn endpoint(&self) -> &Path {
        self.config.endpoint()
    }

    pub fn context(&self) -> SecurityContext {
        self.config.context()
    }

    pub fn version(&self) -> CapabilityVersion {
        self.config.version()
    }

    /// Stop the server
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the task cancels the accept loop
        self.accept_task.take();
        tracing::debug!(path = %self.endpoint().display(), "controller service stopping");
    }
}

impl Drop for ServiceHost {
    fn drop(&mut self) {
        self.stop();
        let _ = fs::remove_file(self.config.endpoint());
    }
}

/// Main server accept loop
///
/// Connection tasks are owned by the loop, so cancelling it closes every
/// open session as well.
async fn run_server(listener: Async<UnixListener>, session: Arc<Session>) {
    let mut connections: Vec<smol::Task<()>> = Vec::new();
    while session.running.load(Ordering::SeqCst) {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                connections.retain(|task| !task.is_finished());
                let session = Arc::clone(&session);
                connections.push(smol::spawn(handle_connection(stream, session)));
            }
            Err(e) => {
                if session.running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "failed to accept controller connection");
                }
            }
        }
    }
}

/// Handle a single connection
async fn handle_connection(mut stream: Async<UnixStream>, session: Arc<Session>) {
    match platform::peer_identity(stream.get_ref()) {
        Ok(peer) if !SecurityContext::admits_peer(effective_uid(), peer.uid) => {
            tracing::warn!(peer_uid = peer.uid, "rejecting controller from untrusted user");
            return;
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::Unsupported => {}
        Err(e) => {
            tracing::debug!(error = %e, "could not read peer credentials");
            return;
        }
    }

    let mut greeted = false;
    while session.running.load(Ordering::SeqCst) {
        let body = match read_request(&mut stream, session.idle_timeout).await {
            Ok(body) => body,
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    tracing::debug!(error = %e, "closing controller connection");
                }
                break;
            }
        };

        let (response, keep_open) = match RequestFrame::from_bytes(&body) {
            Ok(request) if request.method == HELLO => {
                let (response, accepted) = greet(&session, &request);
                greeted = accepted;
                (response, accepted)
            }
            Ok(request) if !greeted => {
                tracing::warn!(method = %request.method, "request before handshake");
                (ResponseFrame::failure(StatusCode::ACCESS_DENIED), false)
            }
            Ok(request) => {
                tracing::debug!(method = %request.method, "handling controller request");
                let response = match session.router.handle(&request.method, &request.params).await {
                    Ok(payload) => ResponseFrame {
                        success: true,
                        payload,
                    },
                    Err(status) => ResponseFrame::failure(status),
                };
                (response, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse controller request");
                (ResponseFrame::failure(StatusCode::PROTOCOL_ERROR), false)
            }
        };

        if let Err(e) = stream.write_all(&response.to_bytes()).await {
            tracing::debug!(error = %e, "failed to write response");
            break;
        }
        if !keep_open {
            break;
        }
    }
}

/// Answer `hello`; the connection is only accepted from the same context
fn greet(session: &Session, request: &RequestFrame) -> (ResponseFrame, bool) {
    let params: HelloParams = match request.deserialize_params() {
        Ok(params) => params,
        Err(e) => {
            tracing::debug!(error = %e, "undecodable hello");
            return (ResponseFrame::failure(StatusCode::INVALID_PARAMETER), false);
        }
    };

    if !session.context.admits(params.context) {
        tracing::warn!(
            service = %session.context,
            client = %params.context,
            "rejecting controller from another security context"
        );
        return (ResponseFrame::failure(StatusCode::ACCESS_DENIED), false);
    }

    let hello = Hello {
        version: session.version,
        context: session.context,
        pid: std::process::id(),
        idle_timeout_ms: u64::try_from(session.idle_timeout.as_millis()).unwrap_or(u64::MAX),
    };
    match ResponseFrame::success(&hello) {
        Ok(response) => (response, true),
        Err(_) => (ResponseFrame::failure(StatusCode::PROTOCOL_ERROR), false),
    }
}

/// Read one request body, giving up after `idle_timeout` of silence
async fn read_request(stream: &mut Async<UnixStream>, idle_timeout: Duration) -> io::Result<Vec<u8>> {
    let read_len = async {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        Ok::<usize, io::Error>(u32::from_be_bytes(len_buf) as usize)
    };
    let idle = async {
        Timer::after(idle_timeout).await;
        Err::<usize, io::Error>(io::Error::new(io::ErrorKind::TimedOut, "connection idle"))
    };
    let len = future::or(read_len, idle).await?;

    if len == 0 || len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid request length: {len}"),
        ));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(body)
}
