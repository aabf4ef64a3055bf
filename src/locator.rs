//! Discovery of a registered service endpoint
//!
//! "No screen reader running" is an ordinary state for a consuming
//! application, so discovery answers `None` instead of an error. It only
//! lists and `stat`s local directories and never blocks.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use crate::config::{ClientConfig, user_endpoint};
use crate::context::SecurityContext;

/// A registered service endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub path: PathBuf,
    /// Context the endpoint is registered under
    pub context: SecurityContext,
}

/// Find a registered service, preferring the caller's own context
///
/// An endpoint registered only under the other context is still returned so
/// that connecting reports a boundary failure rather than "not running".
pub fn locate(config: &ClientConfig) -> Option<ServiceEndpoint> {
    let caller = config.context();
    [caller, caller.opposite()].into_iter().find_map(|context| {
        candidates(config, caller, context)
            .into_iter()
            .find(|path| is_registered(path))
            .map(|path| ServiceEndpoint { path, context })
    })
}

/// Endpoint paths a service in `context` may be registered at
///
/// A normal-desktop service lives in its user's runtime directory. A secure
/// caller runs as another user than the desktop session, so it looks in
/// every user's directory.
fn candidates(
    config: &ClientConfig,
    caller: SecurityContext,
    context: SecurityContext,
) -> Vec<PathBuf> {
    match context {
        SecurityContext::Secure => vec![config.secure_endpoint().to_path_buf()],
        SecurityContext::Normal
            if caller == SecurityContext::Secure && !config.normal_endpoint_pinned() =>
        {
            user_endpoints(config.runtime_dir())
        }
        SecurityContext::Normal => vec![config.normal_endpoint()],
    }
}

/// Normal-desktop endpoints of all users below `runtime_dir`, lowest uid first
fn user_endpoints(runtime_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(runtime_dir) else {
        return Vec::new();
    };
    let mut uids: Vec<u32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    uids.sort_unstable();
    uids.into_iter()
        .map(|uid| user_endpoint(runtime_dir, uid))
        .collect()
}

/// Whether a service endpoint exists at `path`
///
/// A path we may not inspect counts as registered: it exists, but belongs to
/// a context this process cannot reach.
fn is_registered(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.file_type().is_socket(),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::debug!(path = %path.display(), "endpoint not inspectable, assuming registered");
            true
        }
        Err(_) => false,
    }
}
