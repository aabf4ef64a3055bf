use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::{SecurityContext, effective_uid};
#[cfg(feature = "service")]
use crate::protocol::CapabilityVersion;

/// Per-user runtime directories; each user's normal-desktop service lives
/// under `<RUNTIME_DIR>/<uid>`
pub const RUNTIME_DIR: &str = "/run/user";
/// Directory name the service registers its endpoint under
pub const SERVICE_DIR: &str = "sr-controller";
/// File name of the endpoint socket
pub const SOCKET_NAME: &str = "controller.sock";
/// Default upper bound for text and markup payloads, in bytes
pub const DEFAULT_MAX_TEXT_BYTES: usize = 64 * 1024;

/// Well-known endpoint of the service for a security context
///
/// The normal-desktop instance lives in the current user's runtime
/// directory, the secure-desktop instance in a system-owned directory.
pub fn default_endpoint(context: SecurityContext) -> PathBuf {
    match context {
        SecurityContext::Normal => user_endpoint(Path::new(RUNTIME_DIR), effective_uid()),
        SecurityContext::Secure => PathBuf::from("/run")
            .join(SERVICE_DIR)
            .join("secure")
            .join(SOCKET_NAME),
    }
}

/// Normal-desktop endpoint of user `uid` below `runtime_dir`
pub fn user_endpoint(runtime_dir: &Path, uid: u32) -> PathBuf {
    runtime_dir
        .join(uid.to_string())
        .join(SERVICE_DIR)
        .join(SOCKET_NAME)
}

/// Client-side settings
///
/// The library reads no configuration files or environment variables; an
/// embedding application adjusts behavior through this builder only.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    context: Option<SecurityContext>,
    runtime_dir: PathBuf,
    normal_endpoint: Option<PathBuf>,
    secure_endpoint: PathBuf,
    connect_timeout: Duration,
    call_timeout: Duration,
    speech_timeout: Duration,
    max_text_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            context: None,
            runtime_dir: PathBuf::from(RUNTIME_DIR),
            normal_endpoint: None,
            secure_endpoint: default_endpoint(SecurityContext::Secure),
            connect_timeout: Duration::from_secs(2),
            call_timeout: Duration::from_secs(5),
            speech_timeout: Duration::from_secs(120),
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for ClientConfig
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Context of the caller, detected at call time unless pinned
    pub fn context(&self) -> SecurityContext {
        self.context.unwrap_or_else(SecurityContext::detect)
    }

    /// Root of the per-user runtime directories
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// The current user's normal-desktop endpoint
    pub fn normal_endpoint(&self) -> PathBuf {
        match &self.normal_endpoint {
            Some(path) => path.clone(),
            None => user_endpoint(&self.runtime_dir, effective_uid()),
        }
    }

    /// Whether the normal-desktop endpoint was set explicitly
    pub fn normal_endpoint_pinned(&self) -> bool {
        self.normal_endpoint.is_some()
    }

    pub fn secure_endpoint(&self) -> &Path {
        &self.secure_endpoint
    }

    /// Bound for connecting and the handshake
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Bound for a regular reply
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Bound for a reply to synchronous SSML, which arrives after speaking
    pub fn speech_timeout(&self) -> Duration {
        self.speech_timeout
    }

    pub fn max_text_bytes(&self) -> usize {
        self.max_text_bytes
    }
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    inner: ClientConfig,
}

impl ClientConfigBuilder {
    /// Pin the caller's context instead of detecting it
    pub fn context(mut self, context: SecurityContext) -> Self {
        self.inner.context = Some(context);
        self
    }

    /// Look for per-user endpoints below `dir` instead of `/run/user`
    pub fn runtime_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.inner.runtime_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Use exactly this normal-desktop endpoint
    pub fn normal_endpoint(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.normal_endpoint = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn secure_endpoint(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.secure_endpoint = path.as_ref().to_path_buf();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.inner.connect_timeout = timeout;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.inner.call_timeout = timeout;
        self
    }

    pub fn speech_timeout(mut self, timeout: Duration) -> Self {
        self.inner.speech_timeout = timeout;
        self
    }

    pub fn max_text_bytes(mut self, bytes: usize) -> Self {
        self.inner.max_text_bytes = bytes;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.inner
    }
}

/// Settings of a [`ServiceHost`](crate::service::ServiceHost)
#[cfg(feature = "service")]
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    endpoint: PathBuf,
    context: SecurityContext,
    version: CapabilityVersion,
    idle_timeout: Duration,
}

#[cfg(feature = "service")]
impl Default for ServiceConfig {
    fn default() -> Self {
        let context = SecurityContext::detect();
        Self {
            endpoint: default_endpoint(context),
            context,
            version: CapabilityVersion::CURRENT,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

#[cfg(feature = "service")]
impl ServiceConfig {
    /// Create a new builder for ServiceConfig
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    pub fn context(&self) -> SecurityContext {
        self.context
    }

    pub fn version(&self) -> CapabilityVersion {
        self.version
    }

    /// Connections silent for longer than this are closed
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

/// Builder for ServiceConfig
#[cfg(feature = "service")]
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    inner: ServiceConfig,
    endpoint_set: bool,
}

#[cfg(feature = "service")]
impl ServiceConfigBuilder {
    pub fn endpoint(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.endpoint = path.as_ref().to_path_buf();
        self.endpoint_set = true;
        self
    }

    /// Context the service runs in; also moves the endpoint to that
    /// context's default location unless one was set explicitly
    pub fn context(mut self, context: SecurityContext) -> Self {
        self.inner.context = context;
        if !self.endpoint_set {
            self.inner.endpoint = default_endpoint(context);
        }
        self
    }

    pub fn version(mut self, version: CapabilityVersion) -> Self {
        self.inner.version = version;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.inner.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints_are_separated_by_context() {
        let normal = default_endpoint(SecurityContext::Normal);
        let secure = default_endpoint(SecurityContext::Secure);

        assert_ne!(normal, secure);
        assert!(normal.starts_with("/run/user"));
        assert!(normal.ends_with(Path::new(SERVICE_DIR).join(SOCKET_NAME)));
        assert_eq!(
            secure,
            Path::new("/run/sr-controller/secure/controller.sock")
        );
    }

    #[test]
    fn test_client_builder() {
        let config = ClientConfig::builder()
            .context(SecurityContext::Secure)
            .secure_endpoint("/tmp/secure.sock")
            .call_timeout(Duration::from_millis(250))
            .max_text_bytes(10)
            .build();

        assert_eq!(config.context(), SecurityContext::Secure);
        assert_eq!(config.secure_endpoint(), Path::new("/tmp/secure.sock"));
        assert_eq!(config.normal_endpoint(), default_endpoint(SecurityContext::Normal));
        assert!(!config.normal_endpoint_pinned());
        assert_eq!(config.call_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_text_bytes(), 10);
    }

    #[test]
    fn test_normal_endpoint_follows_runtime_dir_unless_pinned() {
        let config = ClientConfig::builder().runtime_dir("/tmp/users").build();
        assert_eq!(
            config.normal_endpoint(),
            user_endpoint(Path::new("/tmp/users"), effective_uid())
        );

        let config = ClientConfig::builder()
            .runtime_dir("/tmp/users")
            .normal_endpoint("/tmp/normal.sock")
            .build();
        assert!(config.normal_endpoint_pinned());
        assert_eq!(config.normal_endpoint(), Path::new("/tmp/normal.sock"));
    }

    #[test]
    fn test_user_endpoint_layout() {
        assert_eq!(
            user_endpoint(Path::new(RUNTIME_DIR), 1000),
            Path::new("/run/user/1000/sr-controller/controller.sock")
        );
    }

    #[test]
    fn test_client_defaults_are_bounded() {
        let config = ClientConfig::default();
        assert!(config.connect_timeout() <= config.call_timeout());
        assert!(config.call_timeout() <= config.speech_timeout());
        assert_eq!(config.max_text_bytes(), DEFAULT_MAX_TEXT_BYTES);
    }

    #[cfg(feature = "service")]
    #[test]
    fn test_service_context_moves_default_endpoint() {
        let config = ServiceConfig::builder()
            .context(SecurityContext::Secure)
            .build();
        assert_eq!(config.endpoint(), default_endpoint(SecurityContext::Secure));

        let config = ServiceConfig::builder()
            .endpoint("/tmp/custom.sock")
            .context(SecurityContext::Secure)
            .build();
        assert_eq!(config.endpoint(), Path::new("/tmp/custom.sock"));
    }
}
