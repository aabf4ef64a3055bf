//! Public call surface
//!
//! Each operation runs locate → connect → invoke and returns one result. A
//! [`Controller`] keeps at most one idle [`ServiceHandle`] for reuse. Callers
//! check it out under a short lock, so concurrent threads never share a
//! socket and never see a half-replaced handle; a thread that finds the slot
//! empty simply opens its own connection.

use std::sync::{Mutex, OnceLock};

use crate::bridge::{self, ServiceHandle};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::locator;
use crate::marshal::{self, Reply};
use crate::protocol::{Request, SsmlRequest};

/// Client for the screen reader service
#[derive(Debug)]
pub struct Controller {
    config: ClientConfig,
    cached: Mutex<Option<ServiceHandle>>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    /// Controller with the default endpoints and timeouts
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queue `text` for speech
    pub fn speak_text(&self, text: &str) -> Result<()> {
        self.call(&Request::SpeakText(text.to_string())).map(drop)
    }

    /// Speak SSML markup
    ///
    /// With `asynchronous` unset this returns only once the markup has been
    /// spoken, or with [`StatusCode::CANCELLED`](crate::StatusCode::CANCELLED)
    /// if speech was cancelled first.
    pub fn speak_ssml(&self, request: SsmlRequest) -> Result<()> {
        self.call(&Request::SpeakSsml(request)).map(drop)
    }

    /// Flash `text` on the braille display
    pub fn braille_message(&self, text: &str) -> Result<()> {
        self.call(&Request::BrailleMessage(text.to_string()))
            .map(drop)
    }

    /// Stop current speech; succeeds when nothing is being spoken
    pub fn cancel_speech(&self) -> Result<()> {
        self.call(&Request::CancelSpeech).map(drop)
    }

    /// Process id of the service
    pub fn get_process_id(&self) -> Result<u32> {
        match self.call(&Request::GetProcessId)? {
            Reply::ProcessId(pid) => Ok(pid),
            Reply::Done => Err(Error::InvalidProtocol(
                "process id reply carried no value".to_string(),
            )),
        }
    }

    /// Whether a service in the caller's context is running and answering
    pub fn test_if_running(&self) -> Result<()> {
        let handle = self.checkout()?;
        self.checkin(handle);
        Ok(())
    }

    /// Run one request through the cached or a fresh connection
    pub fn call(&self, request: &Request) -> Result<Reply> {
        marshal::validate(request, self.config.max_text_bytes())?;

        let mut handle = self.checkout()?;
        let result = marshal::invoke(&mut handle, request);
        if let Err(e) = &result {
            tracing::debug!(method = request.method(), error = %e, "request failed");
        }
        self.checkin(handle);
        result
    }

    /// Drop the cached connection, if any
    pub fn disconnect(&self) {
        if let Ok(mut slot) = self.cached.lock() {
            slot.take();
        }
    }

    /// Take the cached handle if it is still usable, otherwise connect anew
    fn checkout(&self) -> Result<ServiceHandle> {
        let caller = self.config.context();
        let cached = self.cached.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = cached {
            if handle.is_fresh_for(caller) {
                return Ok(handle);
            }
            tracing::debug!("discarding stale service handle");
        }

        let endpoint = locator::locate(&self.config).ok_or(Error::NotRunning)?;
        bridge::connect(&endpoint, &self.config)
    }

    /// Park a healthy handle for the next call; broken ones are dropped
    fn checkin(&self, handle: ServiceHandle) {
        if !handle.is_connected() {
            return;
        }
        if let Ok(mut slot) = self.cached.lock() {
            if slot.is_none() {
                *slot = Some(handle);
            }
        }
    }
}

/// The process-wide controller used by the free functions and the C ABI
pub fn default_controller() -> &'static Controller {
    static DEFAULT: OnceLock<Controller> = OnceLock::new();
    DEFAULT.get_or_init(Controller::new)
}

/// [`Controller::speak_text`] on the default controller
pub fn speak_text(text: &str) -> Result<()> {
    default_controller().speak_text(text)
}

/// [`Controller::speak_ssml`] on the default controller
pub fn speak_ssml(request: SsmlRequest) -> Result<()> {
    default_controller().speak_ssml(request)
}

/// [`Controller::braille_message`] on the default controller
pub fn braille_message(text: &str) -> Result<()> {
    default_controller().braille_message(text)
}

/// [`Controller::cancel_speech`] on the default controller
pub fn cancel_speech() -> Result<()> {
    default_controller().cancel_speech()
}

/// [`Controller::get_process_id`] on the default controller
pub fn get_process_id() -> Result<u32> {
    default_controller().get_process_id()
}

/// [`Controller::test_if_running`] on the default controller
pub fn test_if_running() -> Result<()> {
    default_controller().test_if_running()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::context::SecurityContext;
    use crate::status::StatusCode;

    fn unreachable_controller() -> (tempfile::TempDir, Controller) {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::builder()
            .context(SecurityContext::Normal)
            .normal_endpoint(dir.path().join("normal.sock"))
            .secure_endpoint(dir.path().join("secure.sock"))
            .build();
        (dir, Controller::with_config(config))
    }

    #[test]
    fn test_no_service_is_server_unavailable() {
        let (_dir, controller) = unreachable_controller();

        let started = Instant::now();
        let err = controller.speak_text("hello").unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVER_UNAVAILABLE);
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(matches!(controller.test_if_running(), Err(Error::NotRunning)));
    }

    #[test]
    fn test_validation_happens_before_discovery() {
        let (_dir, controller) = unreachable_controller();
        let oversized = "x".repeat(controller.config().max_text_bytes() + 1);

        let err = controller.speak_text(&oversized).unwrap_err();
        assert_eq!(err.status(), StatusCode::INVALID_PARAMETER);
    }
}
