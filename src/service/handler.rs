//! The screen reader's side of the controller operations

use crate::protocol::SsmlRequest;
use crate::status::StatusCode;

/// Implemented by the screen reader to act on controller requests
///
/// Methods are called on a blocking thread pool and may block; a
/// synchronous [`SsmlRequest`] is expected to return only after the markup
/// has been spoken. Returning an error sends that status word to the client
/// unchanged, e.g. [`StatusCode::NOT_READY`] while the screen reader is in
/// sleep mode or [`StatusCode::BUSY`].
///
/// # Example
///
/// ```rust,ignore
/// use sr_controller::service::ControllerHandler;
/// use sr_controller::StatusCode;
///
/// struct Speech;
///
/// impl ControllerHandler for Speech {
///     fn speak_text(&self, text: &str) -> Result<(), StatusCode> {
///         synth::queue(text);
///         Ok(())
///     }
///
///     fn braille_message(&self, text: &str) -> Result<(), StatusCode> {
///         braille::flash(text);
///         Ok(())
///     }
///
///     fn cancel_speech(&self) -> Result<(), StatusCode> {
///         synth::cancel();
///         Ok(())
///     }
/// }
/// ```
pub trait ControllerHandler: Send + Sync + 'static {
    /// Queue plain text for speech
    fn speak_text(&self, text: &str) -> Result<(), StatusCode>;

    /// Speak SSML markup
    fn speak_ssml(&self, request: &SsmlRequest) -> Result<(), StatusCode> {
        let _ = request;
        Err(StatusCode::UNKNOWN_INTERFACE)
    }

    /// Flash a message on the braille display
    fn braille_message(&self, text: &str) -> Result<(), StatusCode>;

    /// Stop speaking; must succeed when nothing is being spoken
    fn cancel_speech(&self) -> Result<(), StatusCode>;
}
