use napi_derive::napi;
use sr_controller::{SpeechPriority, SsmlRequest, StatusCode, SymbolLevel, to_status};

/// Result of `getProcessId()`
#[napi(object)]
#[derive(Clone, Copy, Default)]
pub struct ProcessIdResult {
    /// 0 on success
    pub status: u32,
    /// Service process id, 0 when `status` is non-zero
    pub process_id: u32,
}

/// Speak plain text
#[napi]
pub fn speak_text(text: String) -> u32 {
    to_status(&sr_controller::speak_text(&text)).as_u32()
}

/// Speak SSML markup
///
/// `symbolLevel` defaults to -1 (unchanged), `priority` to 0 (normal) and
/// `asynchronous` to true.
#[napi]
pub fn speak_ssml(
    markup: String,
    symbol_level: Option<i32>,
    priority: Option<u32>,
    asynchronous: Option<bool>,
) -> u32 {
    let (Ok(symbol_level), Ok(priority)) = (
        SymbolLevel::try_from(symbol_level.unwrap_or(-1)),
        SpeechPriority::try_from(priority.unwrap_or(0)),
    ) else {
        return StatusCode::INVALID_PARAMETER.as_u32();
    };
    let request = SsmlRequest::new(markup)
        .symbol_level(symbol_level)
        .priority(priority)
        .asynchronous(asynchronous.unwrap_or(true));
    to_status(&sr_controller::speak_ssml(request)).as_u32()
}

/// Show a message on the braille display
#[napi]
pub fn braille_message(text: String) -> u32 {
    to_status(&sr_controller::braille_message(&text)).as_u32()
}

/// Stop speech
#[napi]
pub fn cancel_speech() -> u32 {
    to_status(&sr_controller::cancel_speech()).as_u32()
}

/// Service process id together with the status of the query
#[napi]
pub fn get_process_id() -> ProcessIdResult {
    match sr_controller::get_process_id() {
        Ok(pid) => ProcessIdResult {
            status: StatusCode::SUCCESS.as_u32(),
            process_id: pid,
        },
        Err(e) => ProcessIdResult {
            status: e.status().as_u32(),
            process_id: 0,
        },
    }
}

/// Check whether a service is reachable from this process's context
#[napi]
pub fn test_if_running() -> u32 {
    to_status(&sr_controller::test_if_running()).as_u32()
}
