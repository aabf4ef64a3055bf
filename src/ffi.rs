//! C ABI for callers in other languages
//!
//! Every function returns a `uint32_t` status word (0 on success, see
//! [`StatusCode`]). Strings are UTF-8, NUL-terminated and owned by the
//! caller; they are only read, and never past the payload limit plus one
//! byte.
//!
//! ```c
//! uint32_t srController_speakText(const char *text);
//! uint32_t srController_speakSsml(const char *markup, int32_t symbolLevel,
//!                                 uint32_t priority, bool asynchronous);
//! uint32_t srController_brailleMessage(const char *text);
//! uint32_t srController_cancelSpeech(void);
//! uint32_t srController_getProcessId(uint32_t *pid);
//! uint32_t srController_testIfRunning(void);
//! ```

#![allow(non_snake_case)]

use std::ffi::c_char;
use std::panic::{self, AssertUnwindSafe};

use crate::client::{Controller, default_controller};
use crate::error::{Result, to_status};
use crate::protocol::{SpeechPriority, SsmlRequest, SymbolLevel};
use crate::status::StatusCode;

/// Run `f`, turning a panic into a status instead of unwinding into C
fn guarded(f: impl FnOnce() -> StatusCode) -> u32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status.as_u32(),
        Err(_) => {
            tracing::error!("panic inside controller call");
            StatusCode::CALL_FAILED.as_u32()
        }
    }
}

/// Borrow a caller-owned C string, reading at most `max_len + 1` bytes
///
/// # Safety
/// `ptr` must be null or point to memory readable up to its NUL terminator
/// or `max_len + 1` bytes, whichever comes first.
unsafe fn borrow_str<'a>(ptr: *const c_char, max_len: usize) -> std::result::Result<&'a str, StatusCode> {
    if ptr.is_null() {
        return Err(StatusCode::INVALID_PARAMETER);
    }
    // SAFETY: upheld by the caller; strnlen stops at the bound.
    let len = unsafe { libc::strnlen(ptr, max_len.saturating_add(1)) };
    if len > max_len {
        return Err(StatusCode::INVALID_PARAMETER);
    }
    // SAFETY: `len` bytes before the terminator were just scanned.
    let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
    std::str::from_utf8(bytes).map_err(|_| StatusCode::INVALID_PARAMETER)
}

fn status_of<T>(result: Result<T>) -> StatusCode {
    to_status(&result)
}

/// Speak `text`
///
/// # Safety
/// `text` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn srController_speakText(text: *const c_char) -> u32 {
    // SAFETY: forwarded from the caller.
    guarded(|| unsafe { speak_text_on(default_controller(), text) })
}

/// Speak SSML markup
///
/// `symbolLevel` is one of 0, 100, 200, 300, 1000 or -1 (unchanged);
/// `priority` is 0 (normal), 1 (next) or 2 (now).
///
/// # Safety
/// `markup` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn srController_speakSsml(
    markup: *const c_char,
    symbolLevel: i32,
    priority: u32,
    asynchronous: bool,
) -> u32 {
    // SAFETY: forwarded from the caller.
    guarded(|| unsafe {
        speak_ssml_on(default_controller(), markup, symbolLevel, priority, asynchronous)
    })
}

/// Show `text` on the braille display
///
/// # Safety
/// `text` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn srController_brailleMessage(text: *const c_char) -> u32 {
    // SAFETY: forwarded from the caller.
    guarded(|| unsafe { braille_message_on(default_controller(), text) })
}

/// Stop speech
#[unsafe(no_mangle)]
pub extern "C" fn srController_cancelSpeech() -> u32 {
    guarded(|| status_of(default_controller().cancel_speech()))
}

/// Store the service's process id in `*pid`
///
/// `*pid` is written only on success.
///
/// # Safety
/// `pid` must be null or valid for a `uint32_t` write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn srController_getProcessId(pid: *mut u32) -> u32 {
    // SAFETY: forwarded from the caller.
    guarded(|| unsafe { process_id_on(default_controller(), pid) })
}

/// Check that a service is reachable from the caller's context
#[unsafe(no_mangle)]
pub extern "C" fn srController_testIfRunning() -> u32 {
    guarded(|| status_of(default_controller().test_if_running()))
}

unsafe fn speak_text_on(controller: &Controller, text: *const c_char) -> StatusCode {
    // SAFETY: upheld by the exported caller.
    match unsafe { borrow_str(text, controller.config().max_text_bytes()) } {
        Ok(text) => status_of(controller.speak_text(text)),
        Err(status) => status,
    }
}

unsafe fn speak_ssml_on(
    controller: &Controller,
    markup: *const c_char,
    symbol_level: i32,
    priority: u32,
    asynchronous: bool,
) -> StatusCode {
    // SAFETY: upheld by the exported caller.
    let markup = match unsafe { borrow_str(markup, controller.config().max_text_bytes()) } {
        Ok(markup) => markup,
        Err(status) => return status,
    };
    let (Ok(symbol_level), Ok(priority)) = (
        SymbolLevel::try_from(symbol_level),
        SpeechPriority::try_from(priority),
    ) else {
        return StatusCode::INVALID_PARAMETER;
    };
    let request = SsmlRequest::new(markup)
        .symbol_level(symbol_level)
        .priority(priority)
        .asynchronous(asynchronous);
    status_of(controller.speak_ssml(request))
}

unsafe fn braille_message_on(controller: &Controller, text: *const c_char) -> StatusCode {
    // SAFETY: upheld by the exported caller.
    match unsafe { borrow_str(text, controller.config().max_text_bytes()) } {
        Ok(text) => status_of(controller.braille_message(text)),
        Err(status) => status,
    }
}

unsafe fn process_id_on(controller: &Controller, pid: *mut u32) -> StatusCode {
    if pid.is_null() {
        return StatusCode::INVALID_PARAMETER;
    }
    match controller.get_process_id() {
        Ok(value) => {
            // SAFETY: checked non-null; validity upheld by the caller.
            unsafe { pid.write(value) };
            StatusCode::SUCCESS
        }
        Err(e) => e.status(),
    }
}
