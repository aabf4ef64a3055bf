//! Node.js bindings for the sr-controller screen reader client
//!
//! Functions are exported in camelCase (`speakText`, `getProcessId`, ...).
//! Every function returns the numeric status word of the operation, so
//! JavaScript callers compare against the same codes as C callers.

#![deny(clippy::all)]

mod controller;

pub use controller::{
    ProcessIdResult, braille_message, cancel_speech, get_process_id, speak_ssml, speak_text,
    test_if_running,
};
