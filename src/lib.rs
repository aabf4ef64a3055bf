//! sr-controller - control a running screen reader from any application
//!
//! This library lets a host application ask a long-running screen reader
//! service to speak text, speak SSML, flash a braille message, stop speech,
//! or report its process id. Every operation is a single synchronous request
//! over a local Unix domain socket and produces one [`StatusCode`]: zero for
//! success, a well-known Windows system/RPC error number otherwise.
//!
//! # Example
//!
//! ```rust,ignore
//! use sr_controller::{Controller, SsmlRequest, SpeechPriority, StatusCode};
//!
//! let controller = Controller::new();
//! match controller.speak_text("Build finished") {
//!     Ok(()) => {}
//!     Err(e) if e.status() == StatusCode::SERVER_UNAVAILABLE => {
//!         // no screen reader running, nothing to do
//!     }
//!     Err(e) => eprintln!("speech failed: {e}"),
//! }
//!
//! controller.speak_ssml(
//!     SsmlRequest::new("<speak>Done <mark name=\"end\"/></speak>")
//!         .priority(SpeechPriority::Now),
//! )?;
//! ```
//!
//! # Security contexts
//!
//! A screen reader may run a separate instance on the secure desktop (login
//! and lock screens). A client only ever talks to the instance in its own
//! [`SecurityContext`]; reaching across returns
//! [`StatusCode::ACCESS_DENIED`] before any request payload is sent.
//!
//! # Other languages
//!
//! The crate builds as a `cdylib` exporting a flat C ABI (`srController_*`,
//! see [`ffi`]) that returns the same status words.

#[cfg(not(unix))]
compile_error!("sr-controller talks to the service over Unix domain sockets and needs a unix target");

mod bridge;
mod client;
mod config;
mod context;
mod error;
pub mod ffi;
mod locator;
mod marshal;
mod platform;
mod protocol;
#[cfg(feature = "service")]
pub mod service;
mod status;

// Re-export public types
pub use bridge::{ConnectionState, ServiceHandle, connect};
pub use client::{
    Controller, braille_message, cancel_speech, default_controller, get_process_id, speak_ssml,
    speak_text, test_if_running,
};
#[cfg(feature = "service")]
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use config::{
    ClientConfig, ClientConfigBuilder, DEFAULT_MAX_TEXT_BYTES, RUNTIME_DIR, SERVICE_DIR,
    SOCKET_NAME, default_endpoint, user_endpoint,
};
pub use context::SecurityContext;
pub use error::{Error, Result, to_status};
pub use locator::{ServiceEndpoint, locate};
pub use marshal::{Reply, invoke, validate};
pub use protocol::{CapabilityVersion, Request, SpeechPriority, SsmlRequest, SymbolLevel};
pub use status::StatusCode;
