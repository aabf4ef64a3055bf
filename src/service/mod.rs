//! Service host: the screen reader's end of the controller protocol
//!
//! A screen reader embeds a [`ServiceHost`] to accept controller
//! connections on its well-known endpoint and forwards each operation to its
//! [`ControllerHandler`].
//!
//! # Example
//!
//! ```rust,ignore
//! use sr_controller::service::{ServiceHost, ControllerHandler};
//! use sr_controller::ServiceConfig;
//!
//! let host = ServiceHost::bind(ServiceConfig::default(), MySpeech::new())?;
//! // ... run the screen reader; dropping `host` unregisters the endpoint
//! ```

mod handler;
mod router;
mod server;

pub use handler::ControllerHandler;
pub use server::ServiceHost;
