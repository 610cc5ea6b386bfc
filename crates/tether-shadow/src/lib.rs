//! Device shadow synchronizer.
//!
//! Keeps a local shadow document (device-reported and device-desired
//! state) synchronized with the server-held copy over an MQTT session:
//! - `Shadow` — issues Get/Update/Delete requests with client tokens
//!   and reconciles accepted/rejected/delta responses
//! - `ResponseHandler` — per-request-kind application callbacks
//! - stale responses (older `version` than already known) are discarded

mod documents;
pub mod error;
pub mod handler;
pub mod shadow;

pub use error::{ShadowError, ShadowResult};
pub use handler::{FnResponseHandler, ResponseHandler};
pub use shadow::Shadow;

pub use tether_protocol::{ShadowRequestKind, ShadowResponseKind};
