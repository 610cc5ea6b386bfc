//! Shadow synchronizer error types.

use thiserror::Error;

use tether_mqtt::SessionError;

/// Errors that can occur during shadow operations.
///
/// A server-side "rejected" response is not an error here — it reaches
/// the application through the registered response callback.
#[derive(Debug, Error)]
pub enum ShadowError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("malformed shadow payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Convenience alias for shadow results.
pub type ShadowResult<T> = Result<T, ShadowError>;
