//! Application-facing response handler trait.

use async_trait::async_trait;
use serde_json::Value;

use tether_protocol::{ShadowRequestKind, ShadowResponseKind};

/// Callback invoked after the shadow has reconciled an inbound response.
///
/// Receives enough to discriminate acceptance from rejection without
/// inspecting shadow internals: the thing name, the request kind the
/// response belongs to, the response kind, and the parsed payload.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn on_response(
        &self,
        thing_name: &str,
        request: ShadowRequestKind,
        response: ShadowResponseKind,
        document: &Value,
    );
}

/// Adapter wrapping a plain closure as a [`ResponseHandler`].
pub struct FnResponseHandler<F>(F);

impl<F> FnResponseHandler<F>
where
    F: Fn(&str, ShadowRequestKind, ShadowResponseKind, &Value) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ResponseHandler for FnResponseHandler<F>
where
    F: Fn(&str, ShadowRequestKind, ShadowResponseKind, &Value) + Send + Sync,
{
    async fn on_response(
        &self,
        thing_name: &str,
        request: ShadowRequestKind,
        response: ShadowResponseKind,
        document: &Value,
    ) {
        (self.0)(thing_name, request, response, document);
    }
}
