//! Shared harness for end-to-end tests: a mock channel, a shadow bound
//! to it, and recording response handlers for every request kind.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use tether_mqtt::{Channel, MockChannel};
use tether_shadow::{
    FnResponseHandler, ResponseHandler, Shadow, ShadowRequestKind, ShadowResponseKind,
};

pub const THING: &str = "thermostat-01";
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One recorded application callback invocation.
pub type Recorded = (ShadowRequestKind, ShadowResponseKind, Value);

pub struct TestHarness {
    pub mock: Arc<MockChannel>,
    pub shadow: Shadow,
    pub responses: Arc<Mutex<Vec<Recorded>>>,
}

impl TestHarness {
    /// Harness with recording handlers registered for get, update,
    /// delete, and delta.
    pub async fn new() -> Self {
        let mock = Arc::new(MockChannel::new());
        let shadow = Shadow::new(mock.clone() as Arc<dyn Channel>, TIMEOUT, THING, THING);
        let responses: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));

        let mut mapping: HashMap<ShadowRequestKind, Arc<dyn ResponseHandler>> = HashMap::new();
        for kind in [
            ShadowRequestKind::Get,
            ShadowRequestKind::Update,
            ShadowRequestKind::Delete,
            ShadowRequestKind::Delta,
        ] {
            let sink = responses.clone();
            mapping.insert(
                kind,
                Arc::new(FnResponseHandler::new(
                    move |_: &str,
                          request: ShadowRequestKind,
                          response: ShadowResponseKind,
                          document: &Value| {
                        sink.lock()
                            .unwrap()
                            .push((request, response, document.clone()));
                    },
                )),
            );
        }
        shadow
            .add_subscription(mapping)
            .await
            .expect("handler registration");

        Self {
            mock,
            shadow,
            responses,
        }
    }

    /// Client token of the most recently published request.
    pub fn last_request_token(&self) -> String {
        let message = self.mock.last_published().expect("a request was published");
        let payload: Value = serde_json::from_slice(&message.payload).unwrap();
        payload["clientToken"].as_str().unwrap().to_string()
    }

    /// Deliver an inbound JSON payload on a topic, returning the number
    /// of handlers invoked.
    pub async fn deliver(&self, topic: &str, payload: &Value) -> usize {
        self.mock
            .deliver(topic, &serde_json::to_vec(payload).unwrap())
            .await
    }

    /// Recorded callback invocations so far.
    pub fn recorded(&self) -> Vec<Recorded> {
        self.responses.lock().unwrap().clone()
    }
}
