//! The four shadow document copies and their reconciliation rules.
//!
//! Device-side copies are mutated only by local application calls;
//! server-side copies only by inbound response handling. The store is
//! plain data — locking lives in [`crate::shadow::Shadow`].

use serde_json::{Map, Value, json};

use tether_protocol::document::{
    DeltaDocument, ShadowDocument, diff, empty_object, merge, object_is_empty,
};

#[derive(Debug)]
pub(crate) struct DocumentStore {
    device_reported: Value,
    device_desired: Value,
    server_reported: Value,
    server_desired: Value,
    version: u64,
    timestamp: Option<i64>,
    in_sync: bool,
}

impl DocumentStore {
    pub fn new() -> Self {
        let mut store = Self {
            device_reported: empty_object(),
            device_desired: empty_object(),
            server_reported: empty_object(),
            server_desired: empty_object(),
            version: 0,
            timestamp: None,
            in_sync: true,
        };
        store.recompute_sync();
        store
    }

    // ── Device-side mutation ──────────────────────────────────

    /// Merge an application-supplied document into the device copies.
    pub fn merge_device(&mut self, reported_patch: &Value, desired_patch: &Value) {
        merge(&mut self.device_reported, reported_patch);
        merge(&mut self.device_desired, desired_patch);
        self.recompute_sync();
    }

    /// Shallow diffs between the device copies and the last known
    /// server copies, for building an update request.
    pub fn update_diff(&self) -> (Value, Value) {
        (
            diff(&self.device_reported, &self.server_reported),
            diff(&self.device_desired, &self.server_desired),
        )
    }

    // ── Server-side reconciliation ────────────────────────────

    /// Replace the server copies with a full document from a get
    /// response. Returns false if the document is stale.
    pub fn apply_get_accepted(&mut self, document: &ShadowDocument) -> bool {
        if let Some(version) = document.version {
            if version < self.version {
                return false;
            }
            self.version = version;
        }
        self.server_reported = document.state.reported.clone();
        self.server_desired = document.state.desired.clone();
        self.timestamp = document.timestamp.or(self.timestamp);
        self.recompute_sync();
        true
    }

    /// Merge an update-accepted response into the server copies.
    /// Returns false if the document is stale — a genuine update always
    /// carries a version above the one already known.
    pub fn apply_update_accepted(&mut self, document: &ShadowDocument) -> bool {
        if let Some(version) = document.version {
            if self.version > 0 && version <= self.version {
                return false;
            }
            self.version = version;
        }
        merge(&mut self.server_reported, &document.state.reported);
        merge(&mut self.server_desired, &document.state.desired);
        self.timestamp = document.timestamp.or(self.timestamp);
        self.recompute_sync();
        true
    }

    /// Clear the server copies after a delete-accepted response. The
    /// device copies are untouched.
    pub fn apply_delete_accepted(&mut self) {
        self.server_reported = empty_object();
        self.server_desired = empty_object();
        self.version = 0;
        self.timestamp = None;
        self.recompute_sync();
    }

    /// Merge a delta push into the server desired copy. Returns false
    /// if the delta is stale.
    pub fn apply_delta(&mut self, delta: &DeltaDocument) -> bool {
        if let Some(version) = delta.version {
            if version < self.version {
                return false;
            }
            self.version = version;
        }
        merge(&mut self.server_desired, &delta.state);
        self.timestamp = delta.timestamp.or(self.timestamp);
        self.recompute_sync();
        true
    }

    // ── Snapshots ─────────────────────────────────────────────

    pub fn device_reported(&self) -> Value {
        self.device_reported.clone()
    }

    pub fn device_desired(&self) -> Value {
        self.device_desired.clone()
    }

    pub fn device_document(&self) -> Value {
        json!({
            "state": {
                "reported": self.device_reported,
                "desired": self.device_desired,
            }
        })
    }

    pub fn server_reported(&self) -> Value {
        self.server_reported.clone()
    }

    pub fn server_desired(&self) -> Value {
        self.server_desired.clone()
    }

    pub fn server_document(&self) -> Value {
        let mut document = Map::new();
        document.insert(
            "state".into(),
            json!({
                "reported": self.server_reported,
                "desired": self.server_desired,
            }),
        );
        document.insert("version".into(), json!(self.version));
        if let Some(timestamp) = self.timestamp {
            document.insert("timestamp".into(), json!(timestamp));
        }
        Value::Object(document)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn in_sync(&self) -> bool {
        self.in_sync
    }

    /// In sync when no field of device-desired differs from
    /// server-reported.
    fn recompute_sync(&mut self) {
        self.in_sync = object_is_empty(&diff(&self.device_desired, &self.server_reported));
    }
}
