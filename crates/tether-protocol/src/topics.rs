//! MQTT topic builders and parsers for the device shadow topic hierarchy.
//!
//! Topic structure (per thing):
//! ```text
//! $aws/things/{thing}/shadow/get
//! $aws/things/{thing}/shadow/get/accepted
//! $aws/things/{thing}/shadow/get/rejected
//! $aws/things/{thing}/shadow/update
//! $aws/things/{thing}/shadow/update/accepted
//! $aws/things/{thing}/shadow/update/rejected
//! $aws/things/{thing}/shadow/update/delta
//! $aws/things/{thing}/shadow/delete
//! $aws/things/{thing}/shadow/delete/accepted
//! $aws/things/{thing}/shadow/delete/rejected
//! ```

use crate::request::{ShadowRequestKind, ShadowResponseKind};

const PREFIX: &str = "$aws/things";

// ─── Request topics ───

pub fn get(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/get")
}

pub fn update(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/update")
}

pub fn delete(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/delete")
}

// ─── Response topics ───

pub fn get_accepted(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/get/accepted")
}

pub fn get_rejected(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/get/rejected")
}

pub fn update_accepted(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/update/accepted")
}

pub fn update_rejected(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/update/rejected")
}

pub fn update_delta(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/update/delta")
}

pub fn delete_accepted(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/delete/accepted")
}

pub fn delete_rejected(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/shadow/delete/rejected")
}

// ─── Topic parsing ───

/// Parsed shadow response topic components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedShadowTopic {
    pub thing_name: String,
    pub request: ShadowRequestKind,
    pub response: ShadowResponseKind,
}

/// Parse a shadow response topic into its components.
///
/// Only response topics (accepted/rejected/delta) parse; bare request
/// topics return `None` since a device never receives them.
pub fn parse_shadow_topic(topic: &str) -> Option<ParsedShadowTopic> {
    let rest = topic.strip_prefix(PREFIX)?.strip_prefix('/')?;
    let parts: Vec<&str> = rest.split('/').collect();

    // {thing}/shadow/{operation}/{result}
    if parts.len() != 4 || parts[1] != "shadow" {
        return None;
    }

    let thing_name = parts[0].to_string();
    let (request, response) = match (parts[2], parts[3]) {
        ("get", "accepted") => (ShadowRequestKind::Get, ShadowResponseKind::Accepted),
        ("get", "rejected") => (ShadowRequestKind::Get, ShadowResponseKind::Rejected),
        ("update", "accepted") => (ShadowRequestKind::Update, ShadowResponseKind::Accepted),
        ("update", "rejected") => (ShadowRequestKind::Update, ShadowResponseKind::Rejected),
        ("update", "delta") => (ShadowRequestKind::Delta, ShadowResponseKind::Delta),
        ("delete", "accepted") => (ShadowRequestKind::Delete, ShadowResponseKind::Accepted),
        ("delete", "rejected") => (ShadowRequestKind::Delete, ShadowResponseKind::Rejected),
        _ => return None,
    };

    Some(ParsedShadowTopic {
        thing_name,
        request,
        response,
    })
}

// ─── Topic filter matching ───

/// Match a concrete topic against a subscription filter with MQTT
/// wildcards (`+` single level, `#` multi level).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(expected), Some(level)) if expected == level => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
