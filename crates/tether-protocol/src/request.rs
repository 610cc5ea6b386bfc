//! Shadow request and response kinds.

use std::fmt;

/// The kind of shadow request a message belongs to.
///
/// `Delta` has no outbound request; it exists so delta pushes can be
/// routed and subscribed to like the other kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowRequestKind {
    Get,
    Update,
    Delete,
    Delta,
}

impl ShadowRequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Delta => "delta",
        }
    }
}

impl fmt::Display for ShadowRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of response the server sent for a shadow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowResponseKind {
    Accepted,
    Rejected,
    Delta,
}

impl ShadowResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Delta => "delta",
        }
    }
}

impl fmt::Display for ShadowResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
