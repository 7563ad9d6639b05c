//! Opaque registration tokens.
//!
//! Listener and subscriber registrations hand back a token; removal is by
//! token lookup, never by comparing the registered closure against a
//! reconstructed one.

use serde::{Deserialize, Serialize};
use std::fmt;

fn new_token_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Identifies one listener registration on a bridge or dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerToken(String);

impl ListenerToken {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(new_token_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one raw subscription on a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberToken(String);

impl SubscriberToken {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(new_token_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
