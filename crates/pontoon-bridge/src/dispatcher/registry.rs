//! Handler and listener registries.
//!
//! Both registries are read on every dispatch and written only on
//! registration/removal, so they sit behind `std::sync::RwLock`: lookups take
//! the read lock and clone `Arc`s out before calling anything.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use pontoon_common::{BridgeError, ListenerToken};

/// Type-erased async handler: at most one per channel.
pub type Handler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, BridgeError>> + Send + Sync>;

/// Event listener: any number per channel, notified in registration order.
pub type Listener = Arc<dyn Fn(&[Value]) -> Result<(), BridgeError> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub handler: Handler,
    pub once: bool,
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    inner: RwLock<HashMap<String, HandlerEntry>>,
}

impl HandlerRegistry {
    /// Register a handler. A later registration on the same channel silently
    /// replaces the earlier one.
    pub fn insert(&self, channel: &str, handler: Handler, once: bool) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if map
            .insert(channel.to_string(), HandlerEntry { handler, once })
            .is_some()
        {
            debug!(channel, "handler replaced");
        } else {
            debug!(channel, "handler registered");
        }
    }

    pub fn get(&self, channel: &str) -> Option<HandlerEntry> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(channel).cloned()
    }

    pub fn remove(&self, channel: &str) -> bool {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(channel).is_some()
    }

    pub fn contains(&self, channel: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.contains_key(channel)
    }
}

#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub token: ListenerToken,
    pub listener: Listener,
    pub once: bool,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    inner: RwLock<HashMap<String, Vec<ListenerEntry>>>,
}

impl ListenerRegistry {
    pub fn insert(&self, channel: &str, listener: Listener, once: bool) -> ListenerToken {
        let token = ListenerToken::new();
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.entry(channel.to_string()).or_default().push(ListenerEntry {
            token: token.clone(),
            listener,
            once,
        });
        token
    }

    /// Clone the current entries for a channel, in registration order.
    pub fn snapshot(&self, channel: &str) -> Vec<ListenerEntry> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(channel).cloned().unwrap_or_default()
    }

    /// Remove one registration by token. Empty channels are pruned.
    pub fn remove(&self, token: &ListenerToken) -> bool {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        map.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|entry| &entry.token != token);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Remove all listeners for one channel, or every listener when `None`.
    pub fn remove_all(&self, channel: Option<&str>) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match channel {
            Some(channel) => {
                map.remove(channel);
            }
            None => map.clear(),
        }
    }

    pub fn has(&self, channel: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(channel).is_some_and(|entries| !entries.is_empty())
    }
}
