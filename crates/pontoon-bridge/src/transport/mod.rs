//! Transport abstraction.
//!
//! The bridge core only needs a duplex conduit that can send one string and
//! notify subscribers of an arriving string. Every subscriber sees every
//! inbound message (broadcast); filtering by channel is the subscriber's job.

use std::sync::Arc;

use pontoon_common::{SubscriberToken, TransportError};

pub mod memory;

pub use memory::MemoryTransport;

/// Callback invoked once per inbound wire string.
pub type Subscriber = Arc<dyn Fn(&str) + Send + Sync>;

/// A duplex string conduit between the embedded web content and the host.
pub trait Transport: Send + Sync {
    /// Send one wire string to the peer. Fails once the conduit is closed.
    fn send(&self, wire: &str) -> Result<(), TransportError>;

    /// Attach a broadcast subscriber. The returned token removes it again.
    fn subscribe(&self, subscriber: Subscriber) -> SubscriberToken;

    /// Detach a subscriber. Unknown tokens are ignored.
    fn unsubscribe(&self, token: &SubscriberToken);

    /// Whether the current thread is the one that delivers inbound messages.
    ///
    /// A synchronous wait on the delivery thread can never be satisfied;
    /// callers use this to refuse instead of deadlocking.
    fn delivers_on_current_thread(&self) -> bool {
        false
    }
}
