//! Message bridge between embedded web content and a native host.
//!
//! One shared string transport carries every message; the bridge splits it
//! into named logical channels:
//! - [`envelope`] — the JSON wire codec (call / reply / error reply)
//! - [`transport`] — the duplex conduit abstraction, plus an in-memory
//!   implementation with a real pump thread
//! - [`client`] — the web-content side: `invoke`, `invoke_sync`, `send`,
//!   channel pub/sub
//! - [`dispatcher`] — the host side: handler + listener registries and the
//!   inbound routing pipeline
//! - [`handlers`] — registration of the built-in channel set
//! - [`script`] — the JS snippet that sets up `window.bridge` in the page

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod handlers;
pub mod script;
pub mod transport;

pub use client::ClientBridge;
pub use config::BridgeConfig;
pub use dispatcher::Dispatcher;
pub use envelope::Envelope;
pub use handlers::{register_builtin_handlers, NativeServices};
pub use script::BRIDGE_INIT_SCRIPT;
pub use transport::{MemoryTransport, Transport};

pub use pontoon_common::{
    BridgeError, DecodeError, ListenerToken, Result, SubscriberToken, TransportError,
};
