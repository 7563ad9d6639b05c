//! Host-side dispatcher.
//!
//! Owns the handler registry (one async function per channel, RPC-style) and
//! the listener registry (many functions per channel, event-style). A channel
//! can be both at once: an inbound call is always emitted to listeners, and
//! additionally invokes the handler if one is registered.
//!
//! Constructed once and shared by reference; there are no process-wide
//! statics.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use pontoon_common::{BridgeError, ListenerToken, Result};

use crate::config::BridgeConfig;

mod inbound;
mod registry;

pub use registry::{Handler, Listener};

use registry::{HandlerRegistry, ListenerRegistry};

pub struct Dispatcher {
    handlers: HandlerRegistry,
    listeners: ListenerRegistry,
    config: BridgeConfig,
}

impl Dispatcher {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            handlers: HandlerRegistry::default(),
            listeners: ListenerRegistry::default(),
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // -- Handlers (RPC) --

    /// Register the handler for a channel. Replaces any prior handler for
    /// that channel without complaint; last registration wins.
    pub fn handle<F, Fut>(&self, channel: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handlers.insert(channel, erase(handler), false);
    }

    /// Register a handler that unregisters itself after its first completed
    /// invocation.
    pub fn handle_once<F, Fut>(&self, channel: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handlers.insert(channel, erase(handler), true);
    }

    pub fn remove_handler(&self, channel: &str) -> bool {
        self.handlers.remove(channel)
    }

    pub fn has_handler(&self, channel: &str) -> bool {
        self.handlers.contains(channel)
    }

    /// Look up and await the handler for a channel.
    ///
    /// Programmatic invocation fails loudly with [`BridgeError::HandlerNotFound`];
    /// by contrast an *inbound* call with no handler is routed silently as an
    /// event (see [`Dispatcher::attach`]).
    pub async fn invoke(&self, channel: &str, args: Vec<Value>) -> Result<Value> {
        let entry = self
            .handlers
            .get(channel)
            .ok_or_else(|| BridgeError::HandlerNotFound(channel.to_string()))?;

        debug!(channel, args = args.len(), "invoking handler");
        let result = (entry.handler)(args).await;
        if entry.once {
            self.handlers.remove(channel);
        }
        result
    }

    // -- Listeners (events) --

    /// Register a listener. Returns the token that removes it again.
    pub fn on<F>(&self, channel: &str, listener: F) -> ListenerToken
    where
        F: Fn(&[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.listeners.insert(channel, Arc::new(listener), false)
    }

    /// Register a listener that is removed after its first delivery.
    pub fn once<F>(&self, channel: &str, listener: F) -> ListenerToken
    where
        F: Fn(&[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.listeners.insert(channel, Arc::new(listener), true)
    }

    /// Remove one listener by its registration token.
    pub fn off(&self, token: &ListenerToken) -> bool {
        self.listeners.remove(token)
    }

    /// Remove every listener for a channel, or all listeners when `None`.
    pub fn remove_all_listeners(&self, channel: Option<&str>) {
        self.listeners.remove_all(channel);
    }

    pub fn has_listeners(&self, channel: &str) -> bool {
        self.listeners.has(channel)
    }

    /// Synchronously notify every listener for a channel, in registration
    /// order. A failing listener is logged and skipped; later listeners still
    /// run. Returns how many listeners were notified.
    pub fn emit(&self, channel: &str, args: &[Value]) -> usize {
        let mut notified = 0;
        for entry in self.listeners.snapshot(channel) {
            // A once entry can appear in the snapshots of concurrent emits;
            // removing its token up front makes whichever emit claims it the
            // sole caller.
            if entry.once && !self.listeners.remove(&entry.token) {
                continue;
            }
            if let Err(e) = (entry.listener)(args) {
                warn!(channel, error = %e, "listener failed");
            }
            notified += 1;
        }
        notified
    }
}

fn erase<F, Fut>(handler: F) -> Handler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |args| {
        Box::pin(handler(args)) as futures_util::future::BoxFuture<'static, Result<Value>>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn dispatcher() -> Arc<Dispatcher> {
        Dispatcher::new(BridgeConfig::default())
    }

    // -- Handlers --

    #[tokio::test]
    async fn invoke_returns_handler_result() {
        let dispatcher = dispatcher();
        dispatcher.handle("echo", |args| async move {
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        });

        let result = dispatcher.invoke("echo", vec![json!("hi")]).await.unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[tokio::test]
    async fn invoke_without_handler_fails() {
        let dispatcher = dispatcher();
        let err = dispatcher.invoke("nope", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::HandlerNotFound(ref c) if c == "nope"));
    }

    #[tokio::test]
    async fn duplicate_registration_silently_replaces() {
        let dispatcher = dispatcher();
        dispatcher.handle("version", |_| async { Ok(json!("1.0.0")) });
        dispatcher.handle("version", |_| async { Ok(json!("2.0.0")) });

        let result = dispatcher.invoke("version", vec![]).await.unwrap();
        assert_eq!(result, json!("2.0.0"));
    }

    #[tokio::test]
    async fn handler_failure_propagates() {
        let dispatcher = dispatcher();
        dispatcher.handle("readFile", |_| async {
            Err(BridgeError::Handler("no such file".into()))
        });

        let err = dispatcher.invoke("readFile", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::Handler(ref m) if m == "no such file"));
    }

    #[tokio::test]
    async fn handle_once_unregisters_after_first_invocation() {
        let dispatcher = dispatcher();
        dispatcher.handle_once("boot", |_| async { Ok(json!("ready")) });

        assert!(dispatcher.has_handler("boot"));
        let result = dispatcher.invoke("boot", vec![]).await.unwrap();
        assert_eq!(result, json!("ready"));
        assert!(!dispatcher.has_handler("boot"));

        let err = dispatcher.invoke("boot", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::HandlerNotFound(_)));
    }

    #[tokio::test]
    async fn remove_handler_works() {
        let dispatcher = dispatcher();
        dispatcher.handle("status", |_| async { Ok(json!("Running")) });
        assert!(dispatcher.remove_handler("status"));
        assert!(!dispatcher.has_handler("status"));
    }

    // -- Listeners --

    #[test]
    fn emit_delivers_in_registration_order() {
        let dispatcher = dispatcher();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            dispatcher.on("tick", move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            });
        }

        let notified = dispatcher.emit("tick", &[]);
        assert_eq!(notified, 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_listener_does_not_block_later_ones() {
        let dispatcher = dispatcher();
        let reached = Arc::new(AtomicUsize::new(0));

        dispatcher.on("tick", |_| Err(BridgeError::Listener("bad listener".into())));
        {
            let reached = reached.clone();
            dispatcher.on("tick", move |_| {
                reached.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let notified = dispatcher.emit("tick", &[]);
        assert_eq!(notified, 2);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn once_listener_fires_exactly_once() {
        let dispatcher = dispatcher();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            dispatcher.once("tick", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        dispatcher.emit("tick", &[]);
        dispatcher.emit("tick", &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!dispatcher.has_listeners("tick"));
    }

    #[test]
    fn once_listener_fires_once_across_concurrent_emits() {
        let dispatcher = dispatcher();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            dispatcher.once("tick", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let emitters: Vec<_> = (0..2)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    dispatcher.emit("tick", &[])
                })
            })
            .collect();

        let total: usize = emitters.into_iter().map(|t| t.join().unwrap()).sum();
        assert_eq!(total, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_by_token() {
        let dispatcher = dispatcher();
        let count = Arc::new(AtomicUsize::new(0));
        let token = {
            let count = count.clone();
            dispatcher.on("tick", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        assert!(dispatcher.off(&token));
        dispatcher.emit("tick", &[]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn emit_passes_args_through() {
        let dispatcher = dispatcher();
        let seen = Arc::new(Mutex::new(None));
        {
            let seen = seen.clone();
            dispatcher.on("open", move |args| {
                *seen.lock().unwrap() = Some(args.to_vec());
                Ok(())
            });
        }

        dispatcher.emit("open", &[json!("/tmp"), json!(7)]);
        assert_eq!(
            seen.lock().unwrap().clone().unwrap(),
            vec![json!("/tmp"), json!(7)]
        );
    }

    #[test]
    fn channel_can_be_both_endpoint_and_topic() {
        let dispatcher = dispatcher();
        dispatcher.handle("save", |_| async { Ok(json!("saved")) });
        dispatcher.on("save", |_| Ok(()));

        assert!(dispatcher.has_handler("save"));
        assert!(dispatcher.has_listeners("save"));
    }
}
