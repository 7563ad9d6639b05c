//! Client-side bridge.
//!
//! The counterpart of the host dispatcher: promise-style `invoke`, blocking
//! `invoke_sync`, fire-and-forget `send`, and channel-scoped pub/sub over one
//! shared transport.
//!
//! Reply correlation is by channel name only — the wire protocol carries no
//! per-call id. Two calls outstanding on the same channel race for whichever
//! reply arrives first; that is a documented protocol limitation, not a bug
//! in this bridge.

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use pontoon_common::{BridgeError, ListenerToken, Result, SubscriberToken, TransportError};

use crate::config::BridgeConfig;
use crate::envelope::Envelope;
use crate::transport::Transport;

pub struct ClientBridge {
    transport: Arc<dyn Transport>,
    config: BridgeConfig,
    /// Maps listener tokens to (channel, raw transport subscription).
    listeners: Mutex<HashMap<ListenerToken, (String, SubscriberToken)>>,
}

impl ClientBridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, BridgeConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        Self {
            transport,
            config,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    // -- Calls --

    /// Send a call and await the first reply on the same channel.
    ///
    /// Resolves with the reply's result, or fails on an error reply, an
    /// undecodable inbound message, or a closed transport. No default
    /// timeout: a reply that never comes means this future never resolves.
    pub async fn invoke(&self, channel: &str, args: Vec<Value>) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let _guard = self.guarded_one_shot(channel, move |outcome| {
            if let Some(tx) = slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = tx.send(outcome);
            }
        });

        self.send_call(channel, args)?;
        rx.await
            .map_err(|_| BridgeError::Transport(TransportError::Closed))?
    }

    /// Send a call and block the calling thread until the reply arrives or
    /// the configured deadline elapses.
    pub fn invoke_sync(&self, channel: &str, args: Vec<Value>) -> Result<Value> {
        self.invoke_sync_timeout(channel, args, self.config.sync_timeout())
    }

    /// As [`invoke_sync`](Self::invoke_sync) with an explicit deadline.
    ///
    /// Waits on a single-shot channel rather than spinning, and refuses to
    /// run on the transport's delivery thread — a wait there could never be
    /// satisfied, because this thread is the one that would deliver the reply.
    pub fn invoke_sync_timeout(
        &self,
        channel: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.transport.delivers_on_current_thread() {
            return Err(BridgeError::WouldDeadlock);
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let slot = Arc::new(Mutex::new(Some(tx)));
        let _guard = self.guarded_one_shot(channel, move |outcome| {
            if let Some(tx) = slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = tx.send(outcome);
            }
        });

        self.send_call(channel, args)?;
        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Fire-and-forget call. No reply tracking; a no-op for the peer if
    /// nothing is listening over there.
    pub fn send(&self, channel: &str, args: Vec<Value>) -> Result<()> {
        self.send_call(channel, args)
    }

    /// Alias of [`send`](Self::send), kept for parity with the injected
    /// script's `sendToHost`.
    pub fn send_to_host(&self, channel: &str, args: Vec<Value>) -> Result<()> {
        self.send_call(channel, args)
    }

    // -- Pub/sub --

    /// Register a listener for every inbound envelope (call or reply) on a
    /// channel. Removal is by the returned token only.
    pub fn on<F>(&self, channel: &str, listener: F) -> ListenerToken
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let chan = channel.to_string();
        let subscription = self.transport.subscribe(Arc::new(move |raw| {
            if let Ok(envelope) = Envelope::decode(raw) {
                if envelope.channel() == chan {
                    listener(&envelope);
                }
            }
        }));
        self.track(channel, subscription)
    }

    /// As [`on`](Self::on), but the listener detaches itself after its first
    /// matching delivery.
    pub fn once<F>(&self, channel: &str, listener: F) -> ListenerToken
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let chan = channel.to_string();
        let transport = Arc::downgrade(&self.transport);
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let subscription_cell: Arc<Mutex<Option<SubscriberToken>>> =
            Arc::new(Mutex::new(None));

        let cell = subscription_cell.clone();
        let fired_in_callback = fired.clone();
        let subscription = self.transport.subscribe(Arc::new(move |raw| {
            let Ok(envelope) = Envelope::decode(raw) else {
                return;
            };
            if envelope.channel() != chan {
                return;
            }
            if fired_in_callback.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            listener(&envelope);
            // The token may not be stored yet if the first delivery races
            // registration; whoever finds it detaches the subscription.
            let taken = cell.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let (Some(token), Some(transport)) = (taken, transport.upgrade()) {
                transport.unsubscribe(&token);
            }
        }));

        let mut slot = subscription_cell.lock().unwrap_or_else(|e| e.into_inner());
        if fired.load(std::sync::atomic::Ordering::SeqCst) {
            self.transport.unsubscribe(&subscription);
        } else {
            *slot = Some(subscription.clone());
        }
        drop(slot);
        self.track(channel, subscription)
    }

    /// Remove one listener by its registration token.
    pub fn remove_listener(&self, token: &ListenerToken) -> bool {
        let entry = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token);
        match entry {
            Some((channel, subscription)) => {
                debug!(channel = %channel, "listener removed");
                self.transport.unsubscribe(&subscription);
                true
            }
            None => false,
        }
    }

    /// Remove every listener registered for a channel.
    pub fn remove_all_listeners(&self, channel: &str) {
        let mut map = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let tokens: Vec<ListenerToken> = map
            .iter()
            .filter(|(_, (chan, _))| chan == channel)
            .map(|(token, _)| token.clone())
            .collect();
        for token in tokens {
            if let Some((_, subscription)) = map.remove(&token) {
                self.transport.unsubscribe(&subscription);
            }
        }
    }

    // -- Internals --

    fn send_call(&self, channel: &str, args: Vec<Value>) -> Result<()> {
        let wire = Envelope::call(channel, args).encode();
        self.transport.send(&wire)?;
        Ok(())
    }

    /// Subscribe a reply matcher for one pending call, tied to a guard that
    /// detaches it again. The guard must outlive the wait: an `invoke` future
    /// dropped mid-flight (a caller timing out, say) still unsubscribes, so
    /// abandoned calls cannot pile up in the transport's subscriber map.
    fn guarded_one_shot<F>(&self, channel: &str, complete: F) -> SubscriptionGuard
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        SubscriptionGuard {
            token: self.subscribe_one_shot(channel, complete),
            transport: self.transport.clone(),
        }
    }

    /// Subscribe a reply matcher for one pending call. The callback fires on
    /// the first reply or error reply whose channel matches, or on a decode
    /// failure of any inbound message.
    fn subscribe_one_shot<F>(&self, channel: &str, complete: F) -> SubscriberToken
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        let chan = channel.to_string();
        self.transport.subscribe(Arc::new(move |raw| {
            let outcome = match Envelope::decode(raw) {
                Ok(Envelope::Reply { channel, result }) if channel == chan => Some(Ok(result)),
                Ok(Envelope::Error { channel, error }) if channel == chan => {
                    Some(Err(BridgeError::Handler(error)))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            };
            if let Some(outcome) = outcome {
                complete(outcome);
            }
        }))
    }

    fn track(&self, channel: &str, subscription: SubscriberToken) -> ListenerToken {
        let token = ListenerToken::new();
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.clone(), (channel.to_string(), subscription));
        token
    }
}

/// Detaches a transport subscription when dropped.
struct SubscriptionGuard {
    token: SubscriberToken,
    transport: Arc<dyn Transport>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.transport.unsubscribe(&self.token);
    }
}
