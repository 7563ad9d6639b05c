//! In-process duplex transport.
//!
//! `MemoryTransport::duplex()` returns two connected endpoints. Each endpoint
//! owns a pump thread that drains the peer's outbound queue and fans messages
//! out to local subscribers, so delivery always happens off the sender's
//! thread — the same shape as a real webview message pump.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, ThreadId};

use tracing::debug;

use pontoon_common::{SubscriberToken, TransportError};

use super::{Subscriber, Transport};

type SubscriberMap = Arc<Mutex<HashMap<SubscriberToken, Subscriber>>>;

pub struct MemoryTransport {
    /// Outbound queue, drained by the peer's pump thread.
    peer_tx: mpsc::Sender<String>,
    subscribers: SubscriberMap,
    pump_thread: ThreadId,
    /// Set by `close()` or when this endpoint is dropped.
    closed: Arc<AtomicBool>,
    /// The peer's `closed` flag; sending to a gone peer fails fast.
    peer_closed: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Create a connected pair of endpoints.
    pub fn duplex() -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
        let (a_to_b, b_inbound) = mpsc::channel::<String>();
        let (b_to_a, a_inbound) = mpsc::channel::<String>();

        let a_subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
        let b_subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
        let a_closed = Arc::new(AtomicBool::new(false));
        let b_closed = Arc::new(AtomicBool::new(false));

        let a = Arc::new(MemoryTransport {
            peer_tx: a_to_b,
            subscribers: a_subscribers.clone(),
            pump_thread: Self::spawn_pump(a_inbound, a_subscribers),
            closed: a_closed.clone(),
            peer_closed: b_closed.clone(),
        });
        let b = Arc::new(MemoryTransport {
            peer_tx: b_to_a,
            subscribers: b_subscribers.clone(),
            pump_thread: Self::spawn_pump(b_inbound, b_subscribers),
            closed: b_closed,
            peer_closed: a_closed,
        });
        (a, b)
    }

    /// Shut this endpoint down; subsequent sends on either side fail with
    /// `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn spawn_pump(inbound: mpsc::Receiver<String>, subscribers: SubscriberMap) -> ThreadId {
        let pump = thread::spawn(move || {
            // Ends when the peer endpoint is dropped and the channel closes.
            while let Ok(wire) = inbound.recv() {
                // Snapshot under the lock, call outside it, so a subscriber
                // may subscribe/unsubscribe without deadlocking the pump.
                let snapshot: Vec<Subscriber> = match subscribers.lock() {
                    Ok(map) => map.values().cloned().collect(),
                    Err(_) => break,
                };
                for subscriber in snapshot {
                    subscriber(&wire);
                }
            }
            debug!("memory transport pump stopped");
        });
        pump.thread().id()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    fn send(&self, wire: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) || self.peer_closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.peer_tx
            .send(wire.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn subscribe(&self, subscriber: Subscriber) -> SubscriberToken {
        let token = SubscriberToken::new();
        if let Ok(mut map) = self.subscribers.lock() {
            map.insert(token.clone(), subscriber);
        }
        token
    }

    fn unsubscribe(&self, token: &SubscriberToken) {
        if let Ok(mut map) = self.subscribers.lock() {
            map.remove(token);
        }
    }

    fn delivers_on_current_thread(&self) -> bool {
        thread::current().id() == self.pump_thread
    }
}
