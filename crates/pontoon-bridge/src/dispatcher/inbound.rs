//! Inbound message pipeline.
//!
//! Per inbound wire string: decode, emit to listeners, then — only if a
//! handler is registered — invoke it on a worker task and post the reply back
//! through the same transport. The delivery thread never blocks on handler
//! work; the reply is sent from whichever worker completes the task.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use pontoon_common::{BridgeError, Result, SubscriberToken};

use crate::envelope::Envelope;
use crate::transport::Transport;

use super::Dispatcher;

impl Dispatcher {
    /// Subscribe the dispatch pipeline to a transport.
    ///
    /// Must be called from within a tokio runtime; handler invocations are
    /// spawned onto it even when messages arrive on a foreign pump thread.
    pub fn attach(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
    ) -> Result<SubscriberToken> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;
        let dispatcher = Arc::downgrade(self);
        let transport_weak = Arc::downgrade(&transport);

        let token = transport.subscribe(Arc::new(move |raw| {
            let (Some(dispatcher), Some(transport)) =
                (dispatcher.upgrade(), transport_weak.upgrade())
            else {
                return;
            };
            dispatcher.process_inbound(raw, &transport, &runtime);
        }));
        Ok(token)
    }

    fn process_inbound(
        self: &Arc<Self>,
        raw: &str,
        transport: &Arc<dyn Transport>,
        runtime: &tokio::runtime::Handle,
    ) {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, len = raw.len(), "undecodable inbound message");
                let reply = Envelope::error(&self.config.error_channel, e.to_string());
                if let Err(send_err) = transport.send(&reply.encode()) {
                    warn!(error = %send_err, "failed to post decode-error reply");
                }
                return;
            }
        };

        match envelope {
            Envelope::Call { channel, args } => self.route_call(channel, args, transport, runtime),
            // Replies are matched by pending calls on the other end; here they
            // only feed listeners registered on the channel.
            Envelope::Reply { channel, result } => {
                self.emit(&channel, std::slice::from_ref(&result));
            }
            Envelope::Error { channel, error } => {
                self.emit(&channel, &[Value::String(error)]);
            }
        }
    }

    fn route_call(
        self: &Arc<Self>,
        channel: String,
        args: Vec<Value>,
        transport: &Arc<dyn Transport>,
        runtime: &tokio::runtime::Handle,
    ) {
        let notified = self.emit(&channel, &args);

        // Resolve the handler here, not in the spawned task: a call that was
        // routable when it arrived stays routable even if the handler is
        // unregistered before the task runs.
        let Some(entry) = self.handlers.get(&channel) else {
            // Event-only call: deliberately no reply and no error.
            debug!(channel = %channel, notified, "call routed to listeners only");
            return;
        };

        let dispatcher = self.clone();
        let transport = transport.clone();
        runtime.spawn(async move {
            let reply = match (entry.handler)(args).await {
                Ok(result) => Envelope::reply(&channel, result),
                Err(e) => {
                    warn!(channel = %channel, error = %e, "handler failed");
                    Envelope::error(&channel, e.to_string())
                }
            };
            if entry.once {
                dispatcher.remove_handler(&channel);
            }
            if let Err(e) = transport.send(&reply.encode()) {
                warn!(channel = %channel, error = %e, "failed to post reply");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    fn attach_dispatcher(
        host_end: &Arc<MemoryTransport>,
    ) -> (Arc<Dispatcher>, SubscriberToken) {
        let dispatcher = Dispatcher::new(BridgeConfig::default());
        let token = dispatcher.attach(host_end.clone() as Arc<dyn Transport>).unwrap();
        (dispatcher, token)
    }

    /// Collect everything the host posts back to the client side.
    fn collect_replies(client_end: &Arc<MemoryTransport>) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel();
        client_end.subscribe(Arc::new(move |wire: &str| {
            let _ = tx.send(wire.to_string());
        }));
        rx
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn call_with_handler_posts_reply() {
        let (client_end, host_end) = MemoryTransport::duplex();
        let (dispatcher, _token) = attach_dispatcher(&host_end);
        let replies = collect_replies(&client_end);

        dispatcher.handle("echo", |args| async move {
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        });

        client_end
            .send(&Envelope::call("echo", vec![json!("hi")]).encode())
            .unwrap();

        let raw = replies.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            Envelope::decode(&raw).unwrap(),
            Envelope::reply("echo", json!("hi"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn call_without_handler_posts_nothing() {
        let (client_end, host_end) = MemoryTransport::duplex();
        let (dispatcher, _token) = attach_dispatcher(&host_end);
        let replies = collect_replies(&client_end);

        let (seen_tx, seen_rx) = mpsc::channel();
        dispatcher.on("announce", move |args| {
            let _ = seen_tx.send(args.to_vec());
            Ok(())
        });

        client_end
            .send(&Envelope::call("announce", vec![json!("up")]).encode())
            .unwrap();

        // The listener fires, but no reply ever crosses the transport.
        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            vec![json!("up")]
        );
        assert!(replies.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn listeners_and_handler_both_run_for_one_call() {
        let (client_end, host_end) = MemoryTransport::duplex();
        let (dispatcher, _token) = attach_dispatcher(&host_end);
        let replies = collect_replies(&client_end);

        let (seen_tx, seen_rx) = mpsc::channel();
        dispatcher.on("save", move |args| {
            let _ = seen_tx.send(args.to_vec());
            Ok(())
        });
        dispatcher.handle("save", |_| async { Ok(json!("saved")) });

        client_end
            .send(&Envelope::call("save", vec![json!("/tmp/x")]).encode())
            .unwrap();

        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            vec![json!("/tmp/x")]
        );
        let raw = replies.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            Envelope::decode(&raw).unwrap(),
            Envelope::reply("save", json!("saved"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn handler_failure_becomes_error_reply() {
        let (client_end, host_end) = MemoryTransport::duplex();
        let (dispatcher, _token) = attach_dispatcher(&host_end);
        let replies = collect_replies(&client_end);

        dispatcher.handle("readFile", |_| async {
            Err(BridgeError::Handler("no such file".into()))
        });

        client_end
            .send(&Envelope::call("readFile", vec![json!("/missing")]).encode())
            .unwrap();

        let raw = replies.recv_timeout(Duration::from_secs(2)).unwrap();
        match Envelope::decode(&raw).unwrap() {
            Envelope::Error { channel, error } => {
                assert_eq!(channel, "readFile");
                assert!(error.contains("no such file"));
            }
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn undecodable_message_posts_error_reply_and_pump_survives() {
        let (client_end, host_end) = MemoryTransport::duplex();
        let (dispatcher, _token) = attach_dispatcher(&host_end);
        let replies = collect_replies(&client_end);

        client_end.send("{not json").unwrap();

        let raw = replies.recv_timeout(Duration::from_secs(2)).unwrap();
        match Envelope::decode(&raw).unwrap() {
            Envelope::Error { channel, .. } => assert_eq!(channel, "error"),
            other => panic!("expected error reply, got {other:?}"),
        }

        // The pump is still alive and routing.
        dispatcher.handle("ping", |_| async { Ok(json!("pong")) });
        client_end
            .send(&Envelope::call("ping", vec![]).encode())
            .unwrap();
        let raw = replies.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            Envelope::decode(&raw).unwrap(),
            Envelope::reply("ping", json!("pong"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn handler_removed_mid_flight_still_replies() {
        let (client_end, host_end) = MemoryTransport::duplex();
        let (dispatcher, _token) = attach_dispatcher(&host_end);
        let replies = collect_replies(&client_end);

        let started = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        {
            let started = started.clone();
            let release = release.clone();
            dispatcher.handle("slow", move |_| {
                let started = started.clone();
                let release = release.clone();
                async move {
                    started.notify_one();
                    release.notified().await;
                    Ok(json!("done"))
                }
            });
        }

        client_end
            .send(&Envelope::call("slow", vec![]).encode())
            .unwrap();
        started.notified().await;

        // Unregistering while the call is in flight must not turn the
        // pending reply into a handler-not-found error.
        assert!(dispatcher.remove_handler("slow"));
        release.notify_one();

        let raw = replies.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            Envelope::decode(&raw).unwrap(),
            Envelope::reply("slow", json!("done"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn inbound_reply_feeds_listeners() {
        let (client_end, host_end) = MemoryTransport::duplex();
        let (dispatcher, _token) = attach_dispatcher(&host_end);

        let (seen_tx, seen_rx) = mpsc::channel();
        dispatcher.on("progress", move |args| {
            let _ = seen_tx.send(args.to_vec());
            Ok(())
        });

        client_end
            .send(&Envelope::reply("progress", json!(42)).encode())
            .unwrap();

        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            vec![json!(42)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn detach_stops_routing() {
        let (client_end, host_end) = MemoryTransport::duplex();
        let (dispatcher, token) = attach_dispatcher(&host_end);
        let replies = collect_replies(&client_end);

        dispatcher.handle("ping", |_| async { Ok(json!("pong")) });
        host_end.unsubscribe(&token);

        client_end
            .send(&Envelope::call("ping", vec![]).encode())
            .unwrap();
        assert!(replies.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
