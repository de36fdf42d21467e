//! Shared push-channel connection
//!
//! Owns the single connection to the automation service's event stream:
//! connects once, reconnects forever with bounded backoff, remembers topic
//! subscriptions across reconnects and dispatches inbound events to the
//! registered handlers. One handler per event name; registering again
//! replaces the previous one.

use log::{debug, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::transport::{PushFrame, PushTransport};

/// Initial reconnect delay
const BACKOFF_START: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Callback invoked with the payload of a named push event
pub type EventHandler = Box<dyn Fn(Value) + Send + Sync>;

/// Supervises the shared push connection
///
/// Cheap to clone through `Arc`; all methods take `&self`.
pub struct ConnectionSupervisor {
    transport: Arc<dyn PushTransport>,
    inner: Arc<Inner>,
}

struct Inner {
    handlers: Mutex<HashMap<String, EventHandler>>,
    topics: Mutex<HashSet<String>>,
    /// Sender to the live connection; `None` while disconnected
    outbound: Mutex<Option<mpsc::UnboundedSender<PushFrame>>>,
    connected_tx: watch::Sender<bool>,
    task_spawned: AtomicBool,
}

impl ConnectionSupervisor {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        let (connected_tx, _) = watch::channel(false);
        Self {
            transport,
            inner: Arc::new(Inner {
                handlers: Mutex::new(HashMap::new()),
                topics: Mutex::new(HashSet::new()),
                outbound: Mutex::new(None),
                connected_tx,
                task_spawned: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the connection task
    ///
    /// Idempotent: the first call owns the task, later calls are no-ops, so
    /// concurrent callers always share one physical connection.
    pub fn connect(&self) {
        if self.inner.task_spawned.swap(true, Ordering::SeqCst) {
            return;
        }
        let transport = self.transport.clone();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            connection_loop(transport, inner).await;
        });
    }

    /// Ask the server for a topic's events
    ///
    /// The topic is remembered and replayed on every reconnect; the
    /// subscription frame itself is only sent while connected. Safe to
    /// repeat.
    pub fn subscribe(&self, topic: &str) {
        self.inner.topics.lock().unwrap().insert(topic.to_string());
        self.send_if_connected(PushFrame::subscribe(topic));
    }

    pub fn unsubscribe(&self, topic: &str) {
        self.inner.topics.lock().unwrap().remove(topic);
        self.send_if_connected(PushFrame::unsubscribe(topic));
    }

    /// Register the handler for an event name, replacing any previous one
    pub fn on(&self, event: &str, handler: EventHandler) {
        self.inner
            .handlers
            .lock()
            .unwrap()
            .insert(event.to_string(), handler);
    }

    pub fn off(&self, event: &str) {
        self.inner.handlers.lock().unwrap().remove(event);
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected_tx.borrow()
    }

    /// Watch connected-state transitions
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.inner.connected_tx.subscribe()
    }

    fn send_if_connected(&self, frame: PushFrame) {
        if let Some(outbound) = self.inner.outbound.lock().unwrap().as_ref() {
            let _ = outbound.send(frame);
        }
    }
}

async fn connection_loop(transport: Arc<dyn PushTransport>, inner: Arc<Inner>) {
    let mut backoff = BACKOFF_START;
    loop {
        let mut channel = match transport.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                debug!("push connect failed: {:#}", e);
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };
        backoff = BACKOFF_START;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        *inner.outbound.lock().unwrap() = Some(outbound_tx);
        let _ = inner.connected_tx.send(true);

        // Subscriptions survive disconnects; replay them on the new channel
        let topics: Vec<String> = inner.topics.lock().unwrap().iter().cloned().collect();
        let mut alive = true;
        for topic in topics {
            if channel.send(PushFrame::subscribe(&topic)).await.is_err() {
                alive = false;
                break;
            }
        }

        while alive {
            tokio::select! {
                inbound = channel.recv() => match inbound {
                    Some(Ok(frame)) => inner.dispatch(frame),
                    Some(Err(e)) => {
                        warn!("push channel error: {:#}", e);
                        alive = false;
                    }
                    None => alive = false,
                },
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => {
                        if channel.send(frame).await.is_err() {
                            alive = false;
                        }
                    }
                    None => alive = false,
                },
            }
        }

        *inner.outbound.lock().unwrap() = None;
        let _ = inner.connected_tx.send(false);
        tokio::time::sleep(BACKOFF_START).await;
    }
}

impl Inner {
    fn dispatch(&self, frame: PushFrame) {
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(&frame.event) {
            Some(handler) => handler(frame.data),
            None => debug!("no handler for push event {}", frame.event),
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeTransport;
    use serde_json::json;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_secs(1);

    async fn wait_connected(supervisor: &ConnectionSupervisor, want: bool) {
        let mut rx = supervisor.connected();
        timeout(Duration::from_secs(10), async {
            while *rx.borrow_and_update() != want {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("connected state never transitioned");
    }

    #[test]
    fn test_backoff_doubles_up_to_the_cap() {
        let mut delay = BACKOFF_START;
        delay = next_backoff(delay);
        assert_eq!(delay, Duration::from_secs(2));
        delay = next_backoff(delay);
        assert_eq!(delay, Duration::from_secs(4));
        delay = next_backoff(delay);
        assert_eq!(delay, BACKOFF_CAP);
        assert_eq!(next_backoff(delay), BACKOFF_CAP);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_reach_the_registered_handler() {
        let (transport, mut scripts) = FakeTransport::with_channels(1);
        let supervisor = ConnectionSupervisor::new(Arc::new(transport));

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        supervisor.on(
            "log:new",
            Box::new(move |data| {
                let _ = seen_tx.send(data);
            }),
        );
        supervisor.connect();
        wait_connected(&supervisor, true).await;

        let script = &mut scripts[0];
        script
            .inbound
            .send(Ok(PushFrame::new("log:new", json!({ "message": "merhaba" }))))
            .unwrap();

        let data = timeout(TICK, seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(data, json!({ "message": "merhaba" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_registration_replaces_the_first() {
        let (transport, mut scripts) = FakeTransport::with_channels(1);
        let supervisor = ConnectionSupervisor::new(Arc::new(transport));

        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        supervisor.on(
            "log:new",
            Box::new(move |data| {
                let _ = first_tx.send(data);
            }),
        );
        supervisor.on(
            "log:new",
            Box::new(move |data| {
                let _ = second_tx.send(data);
            }),
        );
        supervisor.connect();
        wait_connected(&supervisor, true).await;

        scripts[0]
            .inbound
            .send(Ok(PushFrame::new("log:new", json!({ "message": "bir" }))))
            .unwrap();

        let data = timeout(TICK, second_rx.recv()).await.unwrap().unwrap();
        assert_eq!(data, json!({ "message": "bir" }));
        // The replaced handler was dropped, closing its channel
        assert!(matches!(timeout(TICK, first_rx.recv()).await, Ok(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_handler_is_not_called() {
        let (transport, mut scripts) = FakeTransport::with_channels(1);
        let supervisor = ConnectionSupervisor::new(Arc::new(transport));

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        supervisor.on(
            "log:new",
            Box::new(move |data| {
                let _ = seen_tx.send(data);
            }),
        );
        supervisor.off("log:new");
        supervisor.connect();
        wait_connected(&supervisor, true).await;

        scripts[0]
            .inbound
            .send(Ok(PushFrame::new("log:new", json!({}))))
            .unwrap();
        // The removed handler was dropped, closing its channel
        assert!(matches!(timeout(TICK, seen_rx.recv()).await, Ok(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_is_sent_once_connected() {
        let (transport, mut scripts) = FakeTransport::with_channels(1);
        let supervisor = ConnectionSupervisor::new(Arc::new(transport));

        // Requested before connect: remembered, nothing on the wire yet
        supervisor.subscribe("automation");
        supervisor.connect();
        wait_connected(&supervisor, true).await;

        let frame = timeout(TICK, scripts[0].sent.recv()).await.unwrap().unwrap();
        assert_eq!(frame.event, "subscribe:automation");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replays_subscriptions() {
        let (transport, mut scripts) = FakeTransport::with_channels(2);
        let supervisor = ConnectionSupervisor::new(Arc::new(transport));
        supervisor.subscribe("automation");
        supervisor.connect();
        wait_connected(&supervisor, true).await;

        let frame = timeout(TICK, scripts[0].sent.recv()).await.unwrap().unwrap();
        assert_eq!(frame.event, "subscribe:automation");

        // Server drops the connection
        scripts[0].close();
        wait_connected(&supervisor, false).await;
        wait_connected(&supervisor, true).await;

        let frame = timeout(TICK, scripts[1].sent.recv()).await.unwrap().unwrap();
        assert_eq!(frame.event, "subscribe:automation");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let (transport, _scripts) = FakeTransport::with_channels(1);
        let transport = Arc::new(transport);
        let supervisor = ConnectionSupervisor::new(transport.clone());

        supervisor.connect();
        supervisor.connect();
        supervisor.connect();
        wait_connected(&supervisor, true).await;
        assert_eq!(transport.connect_count(), 1);
        assert!(supervisor.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_sends_the_frame_and_forgets_the_topic() {
        let (transport, mut scripts) = FakeTransport::with_channels(1);
        let supervisor = ConnectionSupervisor::new(Arc::new(transport));
        supervisor.connect();
        wait_connected(&supervisor, true).await;

        supervisor.subscribe("automation");
        supervisor.unsubscribe("automation");

        let frame = timeout(TICK, scripts[0].sent.recv()).await.unwrap().unwrap();
        assert_eq!(frame.event, "subscribe:automation");
        let frame = timeout(TICK, scripts[0].sent.recv()).await.unwrap().unwrap();
        assert_eq!(frame.event, "unsubscribe:automation");
    }
}
