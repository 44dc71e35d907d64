//! Topic-keyed publish/subscribe session.
//!
//! [`BusSession`] keeps a single [`tokio::sync::broadcast`] channel of
//! [`Sample`]s. Every subscription is a task that filters the channel by exact
//! topic key and hands matching payloads to its callback, so publish order
//! within a topic is preserved for every subscriber and a slow callback never
//! blocks the publisher.
//!
//! | Operation | Behaviour |
//! |---|---|
//! | `publish` | Best-effort; succeeds with zero listeners, fails once closed |
//! | `subscribe` | Spawns a filter task on the captured runtime |
//! | `close` | Drops the sender; every subscription task drains and exits |

use std::sync::{Arc, Mutex};

use dmc_types::NodeError;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Default channel capacity (samples buffered before a slow subscriber lags).
pub const DEFAULT_CAPACITY: usize = 256;

/// Subscriber callback. Invoked with the raw payload bytes of each sample.
pub type Callback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// One message on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub topic: Arc<str>,
    pub payload: Arc<[u8]>,
}

/// The transport contract every loop of the node is written against.
///
/// Implementations must be safe to publish to from many tasks at once.
pub trait Session: Send + Sync {
    /// Publish `payload` on `topic`.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NodeError>;

    /// Deliver every future payload on `topic` to `callback`.
    fn subscribe(&self, topic: &str, callback: Callback) -> Result<Subscription, NodeError>;

    /// Release the session. Calling it more than once is a no-op.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Handle to a live subscription.
///
/// Dropping the handle leaves the subscription running; call
/// [`Subscription::close`] to stop it early.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    task: Option<AbortHandle>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn close(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// In-process broadcast session
// ---------------------------------------------------------------------------

/// In-process session backed by one broadcast channel.
#[derive(Debug)]
pub struct BusSession {
    sender: Mutex<Option<broadcast::Sender<Sample>>>,
    runtime: Handle,
}

impl BusSession {
    /// Open a session on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Transport`] when called outside a runtime.
    pub fn open(capacity: usize) -> Result<Self, NodeError> {
        let runtime = Handle::try_current()
            .map_err(|e| NodeError::Transport(format!("no async runtime for session: {e}")))?;
        let (sender, _) = broadcast::channel(capacity.max(1));
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            runtime,
        })
    }

    /// Raw receiver over every sample on the session, regardless of topic.
    ///
    /// Used by bridges that forward the whole stream.
    pub fn tap(&self) -> Result<broadcast::Receiver<Sample>, NodeError> {
        self.sender()
            .map(|s| s.subscribe())
            .ok_or_else(|| NodeError::Transport("session closed".to_string()))
    }

    fn sender(&self) -> Option<broadcast::Sender<Sample>> {
        self.sender.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Session for BusSession {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NodeError> {
        let sender = self
            .sender()
            .ok_or_else(|| NodeError::Transport(format!("publish on {topic}: session closed")))?;
        let sample = Sample {
            topic: Arc::from(topic),
            payload: Arc::from(payload),
        };
        // No listeners is a normal condition for a best-effort publish.
        let _ = sender.send(sample);
        Ok(())
    }

    fn subscribe(&self, topic: &str, callback: Callback) -> Result<Subscription, NodeError> {
        let mut rx = self.tap()?;
        let filter: Arc<str> = Arc::from(topic);
        let task = self.runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(sample) if sample.topic == filter => callback(&sample.payload),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(topic = %filter, lagged_by = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription {
            topic: topic.to_string(),
            task: Some(task.abort_handle()),
        })
    }

    fn close(&self) {
        let taken = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if taken.is_some() {
            info!("session closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.sender().is_none()
    }
}

// ---------------------------------------------------------------------------
// Dry-run wrapper
// ---------------------------------------------------------------------------

/// Wraps another session and logs every operation.
///
/// Used when the node runs with `--dry-run` so that traffic is visible in the
/// log without a remote peer attached.
pub struct DryRunSession<S: Session> {
    inner: S,
}

impl<S: Session> DryRunSession<S> {
    pub fn new(inner: S) -> Self {
        info!("dry-run mode enabled (no remote transport)");
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Session> Session for DryRunSession<S> {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NodeError> {
        debug!(topic, bytes = payload.len(), "dry-run publish");
        self.inner.publish(topic, payload)
    }

    fn subscribe(&self, topic: &str, callback: Callback) -> Result<Subscription, NodeError> {
        info!(topic, "dry-run subscribed");
        self.inner.subscribe(topic, callback)
    }

    fn close(&self) {
        if !self.inner.is_closed() {
            info!("dry-run session closed");
        }
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Shared sessions: a bridge and the node's loops can hold the same one.
impl<S: Session + ?Sized> Session for Arc<S> {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NodeError> {
        (**self).publish(topic, payload)
    }

    fn subscribe(&self, topic: &str, callback: Callback) -> Result<Subscription, NodeError> {
        (**self).subscribe(topic, callback)
    }

    fn close(&self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn collector() -> (Callback, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cb: Callback = Arc::new(move |payload: &[u8]| {
            let _ = tx.send(payload.to_vec());
        });
        (cb, rx)
    }

    #[tokio::test]
    async fn subscriber_receives_only_its_topic() -> Result<(), Box<dyn std::error::Error>> {
        let session = BusSession::open(DEFAULT_CAPACITY)?;
        let (cb, mut rx) = collector();
        let _sub = session.subscribe("ns/r1/motor/cmd", cb)?;

        session.publish("ns/r1/oled/cmd", b"other")?;
        session.publish("ns/r1/motor/cmd", b"mine")?;

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await?
            .ok_or("no payload")?;
        assert_eq!(got, b"mine");
        Ok(())
    }

    #[tokio::test]
    async fn per_topic_order_is_preserved() -> Result<(), Box<dyn std::error::Error>> {
        let session = BusSession::open(DEFAULT_CAPACITY)?;
        let (cb, mut rx) = collector();
        let _sub = session.subscribe("t", cb)?;

        for i in 0u8..5 {
            session.publish("t", &[i])?;
        }
        for i in 0u8..5 {
            let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await?
                .ok_or("no payload")?;
            assert_eq!(got, vec![i]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() -> Result<(), Box<dyn std::error::Error>> {
        let session = BusSession::open(DEFAULT_CAPACITY)?;
        session.publish("nobody/listens", b"x")?;
        Ok(())
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_publish() -> Result<(), Box<dyn std::error::Error>> {
        let session = BusSession::open(DEFAULT_CAPACITY)?;
        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(matches!(session.publish("t", b"x"), Err(NodeError::Transport(_))));
        assert!(session.subscribe("t", Arc::new(|_: &[u8]| {})).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn closed_subscription_stops_delivery() -> Result<(), Box<dyn std::error::Error>> {
        let session = BusSession::open(DEFAULT_CAPACITY)?;
        let (cb, mut rx) = collector();
        let sub = session.subscribe("t", cb)?;
        assert_eq!(sub.topic(), "t");
        sub.close();
        tokio::task::yield_now().await;

        session.publish("t", b"late")?;
        let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(result, Ok(Some(_))), "closed subscription must not deliver");
        Ok(())
    }

    #[tokio::test]
    async fn dry_run_wrapper_delegates() -> Result<(), Box<dyn std::error::Error>> {
        let session = DryRunSession::new(BusSession::open(8)?);
        let (cb, mut rx) = collector();
        let _sub = session.subscribe("t", cb)?;
        session.publish("t", b"hello")?;
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await?
            .ok_or("no payload")?;
        assert_eq!(got, b"hello");
        session.close();
        assert!(session.inner().is_closed());
        Ok(())
    }

    #[tokio::test]
    async fn shared_session_sees_one_close() -> Result<(), Box<dyn std::error::Error>> {
        let bus = Arc::new(BusSession::open(8)?);
        let wrapped = DryRunSession::new(Arc::clone(&bus));
        wrapped.close();
        assert!(bus.is_closed());
        Ok(())
    }

    #[test]
    fn open_outside_runtime_fails() {
        assert!(matches!(BusSession::open(8), Err(NodeError::Transport(_))));
    }
}
