/// Reactive store - keeps a local value in sync with the update channel and fans
/// every change out to its observers

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::channel::{self, ChannelState, Connector, ReconnectPolicy, WebSocketConnector};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;
type Selector<T> = Box<dyn Fn(serde_json::Value) -> Result<T, serde_json::Error> + Send + Sync>;

/// A registered observer
struct Slot<T> {
    id: u64,
    active: AtomicBool,
    callback: Callback<T>,
}

struct Shared<T> {
    current: RwLock<T>,
    observers: Mutex<Vec<Arc<Slot<T>>>>,
    /// Held for a whole delivery so one message reaches every observer before the next.
    /// Re-entrant so observers may subscribe from inside a callback.
    delivery: ReentrantMutex<()>,
    next_id: AtomicU64,
    selector: Selector<T>,
    state_tx: watch::Sender<ChannelState>,
    closed: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    /// Handle one raw frame from the channel
    fn receive(&self, frame: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let payload: serde_json::Value = match serde_json::from_str(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Dropping undecodable update: {}", e);
                return;
            }
        };

        match (self.selector)(payload) {
            Ok(value) => self.publish(value),
            Err(e) => tracing::warn!("Dropping update that does not match the store: {}", e),
        }
    }

    fn publish(&self, value: T) {
        let _delivery = self.delivery.lock();
        *self.current.write() = value.clone();

        let slots: Vec<Arc<Slot<T>>> = self.observers.lock().clone();
        for slot in slots {
            if slot.active.load(Ordering::Acquire) {
                (slot.callback)(&value);
            }
        }
    }

    fn remove(&self, id: u64) {
        let mut observers = self.observers.lock();
        if let Some(pos) = observers.iter().position(|slot| slot.id == id) {
            let slot = observers.remove(pos);
            slot.active.store(false, Ordering::Release);
        }
    }
}

/// Read-only projection of server-pushed state.
///
/// The store owns its channel connection; there is no way to write to the channel
/// through it. Clones share the same value, observers and connection.
pub struct ReactiveStore<T> {
    shared: Arc<Shared<T>>,
    task: Arc<TaskGuard>,
}

/// Owns the connection task; the last store handle going away stops it
struct TaskGuard(Mutex<Option<JoinHandle<()>>>);

impl TaskGuard {
    fn take(&self) -> Option<JoinHandle<()>> {
        self.0.lock().take()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.take() {
            handle.abort();
            tracing::debug!("Last store handle dropped, connection task stopped");
        }
    }
}

impl<T> Clone for ReactiveStore<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            task: Arc::clone(&self.task),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ReactiveStore<T> {
    /// Open a WebSocket to `url` and start projecting its messages through `selector`.
    /// Must be called from within a tokio runtime.
    pub fn new<S>(
        url: impl Into<String>,
        initial: T,
        selector: S,
        policy: ReconnectPolicy,
    ) -> Self
    where
        S: Fn(serde_json::Value) -> Result<T, serde_json::Error> + Send + Sync + 'static,
    {
        Self::with_connector(WebSocketConnector::new(url), initial, selector, policy)
    }

    pub fn with_connector<C, S>(
        connector: C,
        initial: T,
        selector: S,
        policy: ReconnectPolicy,
    ) -> Self
    where
        C: Connector,
        S: Fn(serde_json::Value) -> Result<T, serde_json::Error> + Send + Sync + 'static,
    {
        let (state_tx, _) = watch::channel(ChannelState::Connecting);
        let shared = Arc::new(Shared {
            current: RwLock::new(initial),
            observers: Mutex::new(Vec::new()),
            delivery: ReentrantMutex::new(()),
            next_id: AtomicU64::new(0),
            selector: Box::new(selector),
            state_tx,
            closed: AtomicBool::new(false),
        });

        let task_shared = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            let frames_shared = Arc::clone(&task_shared);
            channel::drive(&connector, &policy, &task_shared.state_tx, move |frame| {
                frames_shared.receive(&frame)
            })
            .await;
        });

        Self {
            shared,
            task: Arc::new(TaskGuard(Mutex::new(Some(handle)))),
        }
    }

    /// Last delivered value, or the initial value before the first message
    pub fn get(&self) -> T {
        self.shared.current.read().clone()
    }

    /// Register `callback`. It is called right away with the current value, then with
    /// every later update in channel order until the returned handle is dropped or
    /// [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let _delivery = self.shared.delivery.lock();

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot {
            id,
            active: AtomicBool::new(true),
            callback: Box::new(callback),
        });
        self.shared.observers.lock().push(Arc::clone(&slot));

        let current = self.get();
        (slot.callback)(&current);

        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.remove(id);
                }
            })),
        }
    }

    /// Async view of the same notifications: the current value first, then every update
    pub fn updates(&self) -> Updates<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        Updates {
            rx,
            _subscription: subscription,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.lock().len()
    }
}

impl<T> ReactiveStore<T> {
    /// Connectivity of the underlying channel
    pub fn state(&self) -> ChannelState {
        *self.shared.state_tx.borrow()
    }

    /// Separate observer for connectivity changes. Value observers never see these.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state_tx.subscribe()
    }

    /// Stop the connection task. Observers keep the last value; no further updates arrive.
    pub fn close(&self) {
        if let Some(handle) = self.task.take() {
            self.shared.closed.store(true, Ordering::Release);
            handle.abort();
            self.shared.state_tx.send_replace(ChannelState::Closed);
            tracing::info!("Store closed");
        }
    }
}

/// Handle returned by [`ReactiveStore::subscribe`]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Stop notifications to this observer. Other observers are unaffected.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stream of store values for async consumers.
///
/// The queue behind it is unbounded: every value is kept until it is received, so a
/// consumer that stops polling grows it for as long as updates arrive. Drop it (or use
/// [`ReactiveStore::subscribe`] and keep only the latest value) when falling behind is
/// possible.
pub struct Updates<T> {
    rx: mpsc::UnboundedReceiver<T>,
    _subscription: Subscription,
}

impl<T> Updates<T> {
    /// Next value, or `None` once the store is gone
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}
