/// Named stores, created once at startup and handed to whoever needs them

use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;

use crate::config::ClientConfig;
use crate::models::{UpdateEnvelope, WorkerState};
use crate::store::ReactiveStore;

/// Name of the store that mirrors the worker state
pub const WORKER_STORE: &str = "worker";

/// `None` until the worker has pushed a snapshot, or while no worker is running
pub type WorkerStore = ReactiveStore<Option<WorkerState>>;

/// Project an update envelope onto the worker state. An empty or null `data` means
/// there is no worker.
pub fn select_worker_state(payload: Value) -> Result<Option<WorkerState>, serde_json::Error> {
    let envelope: UpdateEnvelope = serde_json::from_value(payload)?;
    let no_worker = match &envelope.data {
        Value::Null => true,
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    };

    if no_worker {
        Ok(None)
    } else {
        serde_json::from_value(envelope.data).map(Some)
    }
}

trait AnyStore: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn close(&self);
}

impl<T: Send + Sync + 'static> AnyStore for ReactiveStore<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn close(&self) {
        ReactiveStore::close(self)
    }
}

/// Caller-owned map from store name to store.
///
/// Populating twice opens a second connection per store; build one registry at
/// startup and pass it around.
#[derive(Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Box<dyn AnyStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the application stores. Must be called from within a tokio runtime.
    pub fn populate(config: &ClientConfig) -> Self {
        let mut registry = Self::new();

        let url = config.updates_url();
        tracing::info!("Opening worker store on {}", url);
        let worker: WorkerStore =
            ReactiveStore::new(url, None, select_worker_state, config.reconnect.clone());
        registry.insert(WORKER_STORE, worker);

        registry
    }

    /// Register `store` under `name`. A store already registered under that name is
    /// closed and replaced.
    pub fn insert<T>(&mut self, name: impl Into<String>, store: ReactiveStore<T>)
    where
        T: Send + Sync + 'static,
    {
        let name = name.into();
        if let Some(previous) = self.stores.insert(name.clone(), Box::new(store)) {
            tracing::warn!("Replacing store {}", name);
            previous.close();
        }
    }

    /// Store registered under `name`, if it exists and holds values of type `T`
    pub fn get<T: 'static>(&self, name: &str) -> Option<ReactiveStore<T>> {
        self.stores
            .get(name)?
            .as_any()
            .downcast_ref::<ReactiveStore<T>>()
            .cloned()
    }

    pub fn worker(&self) -> Option<WorkerStore> {
        self.get(WORKER_STORE)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn close_all(&self) {
        for store in self.stores.values() {
            store.close();
        }
    }
}
