use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{AirportCode, FlightId};

/// Identifies an entity whose derived or stored fields just changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntityChange {
    Airport { code: AirportCode },
    Flight { id: FlightId },
}

type Observer = Arc<dyn Fn(&EntityChange) + Send + Sync>;

/// Fan-out point for change notifications.
///
/// Synchronous observers registered with [`on_changed`](Self::on_changed) run
/// inline on the notifying thread, in registration order, and may register
/// further observers; those see the next change. Async consumers use
/// [`subscribe`](Self::subscribe) and read from a broadcast channel; a slow
/// subscriber lags rather than blocking the sync path.
pub struct ChangeNotifier {
    observers: RwLock<Vec<Observer>>,
    tx: broadcast::Sender<EntityChange>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            observers: RwLock::new(Vec::new()),
            tx,
        }
    }

    pub fn on_changed(&self, observer: impl Fn(&EntityChange) + Send + Sync + 'static) {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        observers.push(Arc::new(observer));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.tx.subscribe()
    }

    pub fn notify(&self, change: EntityChange) {
        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in &observers {
            observer(&change);
        }
        // No receivers is fine
        let _ = self.tx.send(change);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
