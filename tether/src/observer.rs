//! Observer protocol between models and whatever watches them.
//!
//! Models keep only weak handles to their observers, so an observer that
//! is dropped simply stops receiving events. Collections are the main
//! observers, but anything implementing [`Observer`] can register.

use crate::model::Model;
use crate::requestable::lock;
use std::sync::{Arc, Mutex, Weak};
use tether_types::{ModelEvent, ObserverId};

/// Receives lifecycle events from models.
pub trait Observer: Send + Sync {
    /// Stable identity used for idempotent registration.
    fn observer_id(&self) -> ObserverId;

    /// Called synchronously from [`Model::fire`]. The model's state lock is
    /// not held, so the observer may read the model freely.
    fn notify(&self, event: ModelEvent, model: &Model);

    /// Called after `model` deregistered this observer through
    /// [`Model::remove_observer`]. Observers that keep a reference to the
    /// model drop it here. Must not call back into `remove_observer`.
    fn released(&self, model: &Model) {
        let _ = model;
    }
}

/// Registration-ordered set of weak observer handles.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    entries: Mutex<Vec<(ObserverId, Weak<dyn Observer>)>>,
}

impl ObserverRegistry {
    /// Registers `observer`. Returns `false` when it was already registered.
    pub(crate) fn add(&self, observer: &Arc<dyn Observer>) -> bool {
        let id = observer.observer_id();
        let mut entries = lock(&self.entries);
        if entries.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        entries.push((id, Arc::downgrade(observer)));
        true
    }

    /// Deregisters `id` and hands back its handle, `None` when it was not
    /// registered.
    pub(crate) fn remove(&self, id: ObserverId) -> Option<Weak<dyn Observer>> {
        let mut entries = lock(&self.entries);
        let position = entries.iter().position(|(existing, _)| *existing == id)?;
        Some(entries.remove(position).1)
    }

    pub(crate) fn contains(&self, id: ObserverId) -> bool {
        lock(&self.entries).iter().any(|(existing, _)| *existing == id)
    }

    /// Live observers in registration order. Dead handles are pruned.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
        let mut entries = lock(&self.entries);
        entries.retain(|(_, handle)| handle.strong_count() > 0);
        entries.iter().filter_map(|(_, handle)| handle.upgrade()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        let mut entries = lock(&self.entries);
        entries.retain(|(_, handle)| handle.strong_count() > 0);
        entries.len()
    }
}
