//! A single entity's state and REST lifecycle.
//!
//! A [`Model`] owns two snapshots of its entity: the current `values` and
//! the `sync_values` captured at the last [`sync`](Model::sync). The model
//! is dirty whenever the two differ. `fetch`, `save` and `delete` go
//! through the model's [`Requester`], and every state transition is
//! announced to registered [`Observer`]s.
//!
//! `Model` is a cheap handle: clones share the same entity.

use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::observer::{Observer, ObserverRegistry};
use crate::requestable::{lock, Requester, ValidationErrors};
use crate::resource::{ModelSchema, Route, RouteTable, DELETE, FETCH, PATCH, SAVE, UPDATE};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use tether_http::{HttpClient, HttpResponse};
use tether_types::values::{self, EntityValues, Path};
use tether_types::{ModelEvent, ModelId, ObserverId};
use tracing::debug;

/// The request a [`Model::save`] will issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    /// No key yet: POST the full values to the collection route.
    Create,
    /// PUT the full values to the member route.
    Update,
    /// PATCH only the dirty values to the member route.
    Patch,
}

impl SaveAction {
    /// Action name used to look up the route and method.
    pub fn action(&self) -> &'static str {
        match self {
            SaveAction::Create => SAVE,
            SaveAction::Update => UPDATE,
            SaveAction::Patch => PATCH,
        }
    }
}

#[derive(Debug)]
struct ModelState {
    values: EntityValues,
    sync_values: EntityValues,
    deleted: bool,
}

struct ModelInner {
    id: ModelId,
    schema: Arc<dyn ModelSchema>,
    requester: Requester,
    state: Mutex<ModelState>,
    observers: ObserverRegistry,
}

/// Routes a model uses when its schema does not override them.
pub fn default_routes() -> RouteTable {
    RouteTable::from([
        (FETCH.to_string(), Route::Member),
        (SAVE.to_string(), Route::Collection),
        (UPDATE.to_string(), Route::Member),
        (PATCH.to_string(), Route::Member),
        (DELETE.to_string(), Route::Member),
    ])
}

/// Reads a response body as entity values. An empty body adopts nothing.
pub(crate) fn response_values(data: &Value) -> ModelResult<EntityValues> {
    match data {
        Value::Null => Ok(EntityValues::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(ModelError::UnexpectedResponse(format!(
            "expected an object body, found {}",
            values::kind(other)
        ))),
    }
}

/// Handle to one entity.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Creates a model whose values are the schema defaults overlaid with
    /// `values`. The new model starts synced.
    pub fn new(schema: Arc<dyn ModelSchema>, client: Arc<dyn HttpClient>, values: EntityValues) -> Self {
        let merged = values::layered(&[&schema.defaults(), &values]);
        Self {
            inner: Arc::new(ModelInner {
                id: ModelId::new(),
                schema,
                requester: Requester::new(client),
                state: Mutex::new(ModelState {
                    values: merged.clone(),
                    sync_values: merged,
                    deleted: false,
                }),
                observers: ObserverRegistry::default(),
            }),
        }
    }

    /// Like [`new`](Self::new), then adds the model to each collection that
    /// does not already hold it.
    pub fn with_collections(
        schema: Arc<dyn ModelSchema>,
        client: Arc<dyn HttpClient>,
        values: EntityValues,
        collections: &[&Collection],
    ) -> Self {
        let model = Self::new(schema, client, values);
        model.add_to(collections);
        model
    }

    pub fn id(&self) -> ModelId {
        self.inner.id
    }

    pub fn schema(&self) -> &Arc<dyn ModelSchema> {
        &self.inner.schema
    }

    /// Whether both handles point at the same entity.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ModelState> {
        lock(&self.inner.state)
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn key_name(&self) -> &str {
        self.inner.schema.key_name()
    }

    /// The primary key. Null and empty-string keys count as absent.
    pub fn key(&self) -> Option<Value> {
        let state = self.state();
        match state.values.get(self.key_name()) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(key) => Some(key.clone()),
        }
    }

    /// Whether the entity is known to the server: it has a key and has not
    /// been deleted.
    pub fn exists(&self) -> bool {
        self.key().is_some() && !self.is_deleted()
    }

    pub fn is_deleted(&self) -> bool {
        self.state().deleted
    }

    pub fn values(&self) -> EntityValues {
        self.state().values.clone()
    }

    pub fn sync_values(&self) -> EntityValues {
        self.state().sync_values.clone()
    }

    /// Whether the current values differ from the last synced ones.
    pub fn is_dirty(&self) -> bool {
        let state = self.state();
        state.values != state.sync_values
    }

    /// The changed subtree of the values relative to the last sync.
    pub fn dirty_values(&self) -> EntityValues {
        let state = self.state();
        values::diff(&state.values, &state.sync_values)
    }

    /// Reads the value at `property` (`"title"`, `"meta.tags[0]"`).
    ///
    /// A path that does not parse reads as absent, so `get_or` falls back
    /// to its default. Writes through [`set`](Self::set) and
    /// [`unset`](Self::unset) reject such paths with
    /// [`ModelError::InvalidPath`].
    pub fn get(&self, property: &str) -> Option<Value> {
        let path = Path::parse(property).ok()?;
        values::get(&self.state().values, &path).cloned()
    }

    /// Like [`get`](Self::get) but falls back to `default`.
    pub fn get_or(&self, property: &str, default: Value) -> Value {
        self.get(property).unwrap_or(default)
    }

    // ── Local mutation ───────────────────────────────────────────

    /// Writes `value` at `property`, creating intermediate containers.
    pub fn set(&self, property: &str, value: impl Into<Value>) -> ModelResult<&Self> {
        let path = Path::parse(property)?;
        values::set(&mut self.state().values, &path, value.into())?;
        Ok(self)
    }

    /// Removes `property` and returns what was there.
    pub fn unset(&self, property: &str) -> ModelResult<Option<Value>> {
        let path = Path::parse(property)?;
        Ok(values::unset(&mut self.state().values, &path))
    }

    /// Merges `incoming` over the current values (and those over the
    /// defaults).
    pub fn set_values(&self, incoming: &EntityValues) -> &Self {
        let defaults = self.inner.schema.defaults();
        let mut state = self.state();
        state.values = values::layered(&[&defaults, &state.values, incoming]);
        self
    }

    /// Restores the values captured at the last sync.
    pub fn rollback(&self) -> &Self {
        {
            let mut state = self.state();
            state.values = state.sync_values.clone();
        }
        self.fire(ModelEvent::Rollback);
        self
    }

    /// Takes the current values, merged over the defaults, as the new sync
    /// baseline.
    pub fn sync(&self) -> &Self {
        let defaults = self.inner.schema.defaults();
        {
            let mut state = self.state();
            let synced = values::layered(&[&defaults, &state.values]);
            state.values = synced.clone();
            state.sync_values = synced;
        }
        self.fire(ModelEvent::Sync);
        self
    }

    /// Resets the values to exactly the defaults. The sync baseline is left
    /// alone, so a cleared model is usually dirty.
    pub fn clear(&self) -> &Self {
        let defaults = self.inner.schema.defaults();
        self.state().values = defaults;
        self.fire(ModelEvent::Clear);
        self
    }

    // ── Save selection ───────────────────────────────────────────

    pub fn save_action(&self) -> SaveAction {
        if self.key().is_none() {
            SaveAction::Create
        } else if self.inner.schema.patch_updates() {
            SaveAction::Patch
        } else {
            SaveAction::Update
        }
    }

    /// The payload [`save`](Self::save) would send right now.
    pub fn save_values(&self) -> EntityValues {
        let action = self.save_action();
        let payload = match action {
            SaveAction::Patch => self.dirty_values(),
            SaveAction::Create | SaveAction::Update => self.values(),
        };
        self.inner.schema.map_save_values(payload, action.action())
    }

    // ── Observers ────────────────────────────────────────────────

    /// Notifies every registered observer, in registration order.
    pub fn fire(&self, event: ModelEvent) {
        let observers = self.inner.observers.snapshot();
        debug!("Model {} fired {} to {} observer(s)", self.id(), event, observers.len());
        for observer in observers {
            observer.notify(event, self);
        }
    }

    /// Registers `observer`. A no-op when it is already registered.
    pub fn add_observer(&self, observer: &Arc<dyn Observer>) -> bool {
        self.inner.observers.add(observer)
    }

    /// Deregisters `observer` and tells it through
    /// [`Observer::released`], so a collection drops the model from its
    /// membership too. A no-op when it is not registered.
    pub fn remove_observer(&self, observer: ObserverId) -> bool {
        let Some(handle) = self.inner.observers.remove(observer) else {
            return false;
        };
        if let Some(observer) = handle.upgrade() {
            observer.released(self);
        }
        true
    }

    pub fn observed_by(&self, observer: ObserverId) -> bool {
        self.inner.observers.contains(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Adds this model to every collection that does not hold it yet.
    pub fn add_to(&self, collections: &[&Collection]) -> &Self {
        for collection in collections {
            if !collection.observes(self) {
                collection.add(self);
            }
        }
        self
    }

    /// Removes this model from every given collection.
    pub fn remove_from(&self, collections: &[&Collection]) -> &Self {
        for collection in collections {
            collection.remove(self);
        }
        self
    }

    // ── Request state ────────────────────────────────────────────

    pub fn is_loading(&self) -> bool {
        self.inner.requester.is_loading()
    }

    pub fn validation_errors(&self) -> ValidationErrors {
        self.inner.requester.validation_errors()
    }

    pub fn set_validation_errors(&self, errors: ValidationErrors) {
        self.inner
            .requester
            .set_validation_errors(self.inner.schema.as_ref(), errors);
    }

    pub fn errors(&self, property: &str) -> Vec<String> {
        self.inner.requester.errors(property)
    }

    pub fn first_error(&self, property: &str) -> Option<String> {
        self.inner.requester.first_error(property)
    }

    // ── Remote lifecycle ─────────────────────────────────────────

    async fn request(&self, action: &str, payload: EntityValues) -> ModelResult<HttpResponse> {
        let key = self.key();
        self.inner
            .requester
            .request(self.inner.schema.as_ref(), default_routes(), key.as_ref(), action, payload)
            .await
    }

    fn adopt(&self, data: &Value) -> ModelResult<()> {
        let incoming = response_values(data)?;
        self.set_values(&incoming);
        Ok(())
    }

    /// Loads the entity from the server, adopts the response and syncs.
    /// On failure nothing changes.
    pub async fn fetch(&self) -> ModelResult<HttpResponse> {
        let response = self.request(FETCH, EntityValues::new()).await?;
        self.adopt(&response.data)?;
        self.sync();
        self.fire(ModelEvent::Fetched);
        Ok(response)
    }

    /// Creates, updates or patches the entity depending on
    /// [`save_action`](Self::save_action). An object response is adopted,
    /// so a server-assigned key is picked up. Any other 2xx body (empty,
    /// `"Created"`) adopts nothing but still syncs, since the write went
    /// through. On a validation failure the values are left as they were
    /// and the errors are captured.
    pub async fn save(&self) -> ModelResult<HttpResponse> {
        let action = self.save_action();
        let payload = self.save_values();
        let response = self.request(action.action(), payload).await?;
        match &response.data {
            Value::Object(incoming) => {
                self.set_values(incoming);
            }
            other => debug!(
                "Save of {} model {} answered with a {} body, nothing adopted",
                self.inner.schema.name(),
                self.id(),
                values::kind(other)
            ),
        }
        self.state().deleted = false;
        self.sync();
        self.fire(ModelEvent::Saved);
        Ok(response)
    }

    /// Deletes the entity on the server. The values stay readable and every
    /// observer is told, so collections drop the model.
    pub async fn delete(&self) -> ModelResult<HttpResponse> {
        let response = self.request(DELETE, EntityValues::new()).await?;
        self.state().deleted = true;
        self.fire(ModelEvent::Deleted);
        Ok(response)
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Model")
            .field("id", &self.inner.id)
            .field("resource", &self.inner.schema.name())
            .field("values", &state.values)
            .field("deleted", &state.deleted)
            .finish()
    }
}
