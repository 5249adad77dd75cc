//! Ordered sets of models.
//!
//! A [`Collection`] holds strong handles to its members and registers
//! itself as an observer of each one, so a member's deletion removes it
//! from every collection that held it. Membership is append-only: adding
//! the same entity twice keeps both entries.
//!
//! Membership, lookup and inspection live on [`CollectionView`], which a
//! `Collection` derefs to. Paginated collections hand out only the view,
//! so their loads always go through the page cursor.
//!
//! Lock order is collection membership first, model state second. Models
//! never reach back into a collection while holding their own state.

use crate::error::{ModelError, ModelResult};
use crate::model::Model;
use crate::observer::Observer;
use crate::requestable::{lock, Requester, ValidationErrors};
use crate::resource::{CollectionSchema, Filters, ModelSchema, Route, RouteTable, FETCH, SAVE};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tether_http::{HttpClient, HttpResponse};
use tether_types::values::{self, EntityValues, Path};
use tether_types::{ModelEvent, ObserverId};
use tracing::{debug, info};

/// Routes a collection uses when its schema does not override them.
pub fn default_routes() -> RouteTable {
    RouteTable::from([
        (FETCH.to_string(), Route::Collection),
        (SAVE.to_string(), Route::Collection),
    ])
}

/// Reads a bare JSON array of objects.
pub fn array_items(body: &Value) -> ModelResult<Vec<EntityValues>> {
    let Value::Array(items) = body else {
        return Err(ModelError::UnexpectedResponse(format!(
            "expected an array of items, found {}",
            values::kind(body)
        )));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map.clone()),
            other => Err(ModelError::UnexpectedResponse(format!(
                "expected item objects, found {}",
                values::kind(other)
            ))),
        })
        .collect()
}

/// Something that can be added to a collection.
#[derive(Debug, Clone)]
pub enum Member {
    /// An existing model, shared as-is.
    Model(Model),
    /// Raw values, turned into a new model of the collection's schema.
    Values(EntityValues),
}

impl From<Model> for Member {
    fn from(model: Model) -> Self {
        Member::Model(model)
    }
}

impl From<&Model> for Member {
    fn from(model: &Model) -> Self {
        Member::Model(model.clone())
    }
}

impl From<EntityValues> for Member {
    fn from(values: EntityValues) -> Self {
        Member::Values(values)
    }
}

/// How members are picked out for lookups and removal.
#[derive(Debug, Clone)]
pub enum Selector {
    /// The very same entity.
    Model(Model),
    /// Every member whose values contain all of these keys with equal
    /// values.
    Values(EntityValues),
}

impl Selector {
    fn selects(&self, model: &Model) -> bool {
        match self {
            Selector::Model(target) => target.ptr_eq(model),
            Selector::Values(filter) => values::matches(&model.values(), filter),
        }
    }
}

impl From<Model> for Selector {
    fn from(model: Model) -> Self {
        Selector::Model(model)
    }
}

impl From<&Model> for Selector {
    fn from(model: &Model) -> Self {
        Selector::Model(model.clone())
    }
}

impl From<EntityValues> for Selector {
    fn from(values: EntityValues) -> Self {
        Selector::Values(values)
    }
}

/// Whether a load replaces the membership or appends to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fill {
    Replace,
    Append,
}

struct CollectionInner {
    id: ObserverId,
    schema: Arc<dyn CollectionSchema>,
    model_schema: Arc<dyn ModelSchema>,
    requester: Requester,
    models: Mutex<Vec<Model>>,
    static_filters: Mutex<Filters>,
}

impl CollectionInner {
    /// Drops every entry of `model` and stops observing it.
    fn detach(&self, model: &Model) -> usize {
        let removed = {
            let mut models = lock(&self.models);
            let before = models.len();
            models.retain(|m| !m.ptr_eq(model));
            before - models.len()
        };
        model.remove_observer(self.id);
        removed
    }
}

impl Observer for CollectionInner {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn notify(&self, event: ModelEvent, model: &Model) {
        if event == ModelEvent::Deleted {
            let removed = self.detach(model);
            info!(
                "Removed deleted model {} from {} collection {} ({} entr{})",
                model.id(),
                self.schema.name(),
                self.id,
                removed,
                if removed == 1 { "y" } else { "ies" }
            );
        }
    }

    fn released(&self, model: &Model) {
        let mut models = lock(&self.models);
        let before = models.len();
        models.retain(|m| !m.ptr_eq(model));
        if models.len() != before {
            debug!(
                "Model {} stopped being observed by {} collection {}, dropped from membership",
                model.id(),
                self.schema.name(),
                self.id
            );
        }
    }
}

/// Membership, lookup and request state of a collection, without the
/// requests that load or save it.
#[derive(Clone)]
pub struct CollectionView {
    inner: Arc<CollectionInner>,
}

/// Handle to an ordered set of models.
#[derive(Clone)]
pub struct Collection {
    view: CollectionView,
}

impl Deref for Collection {
    type Target = CollectionView;

    fn deref(&self) -> &CollectionView {
        &self.view
    }
}

impl CollectionView {
    /// This collection's identity as an observer.
    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    pub fn schema(&self) -> &Arc<dyn CollectionSchema> {
        &self.inner.schema
    }

    fn as_observer(&self) -> Arc<dyn Observer> {
        self.inner.clone()
    }

    /// Builds a model of this collection's schema. Not added.
    pub fn make_model(&self, values: EntityValues) -> Model {
        Model::new(
            self.inner.model_schema.clone(),
            self.inner.requester.client().clone(),
            values,
        )
    }

    fn into_model(&self, member: Member) -> Model {
        match member {
            Member::Model(model) => model,
            Member::Values(values) => self.make_model(values),
        }
    }

    // ── Membership ───────────────────────────────────────────────

    /// Appends `member` and observes it. Returns the model that was added.
    pub fn add(&self, member: impl Into<Member>) -> Model {
        let model = self.into_model(member.into());
        lock(&self.inner.models).push(model.clone());
        model.add_observer(&self.as_observer());
        model
    }

    /// Appends every member in order.
    pub fn add_all<I, M>(&self, members: I) -> Vec<Model>
    where
        I: IntoIterator<Item = M>,
        M: Into<Member>,
    {
        let added: Vec<Model> = members
            .into_iter()
            .map(|member| self.into_model(member.into()))
            .collect();
        lock(&self.inner.models).extend(added.iter().cloned());
        let observer = self.as_observer();
        for model in &added {
            model.add_observer(&observer);
        }
        added
    }

    /// Removes every member picked by `selector` and stops observing them.
    /// Returns the removed models.
    pub fn remove(&self, selector: impl Into<Selector>) -> Vec<Model> {
        let selector = selector.into();
        let removed: Vec<Model> = {
            let mut models = lock(&self.inner.models);
            let (removed, kept) = std::mem::take(&mut *models)
                .into_iter()
                .partition(|model| selector.selects(model));
            *models = kept;
            removed
        };
        self.release(&removed);
        removed
    }

    /// Removes the members picked by each selector in turn.
    pub fn remove_all<I, S>(&self, selectors: I) -> Vec<Model>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selector>,
    {
        selectors
            .into_iter()
            .flat_map(|selector| self.remove(selector))
            .collect()
    }

    /// Stops observing removed models that are no longer members.
    fn release(&self, removed: &[Model]) {
        let gone: Vec<&Model> = {
            let models = lock(&self.inner.models);
            removed
                .iter()
                .filter(|model| !models.iter().any(|m| m.ptr_eq(model)))
                .collect()
        };
        for model in gone {
            model.remove_observer(self.inner.id);
        }
    }

    /// Empties the collection and stops observing every former member.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *lock(&self.inner.models));
        for model in &removed {
            model.remove_observer(self.inner.id);
        }
    }

    fn replace_with(&self, incoming: Vec<Model>, fill: Fill) {
        if fill == Fill::Replace {
            self.clear();
        }
        self.add_all(incoming);
    }

    // ── Lookup ───────────────────────────────────────────────────

    /// First member picked by `selector`.
    pub fn find(&self, selector: impl Into<Selector>) -> Option<Model> {
        let selector = selector.into();
        lock(&self.inner.models)
            .iter()
            .find(|model| selector.selects(model))
            .cloned()
    }

    /// Every member picked by `selector`, in order.
    pub fn filter(&self, selector: impl Into<Selector>) -> Vec<Model> {
        let selector = selector.into();
        lock(&self.inner.models)
            .iter()
            .filter(|model| selector.selects(model))
            .cloned()
            .collect()
    }

    /// Position of the first member picked by `selector`.
    pub fn find_index(&self, selector: impl Into<Selector>) -> Option<usize> {
        let selector = selector.into();
        lock(&self.inner.models)
            .iter()
            .position(|model| selector.selects(model))
    }

    pub fn contains(&self, selector: impl Into<Selector>) -> bool {
        self.find_index(selector).is_some()
    }

    /// Whether this collection is registered on `model`.
    pub fn observes(&self, model: &Model) -> bool {
        model.observed_by(self.inner.id)
    }

    /// Stable sort on one or more value paths. Ties keep their relative
    /// order in both directions.
    pub fn sort(&self, by: &[&str], descending: bool) -> ModelResult<()> {
        let paths = by
            .iter()
            .map(|raw| Path::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let mut models = lock(&self.inner.models);
        let mut keyed: Vec<(EntityValues, Model)> = models
            .drain(..)
            .map(|model| (model.values(), model))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = paths
                .iter()
                .map(|path| values::compare(values::get(a, path), values::get(b, path)))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal);
            if descending { ordering.reverse() } else { ordering }
        });
        models.extend(keyed.into_iter().map(|(_, model)| model));
        Ok(())
    }

    // ── Inspection ───────────────────────────────────────────────

    /// Snapshot of the members.
    pub fn models(&self) -> Vec<Model> {
        lock(&self.inner.models).clone()
    }

    pub fn dirty_models(&self) -> Vec<Model> {
        lock(&self.inner.models)
            .iter()
            .filter(|model| model.is_dirty())
            .cloned()
            .collect()
    }

    /// Values of every member, in order.
    pub fn to_array(&self) -> Vec<EntityValues> {
        lock(&self.inner.models).iter().map(Model::values).collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.inner.models).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.models).is_empty()
    }

    pub fn static_filters(&self) -> Filters {
        lock(&self.inner.static_filters).clone()
    }

    pub fn set_static_filters(&self, filters: Filters) {
        *lock(&self.inner.static_filters) = filters;
    }

    // ── Request state ────────────────────────────────────────────

    pub fn is_loading(&self) -> bool {
        self.inner.requester.is_loading()
    }

    pub fn validation_errors(&self) -> ValidationErrors {
        self.inner.requester.validation_errors()
    }

    pub fn errors(&self, property: &str) -> Vec<String> {
        self.inner.requester.errors(property)
    }

    pub fn first_error(&self, property: &str) -> Option<String> {
        self.inner.requester.first_error(property)
    }
}

impl Collection {
    /// Creates an empty collection. Static filters start from the schema's.
    pub fn new(schema: Arc<dyn CollectionSchema>, client: Arc<dyn HttpClient>) -> Self {
        let model_schema = schema.model_schema();
        let static_filters = schema.static_filters();
        Self {
            view: CollectionView {
                inner: Arc::new(CollectionInner {
                    id: ObserverId::new(),
                    schema,
                    model_schema,
                    requester: Requester::new(client),
                    models: Mutex::new(Vec::new()),
                    static_filters: Mutex::new(static_filters),
                }),
            },
        }
    }

    /// Creates a collection holding `members`.
    pub fn with_members<I, M>(schema: Arc<dyn CollectionSchema>, client: Arc<dyn HttpClient>, members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Member>,
    {
        let collection = Self::new(schema, client);
        collection.add_all(members);
        collection
    }

    // ── Remote lifecycle ─────────────────────────────────────────

    /// Replaces the membership with the server's list. Static filters go
    /// first, `filters` override them. A failed fetch leaves the
    /// membership untouched.
    pub async fn fetch(&self, filters: Filters) -> ModelResult<HttpResponse> {
        let (response, _) = self.load(filters, None, Fill::Replace).await?;
        Ok(response)
    }

    /// Fetches with `page` in the page parameter and reads the response as
    /// a pagination envelope. Returns whether more pages exist.
    pub(crate) async fn load(
        &self,
        filters: Filters,
        page: Option<u32>,
        fill: Fill,
    ) -> ModelResult<(HttpResponse, bool)> {
        let schema = &self.inner.schema;
        let mut merged = values::layered(&[&self.static_filters(), &filters]);
        if let Some(page) = page {
            merged.insert(schema.page_parameter().to_string(), Value::from(page));
        }
        schema.before_fetch(&mut merged);

        let response = self
            .inner
            .requester
            .request(schema.as_ref(), default_routes(), None, FETCH, merged)
            .await?;

        let (items, has_more) = match page {
            Some(_) => {
                let data = schema.map_pagination(&response.data)?;
                (data.items, data.has_more_pages)
            }
            None => (schema.items(&response.data)?, false),
        };
        let incoming: Vec<Model> = items.into_iter().map(|values| self.make_model(values)).collect();
        debug!(
            "Fetched {} {} item(s) ({:?})",
            incoming.len(),
            schema.name(),
            fill
        );
        self.replace_with(incoming, fill);
        Ok((response, has_more))
    }

    /// Saves every dirty member in one request keyed by the resource name,
    /// then repopulates from the response. Validation errors of the form
    /// `"<resource>.<index>.<field>"` are handed back to the dirty member
    /// at that index; dirty members with no errors get theirs cleared.
    pub async fn save(&self) -> ModelResult<HttpResponse> {
        let schema = &self.inner.schema;
        let dirty = self.dirty_models();
        let batch: Vec<Value> = dirty
            .iter()
            .map(|model| Value::Object(model.save_values()))
            .collect();
        let mut payload = EntityValues::new();
        payload.insert(schema.name().to_string(), Value::Array(batch));

        let result = self
            .inner
            .requester
            .request(schema.as_ref(), default_routes(), None, SAVE, payload)
            .await;

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                if let ModelError::Validation { errors, .. } = &error {
                    self.distribute(&dirty, errors);
                }
                return Err(error);
            }
        };

        let items = schema.items(&response.data)?;
        let incoming: Vec<Model> = items.into_iter().map(|values| self.make_model(values)).collect();
        self.replace_with(incoming, Fill::Replace);
        Ok(response)
    }

    fn distribute(&self, dirty: &[Model], errors: &ValidationErrors) {
        let prefix = format!("{}.", self.inner.schema.name());
        let mut per_model: BTreeMap<usize, ValidationErrors> = BTreeMap::new();
        for (key, messages) in errors {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let Some((index, field)) = rest.split_once('.') else {
                continue;
            };
            let Ok(index) = index.parse::<usize>() else {
                continue;
            };
            per_model
                .entry(index)
                .or_default()
                .insert(field.to_string(), messages.clone());
        }
        for (index, model) in dirty.iter().enumerate() {
            model.set_validation_errors(per_model.remove(&index).unwrap_or_default());
        }
        for index in per_model.keys() {
            debug!("Validation errors for missing batch index {}", index);
        }
    }
}

impl fmt::Debug for CollectionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.inner.id)
            .field("resource", &self.inner.schema.name())
            .field("count", &self.count())
            .finish()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.view, f)
    }
}
