//! Resource definitions.
//!
//! A resource tells the request layer how to reach the server: its name,
//! base path, which HTTP method and route each action uses, and a set of
//! hooks for reshaping payloads and responses. [`ModelSchema`] and
//! [`CollectionSchema`] add the entity- and list-level knobs on top.
//!
//! Most resources are fully described by data, so [`ResourceConfig`]
//! implements all three traits and can be deserialized from JSON.
//! Implement the traits directly when a hook needs code.

use crate::collection::array_items;
use crate::error::{ModelError, ModelResult};
use crate::pagination::{envelope, PaginationData};
use crate::requestable::ValidationErrors;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tether_http::{HttpFailure, HttpMethod, HttpResponse};
use tether_types::values::{self, EntityValues};

/// Request filters are plain entity values.
pub type Filters = EntityValues;

/// Action name to HTTP method.
pub type MethodTable = HashMap<String, HttpMethod>;

/// Action name to route.
pub type RouteTable = HashMap<String, Route>;

pub const FETCH: &str = "fetch";
pub const SAVE: &str = "save";
pub const UPDATE: &str = "update";
pub const PATCH: &str = "patch";
pub const DELETE: &str = "delete";

/// Where an action's request goes, relative to the resource's base path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum Route {
    /// `/{name}`
    Collection,
    /// `/{name}/{key}`
    Member,
    /// `/{name}/{key}/{action}`
    MemberAction(String),
    /// A fixed path, used verbatim.
    Path(String),
}

impl Route {
    /// Builds the path for this route. `key` is the entity's primary key;
    /// member routes fail when it is absent.
    pub fn resolve(&self, name: &str, key: Option<&Value>, action: &str) -> ModelResult<String> {
        let key_text = || -> ModelResult<String> {
            match key {
                Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(ModelError::MissingKey {
                    action: action.to_string(),
                }),
            }
        };
        Ok(match self {
            Route::Collection => format!("/{name}"),
            Route::Member => format!("/{name}/{}", key_text()?),
            Route::MemberAction(suffix) => format!("/{name}/{}/{suffix}", key_text()?),
            Route::Path(path) => path.clone(),
        })
    }
}

/// The method table every resource starts from.
pub fn default_methods() -> MethodTable {
    HashMap::from([
        (FETCH.to_string(), HttpMethod::Get),
        (SAVE.to_string(), HttpMethod::Post),
        (PATCH.to_string(), HttpMethod::Patch),
        (UPDATE.to_string(), HttpMethod::Put),
        (DELETE.to_string(), HttpMethod::Delete),
    ])
}

/// Anything addressable over HTTP.
pub trait Resource: Send + Sync {
    /// Resource name used in default routes (e.g. `"todos"`) and as the
    /// key of batch-save payloads.
    fn name(&self) -> &str;

    /// Prefix prepended to every route (e.g. `https://api.example.com`).
    fn base_path(&self) -> &str {
        ""
    }

    /// Overrides and additions to [`default_methods`].
    fn methods(&self) -> MethodTable {
        MethodTable::new()
    }

    /// Overrides and additions to the default routes of models or
    /// collections.
    fn routes(&self) -> RouteTable {
        RouteTable::new()
    }

    /// Status the server uses for validation failures.
    fn validation_error_code(&self) -> u16 {
        422
    }

    /// Reshapes a successful response before anything else sees it.
    fn map_success_response(&self, response: HttpResponse, action: &str) -> HttpResponse {
        let _ = action;
        response
    }

    /// Reshapes a failed response (validation failures excluded) before it
    /// is surfaced.
    fn map_error_response(&self, failure: HttpFailure, action: &str) -> HttpFailure {
        let _ = action;
        failure
    }

    /// Reshapes the server's validation errors before they are stored.
    fn map_validation_errors(&self, errors: ValidationErrors) -> ValidationErrors {
        errors
    }
}

/// Entity-level configuration.
pub trait ModelSchema: Resource {
    /// Values of a freshly constructed entity.
    fn defaults(&self) -> EntityValues {
        let mut defaults = EntityValues::new();
        defaults.insert(self.key_name().to_string(), Value::Null);
        defaults
    }

    /// Name of the primary-key field.
    fn key_name(&self) -> &str {
        "id"
    }

    /// Send updates as PATCH with only the changed values instead of PUT
    /// with everything.
    fn patch_updates(&self) -> bool {
        false
    }

    /// Reshapes the payload of a save before it is sent.
    fn map_save_values(&self, values: EntityValues, action: &str) -> EntityValues {
        let _ = action;
        values
    }
}

/// List-level configuration.
pub trait CollectionSchema: Resource {
    /// Schema of the members, used to build models from raw values.
    fn model_schema(&self) -> Arc<dyn ModelSchema>;

    /// Filters sent with every fetch, before call-site filters.
    fn static_filters(&self) -> Filters {
        Filters::new()
    }

    /// Last chance to adjust the merged filters before a fetch is sent.
    fn before_fetch(&self, filters: &mut Filters) {
        let _ = filters;
    }

    /// Extracts member values from a plain (non-paginated) list response.
    fn items(&self, body: &Value) -> ModelResult<Vec<EntityValues>> {
        array_items(body)
    }

    /// Query parameter carrying the page cursor.
    fn page_parameter(&self) -> &str {
        "page"
    }

    /// Interprets a paginated response envelope.
    fn map_pagination(&self, body: &Value) -> ModelResult<PaginationData> {
        envelope(body, "data", "next_page_url")
    }
}

/// A resource described entirely by data.
///
/// ```
/// use tether::{ModelSchema, Resource, ResourceConfig};
/// use serde_json::json;
///
/// let todos = ResourceConfig::new("todos")
///     .with_base_path("https://jsonplaceholder.typicode.com")
///     .with_defaults(json!({"id": null, "userId": null, "title": "", "completed": false}));
///
/// assert_eq!(todos.name(), "todos");
/// assert_eq!(todos.defaults()["completed"], false);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub name: String,
    pub base_path: String,
    pub key_name: String,
    /// Defaults of a fresh entity. When `None`, `{key_name: null}`.
    pub defaults: Option<EntityValues>,
    pub methods: MethodTable,
    pub routes: RouteTable,
    pub validation_error_code: u16,
    pub patch_updates: bool,
    pub static_filters: Filters,
    pub page_parameter: String,
    /// Key of the item array inside a paginated envelope.
    pub items_key: String,
    /// Key whose non-null value signals that another page exists.
    pub next_page_marker: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_path: String::new(),
            key_name: "id".to_string(),
            defaults: None,
            methods: MethodTable::new(),
            routes: RouteTable::new(),
            validation_error_code: 422,
            patch_updates: false,
            static_filters: Filters::new(),
            page_parameter: "page".to_string(),
            items_key: "data".to_string(),
            next_page_marker: "next_page_url".to_string(),
        }
    }
}

impl ResourceConfig {
    /// A resource named `name` with every other setting at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    /// Sets the defaults. Non-object values are ignored.
    #[must_use]
    pub fn with_defaults(mut self, defaults: Value) -> Self {
        if let Ok(defaults) = values::from_value(defaults) {
            self.defaults = Some(defaults);
        }
        self
    }

    #[must_use]
    pub fn with_method(mut self, action: impl Into<String>, method: HttpMethod) -> Self {
        self.methods.insert(action.into(), method);
        self
    }

    #[must_use]
    pub fn with_route(mut self, action: impl Into<String>, route: Route) -> Self {
        self.routes.insert(action.into(), route);
        self
    }

    #[must_use]
    pub fn with_validation_error_code(mut self, code: u16) -> Self {
        self.validation_error_code = code;
        self
    }

    #[must_use]
    pub fn with_patch_updates(mut self, patch_updates: bool) -> Self {
        self.patch_updates = patch_updates;
        self
    }

    /// Sets the static filters. Non-object values are ignored.
    #[must_use]
    pub fn with_static_filters(mut self, filters: Value) -> Self {
        if let Ok(filters) = values::from_value(filters) {
            self.static_filters = filters;
        }
        self
    }

    #[must_use]
    pub fn with_page_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.page_parameter = parameter.into();
        self
    }

    #[must_use]
    pub fn with_pagination_keys(
        mut self,
        items_key: impl Into<String>,
        next_page_marker: impl Into<String>,
    ) -> Self {
        self.items_key = items_key.into();
        self.next_page_marker = next_page_marker.into();
        self
    }
}

impl Resource for ResourceConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_path(&self) -> &str {
        &self.base_path
    }

    fn methods(&self) -> MethodTable {
        self.methods.clone()
    }

    fn routes(&self) -> RouteTable {
        self.routes.clone()
    }

    fn validation_error_code(&self) -> u16 {
        self.validation_error_code
    }
}

impl ModelSchema for ResourceConfig {
    fn defaults(&self) -> EntityValues {
        match &self.defaults {
            Some(defaults) => defaults.clone(),
            None => {
                let mut defaults = EntityValues::new();
                defaults.insert(self.key_name.clone(), Value::Null);
                defaults
            }
        }
    }

    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn patch_updates(&self) -> bool {
        self.patch_updates
    }
}

impl CollectionSchema for ResourceConfig {
    fn model_schema(&self) -> Arc<dyn ModelSchema> {
        Arc::new(self.clone())
    }

    fn static_filters(&self) -> Filters {
        self.static_filters.clone()
    }

    fn page_parameter(&self) -> &str {
        &self.page_parameter
    }

    fn map_pagination(&self, body: &Value) -> ModelResult<PaginationData> {
        envelope(body, &self.items_key, &self.next_page_marker)
    }
}
