//! The request lifecycle shared by models and collections.
//!
//! A [`Requester`] resolves an action to a method and URL, enforces the
//! single-flight `loading` guard, dispatches through the [`HttpClient`] and
//! classifies the outcome. Validation failures are captured into the
//! instance's validation errors before the failure is returned, so callers
//! can either read them back or match on [`ModelError::Validation`].

use crate::error::{ModelError, ModelResult};
use crate::resource::{default_methods, Resource, RouteTable};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tether_http::{HttpClient, HttpFailure, HttpMethod, HttpRequest, HttpResponse};
use tether_types::values::EntityValues;
use tracing::{debug, warn};

/// Field name to the server's messages for that field.
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reads Laravel-style `{"field": ["message", ...]}` errors. Single string
/// messages are accepted too; anything else is dropped.
pub fn parse_validation_errors(errors: Option<&Value>) -> ValidationErrors {
    let Some(Value::Object(map)) = errors else {
        return ValidationErrors::new();
    };
    map.iter()
        .filter_map(|(field, messages)| {
            let messages = match messages {
                Value::String(message) => vec![message.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(|m| m.as_str().map(str::to_string))
                    .collect(),
                _ => return None,
            };
            Some((field.clone(), messages))
        })
        .collect()
}

/// Resets the loading flag on every exit path.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-instance request state: the HTTP client, the loading flag and the
/// validation errors of the last request.
pub struct Requester {
    client: Arc<dyn HttpClient>,
    loading: AtomicBool,
    validation_errors: Mutex<ValidationErrors>,
}

impl Requester {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            loading: AtomicBool::new(false),
            validation_errors: Mutex::new(ValidationErrors::new()),
        }
    }

    /// The client requests are sent through.
    pub fn client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    /// Whether a request is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Validation errors captured from the last request. Empty when the
    /// last request did not fail validation.
    pub fn validation_errors(&self) -> ValidationErrors {
        lock(&self.validation_errors).clone()
    }

    /// Stores `errors` after passing them through the resource's
    /// `map_validation_errors` hook.
    pub fn set_validation_errors<R: Resource + ?Sized>(&self, resource: &R, errors: ValidationErrors) {
        *lock(&self.validation_errors) = resource.map_validation_errors(errors);
    }

    /// Messages for `property`, empty when there are none.
    pub fn errors(&self, property: &str) -> Vec<String> {
        lock(&self.validation_errors)
            .get(property)
            .cloned()
            .unwrap_or_default()
    }

    /// First message for `property`.
    pub fn first_error(&self, property: &str) -> Option<String> {
        lock(&self.validation_errors)
            .get(property)
            .and_then(|messages| messages.first().cloned())
    }

    /// Performs `action` against `resource`.
    ///
    /// `default_routes` are the routes of the calling kind (model or
    /// collection); the resource's own routes override them. `key` fills
    /// member routes. `payload` becomes the body or the query depending on
    /// the method.
    pub async fn request<R: Resource + ?Sized>(
        &self,
        resource: &R,
        default_routes: RouteTable,
        key: Option<&Value>,
        action: &str,
        payload: EntityValues,
    ) -> ModelResult<HttpResponse> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected '{}' on {}: a request is already in flight", action, resource.name());
            return Err(ModelError::Busy);
        }
        let _guard = LoadingGuard(&self.loading);

        let (method, url) = resolve(resource, default_routes, key, action)?;
        lock(&self.validation_errors).clear();

        debug!("{} {} ({} {})", method, url, resource.name(), action);
        let request = HttpRequest::new(method, url).with_payload(payload);

        match self.client.send(request).await {
            Ok(response) => Ok(resource.map_success_response(response, action)),
            Err(failure) => Err(self.classify(resource, action, failure)),
        }
    }

    fn classify<R: Resource + ?Sized>(&self, resource: &R, action: &str, failure: HttpFailure) -> ModelError {
        let code = resource.validation_error_code();
        if let Some(response) = failure.response.as_ref().filter(|r| r.status == code) {
            let errors = resource.map_validation_errors(parse_validation_errors(response.data.get("errors")));
            debug!(
                "Validation failed for '{}' on {}: {} field(s)",
                action,
                resource.name(),
                errors.len()
            );
            *lock(&self.validation_errors) = errors.clone();
            return ModelError::Validation {
                status: response.status,
                errors,
            };
        }

        let failure = resource.map_error_response(failure, action);
        warn!("'{}' on {} failed: {}", action, resource.name(), failure);
        ModelError::from(failure)
    }
}

/// Resolves `action` to its method and full URL.
pub fn resolve<R: Resource + ?Sized>(
    resource: &R,
    default_routes: RouteTable,
    key: Option<&Value>,
    action: &str,
) -> ModelResult<(HttpMethod, String)> {
    let mut routes = default_routes;
    routes.extend(resource.routes());
    let mut methods = default_methods();
    methods.extend(resource.methods());

    let route = routes.get(action).ok_or_else(|| ModelError::RouteNotFound {
        action: action.to_string(),
    })?;
    let method = methods
        .get(action)
        .copied()
        .ok_or_else(|| ModelError::MethodNotFound {
            action: action.to_string(),
        })?;
    let path = route.resolve(resource.name(), key, action)?;

    Ok((method, format!("{}{}", resource.base_path(), path)))
}
