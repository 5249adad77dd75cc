//! Error types for the model layer.

use serde_json::Value;
use tether_http::HttpFailure;
use thiserror::Error;

use crate::requestable::ValidationErrors;

/// Result type for model and collection operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in model and collection operations.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// No route is configured for the action.
    #[error("the route for the '{action}' action does not exist")]
    RouteNotFound { action: String },

    /// No HTTP method is configured for the action.
    #[error("the method for the '{action}' action does not exist")]
    MethodNotFound { action: String },

    /// The action's route addresses a single entity but the model has no key.
    #[error("the route for the '{action}' action needs a primary key, but the model has none")]
    MissingKey { action: String },

    /// Another request is still in flight on the same instance.
    #[error("a request is already in flight on this instance")]
    Busy,

    /// The server rejected the payload with the validation status code.
    #[error("validation failed with status {status}")]
    Validation { status: u16, errors: ValidationErrors },

    /// The server answered with any other non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        data: Value,
        message: String,
    },

    /// No response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// `fetch` was called on a collection that only loads through `more`.
    #[error("fetch can't be called on a scrollable collection, use more() or reset()")]
    FetchDisallowed,

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A property path could not be parsed.
    #[error("invalid property path: {0}")]
    InvalidPath(String),
}

impl ModelError {
    /// Whether this is a validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, ModelError::Validation { .. })
    }

    /// Whether the request was rejected by the single-flight guard.
    pub fn is_busy(&self) -> bool {
        matches!(self, ModelError::Busy)
    }

    /// Whether the action was missing from the route or method tables,
    /// or its route could not be built.
    pub fn is_route_config(&self) -> bool {
        matches!(
            self,
            ModelError::RouteNotFound { .. }
                | ModelError::MethodNotFound { .. }
                | ModelError::MissingKey { .. }
        )
    }

    /// Whether the server answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// HTTP status of the server's answer, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ModelError::Validation { status, .. } | ModelError::Http { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<HttpFailure> for ModelError {
    fn from(failure: HttpFailure) -> Self {
        match failure.response {
            Some(response) => ModelError::Http {
                status: response.status,
                data: response.data,
                message: failure.message,
            },
            None => ModelError::Transport(failure.message),
        }
    }
}

impl From<tether_types::Error> for ModelError {
    fn from(error: tether_types::Error) -> Self {
        match error {
            tether_types::Error::InvalidPath { .. } => ModelError::InvalidPath(error.to_string()),
            tether_types::Error::Serialization(e) => ModelError::UnexpectedResponse(e.to_string()),
        }
    }
}
