//! Request/response types and the [`HttpClient`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type for HTTP operations.
pub type HttpResult<T> = Result<T, HttpFailure>;

/// HTTP verbs a resource action can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    /// Whether the payload of this method travels in the request body.
    /// The others carry it as query parameters.
    #[must_use]
    pub fn sends_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    /// Upper-case wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// A single outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// JSON body, only for methods that [send a body](HttpMethod::sends_body).
    pub body: Option<Value>,
    /// Flattened query parameters.
    pub query: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a request with no body and no query.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            query: Vec::new(),
        }
    }

    /// Attaches `payload` the way the method expects it: as the JSON body
    /// for POST/PUT/PATCH, as query parameters for GET/DELETE.
    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        if self.method.sends_body() {
            self.body = Some(Value::Object(payload));
        } else {
            self.query = query_pairs(&payload);
        }
        self
    }

    /// The path portion of the URL (scheme, host and query stripped).
    pub fn path(&self) -> &str {
        let without_scheme = match self.url.find("://") {
            Some(pos) => &self.url[pos + 3..],
            None => self.url.as_str(),
        };
        let path = if self.url.contains("://") {
            without_scheme
                .find('/')
                .map_or("/", |pos| &without_scheme[pos..])
        } else {
            without_scheme
        };
        path.split('?').next().unwrap_or(path)
    }

    /// First query value for `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Flattens a JSON object into query pairs.
///
/// Scalars become their plain text, `null` entries are skipped, arrays
/// expand to repeated `key[]` pairs and nested objects are sent as JSON text.
#[must_use]
pub fn query_pairs(payload: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in payload {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item) {
                        pairs.push((format!("{key}[]"), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    pairs.push((key.clone(), text));
                }
            }
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON body. `Null` for empty bodies; non-JSON bodies are kept
    /// as a JSON string.
    pub data: Value,
}

impl HttpResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self { status, data }
    }
}

/// The server's answer attached to a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub data: Value,
}

/// A failed request.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct HttpFailure {
    pub message: String,
    /// Present when the server answered with a non-2xx status.
    pub response: Option<ErrorResponse>,
}

impl HttpFailure {
    /// A failure carrying the server's status and body.
    pub fn from_response(status: u16, data: Value) -> Self {
        Self {
            message: format!("request failed with status code {status}"),
            response: Some(ErrorResponse { status, data }),
        }
    }

    /// A failure where no response was received (DNS, connect, timeout...).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    /// Status code of the server's answer, if any.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    /// Body of the server's answer, if any.
    pub fn data(&self) -> Option<&Value> {
        self.response.as_ref().map(|r| &r.data)
    }
}

/// Anything that can carry an [`HttpRequest`] to a server.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends the request. 2xx answers resolve to `Ok`, everything else
    /// (including transport errors) to `Err`.
    async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse>;
}
