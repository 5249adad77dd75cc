//! A scripted [`HttpClient`] for tests.
//!
//! Replies are registered per `(method, path)` and optionally narrowed by
//! query parameters. Every request that reaches the mock is logged so tests
//! can assert on the exact payload a model or collection sent.

use crate::client::{HttpClient, HttpFailure, HttpMethod, HttpRequest, HttpResponse, HttpResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Respond(u16, Value),
    Fail(String),
}

#[derive(Debug)]
struct Script {
    method: HttpMethod,
    path: String,
    query: Vec<(String, String)>,
    replies: VecDeque<Reply>,
}

impl Script {
    fn matches(&self, request: &HttpRequest) -> bool {
        self.method == request.method
            && self.path == request.path()
            && self
                .query
                .iter()
                .all(|(name, value)| request.query_value(name) == Some(value.as_str()))
    }

    /// Pops queued replies in order; the last one sticks.
    fn next_reply(&mut self) -> Option<Reply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

/// An in-memory HTTP client with scripted replies.
#[derive(Debug, Default)]
pub struct MockClient {
    scripts: Mutex<Vec<Script>>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockClient {
    /// Creates a mock with no scripted replies. Unscripted requests answer
    /// with a 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every reply, letting tests overlap requests.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn push(&self, method: HttpMethod, path: &str, query: &[(&str, &str)], reply: Reply) {
        let mut scripts = lock(&self.scripts);
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        if let Some(script) = scripts
            .iter_mut()
            .find(|s| s.method == method && s.path == path && s.query == query)
        {
            script.replies.push_back(reply);
            return;
        }
        scripts.push(Script {
            method,
            path: path.to_string(),
            query,
            replies: VecDeque::from([reply]),
        });
    }

    /// Answers `method path` with `status` and `body`. Registering several
    /// replies for the same route queues them; the last one repeats.
    pub fn respond(&self, method: HttpMethod, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, &[], Reply::Respond(status, body));
        self
    }

    /// Like [`respond`](Self::respond) but only for requests whose query
    /// contains every pair in `query`. Query-narrowed scripts take priority
    /// over broader ones registered earlier.
    pub fn respond_to_query(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(&str, &str)],
        status: u16,
        body: Value,
    ) -> &Self {
        self.push(method, path, query, Reply::Respond(status, body));
        self
    }

    /// Fails `method path` without a response, like a dropped connection.
    pub fn fail(&self, method: HttpMethod, path: &str, message: &str) -> &Self {
        self.push(method, path, &[], Reply::Fail(message.to_string()));
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        lock(&self.requests).last().cloned()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn reply_for(&self, request: &HttpRequest) -> Option<Reply> {
        let mut scripts = lock(&self.scripts);
        let reply = scripts
            .iter_mut()
            .filter(|s| s.matches(request))
            .max_by_key(|s| s.query.len())
            .and_then(Script::next_reply);
        reply
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
        lock(&self.requests).push(request.clone());
        let reply = self.reply_for(&request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match reply {
            Some(Reply::Respond(status, data)) if (200..300).contains(&status) => {
                Ok(HttpResponse::new(status, data))
            }
            Some(Reply::Respond(status, data)) => Err(HttpFailure::from_response(status, data)),
            Some(Reply::Fail(message)) => Err(HttpFailure::transport(message)),
            None => Err(HttpFailure::from_response(
                404,
                json!({ "message": format!("no mock for {} {}", request.method, request.path()) }),
            )),
        }
    }
}
