//! HTTP collaborator contract for tether.
//!
//! Models and collections never talk to a socket directly. They hand an
//! [`HttpRequest`] to something implementing [`HttpClient`] and get back
//! either an [`HttpResponse`] (`{data, status}`) or an [`HttpFailure`]
//! (`{response: {status, data}}` when the server answered, message only when
//! it did not).
//!
//! Two implementations ship with the crate:
//! - [`ReqwestClient`] for real traffic, configured through [`ClientConfig`]
//! - [`mock::MockClient`] for tests: scripted replies plus a request log

mod client;
pub mod mock;
mod reqwest_client;

pub use client::{
    query_pairs, ErrorResponse, HttpClient, HttpFailure, HttpMethod, HttpRequest, HttpResponse,
    HttpResult,
};
pub use reqwest_client::{ClientConfig, ReqwestClient};
