//! Reactive REST data access.
//!
//! A [`Model`] tracks one entity's current and last-synced values, works out
//! what changed, and maps fetch/save/delete onto HTTP calls. A
//! [`Collection`] holds an ordered set of models, observes them, and drops
//! members the moment they are deleted. [`PaginatedCollection`] and
//! [`ScrollableCollection`] add a page cursor on top.
//!
//! Resources are described by [`ResourceConfig`] or by implementing
//! [`Resource`], [`ModelSchema`] and [`CollectionSchema`] directly. Requests
//! go through any [`tether_http::HttpClient`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tether::{Model, ResourceConfig};
//! use tether_http::{ClientConfig, ReqwestClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(ReqwestClient::new(ClientConfig::default())?);
//! let todos = Arc::new(
//!     ResourceConfig::new("todos").with_base_path("https://jsonplaceholder.typicode.com"),
//! );
//!
//! let mut values = tether::EntityValues::new();
//! values.insert("id".into(), json!(1));
//! let todo = Model::new(todos, client, values);
//! todo.fetch().await?;
//! todo.set("title", "Hola")?;
//! assert!(todo.is_dirty());
//! todo.save().await?;
//! # Ok(())
//! # }
//! ```

mod collection;
mod error;
mod model;
mod observer;
mod pagination;
mod requestable;
mod resource;

pub use collection::{array_items, Collection, CollectionView, Member, Selector};
pub use error::{ModelError, ModelResult};
pub use model::{Model, SaveAction};
pub use observer::Observer;
pub use pagination::{
    envelope, PageCursor, PageState, PaginatedCollection, PaginationData, PaginationMode,
    ScrollableCollection,
};
pub use requestable::{parse_validation_errors, resolve, Requester, ValidationErrors};
pub use resource::{
    default_methods, CollectionSchema, Filters, MethodTable, ModelSchema, Resource,
    ResourceConfig, Route, RouteTable, DELETE, FETCH, PATCH, SAVE, UPDATE,
};
pub use tether_types::{EntityValues, ModelEvent, ModelId, ObserverId};

/// Default routes of models and collections.
pub mod routes {
    pub use crate::collection::default_routes as collection;
    pub use crate::model::default_routes as model;
}
