//! Tests for resource.rs: routes, the data-driven resource and its serde
//! form, and the default trait hooks.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tether::{
    default_methods, CollectionSchema, EntityValues, ModelError, ModelSchema, Resource,
    ResourceConfig, Route,
};
use tether_http::HttpMethod;

struct Bare;

impl Resource for Bare {
    fn name(&self) -> &str {
        "bare"
    }
}

impl ModelSchema for Bare {}

impl CollectionSchema for Bare {
    fn model_schema(&self) -> Arc<dyn ModelSchema> {
        Arc::new(Bare)
    }
}

// ── Route ───────────────────────────────────────────────────────

#[test]
fn route_paths() {
    let key = json!(12);
    assert_eq!(Route::Collection.resolve("todos", None, "fetch").unwrap(), "/todos");
    assert_eq!(Route::Member.resolve("todos", Some(&key), "fetch").unwrap(), "/todos/12");
    assert_eq!(
        Route::MemberAction("complete".into()).resolve("todos", Some(&json!("x7")), "complete").unwrap(),
        "/todos/x7/complete"
    );
    assert_eq!(Route::Path("/health".into()).resolve("todos", None, "ping").unwrap(), "/health");
}

#[test]
fn member_route_needs_a_usable_key() {
    let err = Route::Member.resolve("todos", Some(&json!({"a": 1})), "update").unwrap_err();
    assert!(matches!(err, ModelError::MissingKey { ref action } if action == "update"));
    assert_eq!(
        err.to_string(),
        "the route for the 'update' action needs a primary key, but the model has none"
    );
}

#[test]
fn route_serde_shape() {
    assert_eq!(serde_json::to_value(Route::Member).unwrap(), json!({"kind": "member"}));
    assert_eq!(
        serde_json::to_value(Route::Path("/x".into())).unwrap(),
        json!({"kind": "path", "path": "/x"})
    );
    let route: Route = serde_json::from_value(json!({"kind": "member_action", "path": "archive"})).unwrap();
    assert_eq!(route, Route::MemberAction("archive".into()));
}

// ── Defaults ────────────────────────────────────────────────────

#[test]
fn default_method_table() {
    let methods = default_methods();
    assert_eq!(methods.len(), 5);
    assert_eq!(methods["fetch"], HttpMethod::Get);
    assert_eq!(methods["save"], HttpMethod::Post);
    assert_eq!(methods["update"], HttpMethod::Put);
    assert_eq!(methods["patch"], HttpMethod::Patch);
    assert_eq!(methods["delete"], HttpMethod::Delete);
}

#[test]
fn trait_defaults() {
    assert_eq!(Bare.base_path(), "");
    assert_eq!(Bare.validation_error_code(), 422);
    assert!(Bare.methods().is_empty());
    assert!(Bare.routes().is_empty());
    assert_eq!(Bare.key_name(), "id");
    assert!(!Bare.patch_updates());
    let mut expected = EntityValues::new();
    expected.insert("id".into(), json!(null));
    assert_eq!(ModelSchema::defaults(&Bare), expected);
    assert_eq!(Bare.page_parameter(), "page");
    assert!(CollectionSchema::static_filters(&Bare).is_empty());

    let items = Bare.items(&json!([{"id": 1}])).unwrap();
    assert_eq!(items.len(), 1);
    let data = Bare.map_pagination(&json!({"data": [], "next_page_url": "x"})).unwrap();
    assert!(data.has_more_pages);
}

// ── ResourceConfig ──────────────────────────────────────────────

#[test]
fn config_builders() {
    let config = ResourceConfig::new("posts")
        .with_base_path("https://api.test")
        .with_key_name("slug")
        .with_defaults(json!({"slug": null, "body": ""}))
        .with_method("publish", HttpMethod::Post)
        .with_route("publish", Route::MemberAction("publish".into()))
        .with_validation_error_code(400)
        .with_patch_updates(true)
        .with_static_filters(json!({"published": true}))
        .with_page_parameter("p")
        .with_pagination_keys("items", "next");

    assert_eq!(config.name(), "posts");
    assert_eq!(config.base_path(), "https://api.test");
    assert_eq!(config.key_name(), "slug");
    assert_eq!(ModelSchema::defaults(&config)["body"], json!(""));
    assert_eq!(config.methods()["publish"], HttpMethod::Post);
    assert_eq!(config.routes()["publish"], Route::MemberAction("publish".into()));
    assert_eq!(config.validation_error_code(), 400);
    assert!(config.patch_updates());
    assert_eq!(CollectionSchema::static_filters(&config)["published"], json!(true));
    assert_eq!(config.page_parameter(), "p");
    assert_eq!(config.model_schema().key_name(), "slug");
}

#[test]
fn config_ignores_non_object_defaults() {
    let config = ResourceConfig::new("posts").with_defaults(json!([1, 2])).with_static_filters(json!("x"));
    assert_eq!(config.defaults, None);
    assert!(config.static_filters.is_empty());
    assert_eq!(ModelSchema::defaults(&config).len(), 1);
}

#[test]
fn config_deserializes_with_defaults() {
    let config: ResourceConfig = serde_json::from_value(json!({
        "name": "todos",
        "base_path": "https://jsonplaceholder.typicode.com",
        "routes": {"fetch": {"kind": "path", "path": "/todos/mine"}},
        "methods": {"archive": "post"}
    }))
    .unwrap();

    assert_eq!(config.name, "todos");
    assert_eq!(config.key_name, "id");
    assert_eq!(config.validation_error_code, 422);
    assert_eq!(config.page_parameter, "page");
    assert_eq!(config.items_key, "data");
    assert_eq!(config.next_page_marker, "next_page_url");
    assert_eq!(config.routes["fetch"], Route::Path("/todos/mine".into()));
    assert_eq!(config.methods["archive"], HttpMethod::Post);
}

#[test]
fn config_serde_round_trip() {
    let config = ResourceConfig::new("todos")
        .with_defaults(json!({"id": null, "done": false}))
        .with_route("fetch", Route::Collection);
    let text = serde_json::to_string(&config).unwrap();
    let back: ResourceConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back, config);
}
