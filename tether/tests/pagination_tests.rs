//! Tests for pagination.rs: the page cursor, envelope parsing and the
//! paginated and scrollable collections.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tether::{
    envelope, CollectionView, EntityValues, ModelError, PageCursor, PageState, PaginatedCollection,
    PaginationMode, ResourceConfig, ScrollableCollection,
};
use tether_http::mock::MockClient;
use tether_http::HttpMethod;

fn obj(value: Value) -> EntityValues {
    tether_types::values::from_value(value).unwrap()
}

fn todos() -> Arc<ResourceConfig> {
    Arc::new(ResourceConfig::new("todos"))
}

fn page(items: &[i64], next: Option<&str>) -> Value {
    let data: Vec<Value> = items.iter().map(|id| json!({"id": id})).collect();
    json!({"current_page": 1, "data": data, "next_page_url": next})
}

/// Two pages of todos: 1, 2 then 3.
fn two_pages() -> Arc<MockClient> {
    let client = Arc::new(MockClient::new());
    client
        .respond_to_query(HttpMethod::Get, "/todos", &[("page", "1")], 200, page(&[1, 2], Some("/todos?page=2")))
        .respond_to_query(HttpMethod::Get, "/todos", &[("page", "2")], 200, page(&[3], None));
    client
}

fn ids(values: Vec<EntityValues>) -> Vec<Value> {
    values.into_iter().map(|v| v["id"].clone()).collect()
}

fn pages_requested(client: &MockClient) -> Vec<String> {
    client
        .requests()
        .iter()
        .filter_map(|request| request.query_value("page").map(str::to_string))
        .collect()
}

// ── PageCursor ──────────────────────────────────────────────────

#[test]
fn navigate_cursor_floors_at_one() {
    let mut cursor = PageCursor::new(PaginationMode::Navigate);
    assert_eq!(cursor.current_page(), 1);
    assert!(cursor.is_first_page());

    cursor.retreat();
    assert_eq!(cursor.current_page(), 1);
    cursor.set_current_page(0);
    assert_eq!(cursor.current_page(), 1);
    cursor.advance();
    cursor.advance();
    assert_eq!(cursor.current_page(), 3);
    assert!(!cursor.is_first_page());
    cursor.retreat();
    assert_eq!(cursor.current_page(), 2);
}

#[test]
fn accumulate_cursor_starts_at_zero() {
    let mut cursor = PageCursor::new(PaginationMode::Accumulate);
    assert_eq!(cursor.minimum(), 0);
    assert_eq!(cursor.current_page(), 0);
    cursor.advance();
    assert!(cursor.is_first_page());
    cursor.reset();
    assert_eq!(cursor.current_page(), 0);
}

#[test]
fn cursor_state_transitions() {
    let mut cursor = PageCursor::starting_at(PaginationMode::Navigate, 0);
    assert_eq!(cursor.current_page(), 1);
    assert_eq!(cursor.state(), PageState::NoData);
    assert!(!cursor.is_last_page());

    cursor.record(true);
    assert_eq!(cursor.state(), PageState::HasMore);
    assert!(cursor.has_more_pages());

    cursor.record(false);
    assert_eq!(cursor.state(), PageState::LastPage);
    assert!(cursor.is_last_page());

    cursor.reset();
    assert_eq!(cursor.state(), PageState::NoData);
}

// ── Envelope ────────────────────────────────────────────────────

#[test]
fn envelope_reads_items_and_marker() {
    let data = envelope(&page(&[1, 2], Some("next")), "data", "next_page_url").unwrap();
    assert_eq!(ids(data.items), vec![json!(1), json!(2)]);
    assert!(data.has_more_pages);

    let data = envelope(&page(&[3], None), "data", "next_page_url").unwrap();
    assert!(!data.has_more_pages);

    let data = envelope(&json!({"data": []}), "data", "next_page_url").unwrap();
    assert!(!data.has_more_pages);
}

#[test]
fn envelope_rejects_wrong_shapes() {
    for body in [json!([]), json!({"items": []}), json!({"data": {"id": 1}})] {
        let err = envelope(&body, "data", "next_page_url").unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedResponse(_)), "{body}");
    }
}

// ── PaginatedCollection ─────────────────────────────────────────

#[tokio::test]
async fn paginated_navigation_replaces_pages() {
    let client = two_pages();
    let todos = PaginatedCollection::new(todos(), client.clone());
    assert_eq!(todos.page_state(), PageState::NoData);

    todos.fetch(EntityValues::new()).await.unwrap();
    assert_eq!(ids(todos.to_array()), vec![json!(1), json!(2)]);
    assert!(todos.is_first_page());
    assert!(todos.has_more_pages());
    assert_eq!(todos.page_state(), PageState::HasMore);

    todos.next_page(EntityValues::new()).await.unwrap();
    assert_eq!(ids(todos.to_array()), vec![json!(3)]);
    assert_eq!(todos.current_page(), 2);
    assert!(todos.is_last_page());

    todos.previous_page(EntityValues::new()).await.unwrap();
    assert_eq!(ids(todos.to_array()), vec![json!(1), json!(2)]);
    assert_eq!(todos.current_page(), 1);

    assert_eq!(pages_requested(&client), vec!["1", "2", "1"]);
}

#[tokio::test]
async fn go_to_page_floors_and_passes_filters() {
    let client = two_pages();
    let todos = PaginatedCollection::starting_at(todos(), client.clone(), 2);

    todos.go_to_page(0, obj(json!({"userId": 1}))).await.unwrap();

    assert_eq!(todos.current_page(), 1);
    let request = client.last_request().unwrap();
    assert_eq!(request.query_value("page"), Some("1"));
    assert_eq!(request.query_value("userId"), Some("1"));
}

#[tokio::test]
async fn failed_navigation_rolls_the_cursor_back() {
    let client = two_pages();
    client.respond_to_query(HttpMethod::Get, "/todos", &[("page", "3")], 500, json!({}));
    let todos = PaginatedCollection::new(todos(), client.clone());
    todos.fetch(EntityValues::new()).await.unwrap();
    todos.next_page(EntityValues::new()).await.unwrap();

    let err = todos.next_page(EntityValues::new()).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(todos.current_page(), 2);
    assert_eq!(ids(todos.to_array()), vec![json!(3)]);
    assert!(todos.is_last_page());
}

#[tokio::test]
async fn custom_page_parameter_and_envelope_keys() {
    let client = Arc::new(MockClient::new());
    client.respond_to_query(
        HttpMethod::Get,
        "/todos",
        &[("p", "1")],
        200,
        json!({"items": [{"id": 1}], "next": "/todos?p=2"}),
    );
    let schema = Arc::new(
        ResourceConfig::new("todos")
            .with_page_parameter("p")
            .with_pagination_keys("items", "next"),
    );
    let todos = PaginatedCollection::new(schema, client);

    todos.fetch(EntityValues::new()).await.unwrap();

    assert_eq!(todos.count(), 1);
    assert!(todos.has_more_pages());
}

#[tokio::test]
async fn set_current_page_moves_without_loading() {
    let client = two_pages();
    let todos = PaginatedCollection::new(todos(), client.clone());

    todos.set_current_page(2);
    assert_eq!(client.request_count(), 0);
    todos.fetch(EntityValues::new()).await.unwrap();

    assert_eq!(ids(todos.to_array()), vec![json!(3)]);
    assert_eq!(todos.cursor().current_page(), 2);
}

// ── ScrollableCollection ────────────────────────────────────────

#[tokio::test]
async fn scroll_more_appends_pages() {
    let client = two_pages();
    let todos = ScrollableCollection::new(todos(), client.clone());
    assert_eq!(todos.current_page(), 0);

    todos.more(EntityValues::new()).await.unwrap();
    assert_eq!(ids(todos.to_array()), vec![json!(1), json!(2)]);
    assert!(todos.has_more_pages());

    todos.more(EntityValues::new()).await.unwrap();
    assert_eq!(ids(todos.to_array()), vec![json!(1), json!(2), json!(3)]);
    assert_eq!(todos.current_page(), 2);
    assert!(todos.is_last_page());
    assert!(todos.models().iter().all(|model| todos.observes(model)));
}

#[tokio::test]
async fn scroll_reset_starts_over() {
    let client = two_pages();
    let todos = ScrollableCollection::new(todos(), client.clone());
    todos.more(EntityValues::new()).await.unwrap();
    todos.more(EntityValues::new()).await.unwrap();
    let old = todos.models();

    todos.reset(EntityValues::new()).await.unwrap();

    assert_eq!(ids(todos.to_array()), vec![json!(1), json!(2)]);
    assert_eq!(todos.current_page(), 1);
    assert_eq!(todos.page_state(), PageState::HasMore);
    assert!(old.iter().all(|model| !todos.observes(model)));
    assert_eq!(pages_requested(&client), vec!["1", "2", "1"]);
}

#[tokio::test]
async fn scroll_fetch_is_refused() {
    let client = two_pages();
    let todos = ScrollableCollection::new(todos(), client.clone());

    let err = todos.fetch(EntityValues::new()).await.unwrap_err();

    assert!(matches!(err, ModelError::FetchDisallowed));
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn scroll_members_are_only_loaded_through_the_cursor() {
    let client = two_pages();
    let todos = ScrollableCollection::new(todos(), client.clone());
    todos.more(EntityValues::new()).await.unwrap();

    let view: &CollectionView = todos.collection();
    assert_eq!(view.count(), 2);
    assert!(todos.fetch(EntityValues::new()).await.is_err());

    assert_eq!(ids(view.to_array()), vec![json!(1), json!(2)]);
    assert_eq!(pages_requested(&client), vec!["1"]);
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn failed_more_keeps_cursor_and_items() {
    let client = Arc::new(MockClient::new());
    client
        .respond_to_query(HttpMethod::Get, "/todos", &[("page", "1")], 200, page(&[1, 2], Some("/todos?page=2")))
        .respond_to_query(HttpMethod::Get, "/todos", &[("page", "2")], 502, json!({}));
    let todos = ScrollableCollection::new(todos(), client.clone());
    todos.more(EntityValues::new()).await.unwrap();

    let err = todos.more(EntityValues::new()).await.unwrap_err();

    assert_eq!(err.status(), Some(502));
    assert_eq!(todos.current_page(), 1);
    assert_eq!(todos.count(), 2);
}
