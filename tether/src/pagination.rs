//! Page cursors and the collections that drive them.
//!
//! Pagination is a [`PageCursor`] attached to a [`Collection`]. The cursor
//! runs in one of two modes: [`PaginationMode::Navigate`] moves between
//! pages and replaces the membership on every load, while
//! [`PaginationMode::Accumulate`] only moves forward and appends.
//!
//! The cursor moves before the request is sent, so the request carries the
//! new page. If the request fails the cursor is moved back, keeping it in
//! step with what the collection actually holds.

use crate::collection::{array_items, Collection, CollectionView, Fill};
use crate::error::{ModelError, ModelResult};
use crate::requestable::lock;
use crate::resource::{CollectionSchema, Filters};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tether_http::{HttpClient, HttpResponse};
use tether_types::values::{self, EntityValues};
use tracing::{debug, warn};

/// How the cursor moves and what a load does to the membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// Explicit page navigation. Pages start at 1; loads replace.
    Navigate,
    /// "Load more". The cursor starts at 0; loads append.
    Accumulate,
}

impl PaginationMode {
    /// Lowest page the cursor can hold.
    pub fn minimum(&self) -> u32 {
        match self {
            PaginationMode::Navigate => 1,
            PaginationMode::Accumulate => 0,
        }
    }
}

/// Where a paginated collection stands after its last load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    /// Nothing loaded yet.
    NoData,
    /// The server reported another page.
    HasMore,
    /// The server reported no further page.
    LastPage,
}

/// What a paginated response carries.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationData {
    pub items: Vec<EntityValues>,
    pub has_more_pages: bool,
}

/// Reads a `{ <items_key>: [...], <marker>: ... }` envelope. More pages
/// exist when the marker is present and not null.
pub fn envelope(body: &Value, items_key: &str, marker: &str) -> ModelResult<PaginationData> {
    let Value::Object(map) = body else {
        return Err(ModelError::UnexpectedResponse(format!(
            "expected a pagination envelope, found {}",
            values::kind(body)
        )));
    };
    let items = map.get(items_key).ok_or_else(|| {
        ModelError::UnexpectedResponse(format!("pagination envelope has no '{items_key}' key"))
    })?;
    Ok(PaginationData {
        items: array_items(items)?,
        has_more_pages: map.get(marker).is_some_and(|m| !m.is_null()),
    })
}

/// The page state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    mode: PaginationMode,
    current_page: u32,
    has_more_pages: bool,
    loaded: bool,
}

impl PageCursor {
    /// A cursor at the mode's minimum with nothing loaded.
    pub fn new(mode: PaginationMode) -> Self {
        Self::starting_at(mode, mode.minimum())
    }

    pub fn starting_at(mode: PaginationMode, page: u32) -> Self {
        Self {
            mode,
            current_page: page.max(mode.minimum()),
            has_more_pages: false,
            loaded: false,
        }
    }

    pub fn mode(&self) -> PaginationMode {
        self.mode
    }

    pub fn minimum(&self) -> u32 {
        self.mode.minimum()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Moves to `page`, floored at the minimum.
    pub fn set_current_page(&mut self, page: u32) {
        self.current_page = page.max(self.minimum());
    }

    pub fn advance(&mut self) {
        self.current_page = self.current_page.saturating_add(1);
    }

    pub fn retreat(&mut self) {
        self.set_current_page(self.current_page.saturating_sub(1));
    }

    /// Back to the minimum with nothing loaded.
    pub fn reset(&mut self) {
        self.current_page = self.minimum();
        self.has_more_pages = false;
        self.loaded = false;
    }

    /// Takes in the outcome of a successful load.
    pub fn record(&mut self, has_more_pages: bool) {
        self.has_more_pages = has_more_pages;
        self.loaded = true;
    }

    pub fn state(&self) -> PageState {
        match (self.loaded, self.has_more_pages) {
            (false, _) => PageState::NoData,
            (true, true) => PageState::HasMore,
            (true, false) => PageState::LastPage,
        }
    }

    pub fn is_first_page(&self) -> bool {
        self.current_page == 1
    }

    pub fn is_last_page(&self) -> bool {
        self.state() == PageState::LastPage
    }

    pub fn has_more_pages(&self) -> bool {
        self.has_more_pages
    }
}

/// A collection plus a cursor, shared by both pagination modes.
struct Pager {
    collection: Collection,
    cursor: Mutex<PageCursor>,
}

impl Pager {
    fn new(collection: Collection, cursor: PageCursor) -> Self {
        Self {
            collection,
            cursor: Mutex::new(cursor),
        }
    }

    fn cursor(&self) -> PageCursor {
        lock(&self.cursor).clone()
    }

    fn fill(&self) -> Fill {
        match lock(&self.cursor).mode() {
            PaginationMode::Navigate => Fill::Replace,
            PaginationMode::Accumulate => Fill::Append,
        }
    }

    async fn load_current(&self, filters: Filters) -> ModelResult<HttpResponse> {
        let page = lock(&self.cursor).current_page();
        let (response, has_more) = self.collection.load(filters, Some(page), self.fill()).await?;
        lock(&self.cursor).record(has_more);
        debug!(
            "Loaded page {} of {} (more: {})",
            page,
            self.collection.schema().name(),
            has_more
        );
        Ok(response)
    }

    /// Moves the cursor, loads, and moves it back if the load fails.
    async fn move_and_load(
        &self,
        step: impl FnOnce(&mut PageCursor),
        filters: Filters,
    ) -> ModelResult<HttpResponse> {
        let (previous, target) = {
            let mut cursor = lock(&self.cursor);
            let previous = cursor.current_page();
            step(&mut *cursor);
            (previous, cursor.current_page())
        };
        match self.load_current(filters).await {
            Ok(response) => Ok(response),
            Err(error) => {
                let mut cursor = lock(&self.cursor);
                if cursor.current_page() == target {
                    cursor.set_current_page(previous);
                }
                warn!(
                    "Loading page {} of {} failed, cursor back at {}: {}",
                    target,
                    self.collection.schema().name(),
                    cursor.current_page(),
                    error
                );
                Err(error)
            }
        }
    }
}

/// A collection navigated one page at a time. Every load replaces the
/// membership with the loaded page.
pub struct PaginatedCollection {
    pager: Pager,
}

impl PaginatedCollection {
    pub fn new(schema: Arc<dyn CollectionSchema>, client: Arc<dyn HttpClient>) -> Self {
        Self::starting_at(schema, client, 1)
    }

    /// A collection whose first fetch loads `page` (floored at 1).
    pub fn starting_at(schema: Arc<dyn CollectionSchema>, client: Arc<dyn HttpClient>, page: u32) -> Self {
        Self {
            pager: Pager::new(
                Collection::new(schema, client),
                PageCursor::starting_at(PaginationMode::Navigate, page),
            ),
        }
    }

    /// Members and lookups. Loading goes through the cursor only.
    pub fn collection(&self) -> &CollectionView {
        &self.pager.collection
    }

    pub fn cursor(&self) -> PageCursor {
        self.pager.cursor()
    }

    pub fn current_page(&self) -> u32 {
        self.cursor().current_page()
    }

    /// Moves the cursor without loading, floored at 1.
    pub fn set_current_page(&self, page: u32) {
        lock(&self.pager.cursor).set_current_page(page);
    }

    pub fn is_first_page(&self) -> bool {
        self.cursor().is_first_page()
    }

    pub fn is_last_page(&self) -> bool {
        self.cursor().is_last_page()
    }

    pub fn has_more_pages(&self) -> bool {
        self.cursor().has_more_pages()
    }

    pub fn page_state(&self) -> PageState {
        self.cursor().state()
    }

    /// Loads the current page.
    pub async fn fetch(&self, filters: Filters) -> ModelResult<HttpResponse> {
        self.pager.load_current(filters).await
    }

    pub async fn next_page(&self, filters: Filters) -> ModelResult<HttpResponse> {
        self.pager.move_and_load(PageCursor::advance, filters).await
    }

    pub async fn previous_page(&self, filters: Filters) -> ModelResult<HttpResponse> {
        self.pager.move_and_load(PageCursor::retreat, filters).await
    }

    pub async fn go_to_page(&self, page: u32, filters: Filters) -> ModelResult<HttpResponse> {
        self.pager
            .move_and_load(|cursor| cursor.set_current_page(page), filters)
            .await
    }
}

impl Deref for PaginatedCollection {
    type Target = CollectionView;

    fn deref(&self) -> &CollectionView {
        &self.pager.collection
    }
}

/// An infinite-scroll collection. [`more`](Self::more) appends the next
/// page; a plain fetch is refused.
///
/// Only the [`CollectionView`] is reachable from here, so the refusal can't
/// be sidestepped through the underlying collection:
///
/// ```compile_fail
/// # use std::sync::Arc;
/// # use tether::{Collection, EntityValues, ResourceConfig, ScrollableCollection};
/// # use tether_http::mock::MockClient;
/// # async fn run() {
/// let feed = ScrollableCollection::new(Arc::new(ResourceConfig::new("todos")), Arc::new(MockClient::new()));
/// let _ = Collection::fetch(feed.collection(), EntityValues::new()).await;
/// # }
/// ```
pub struct ScrollableCollection {
    pager: Pager,
}

impl ScrollableCollection {
    pub fn new(schema: Arc<dyn CollectionSchema>, client: Arc<dyn HttpClient>) -> Self {
        Self {
            pager: Pager::new(
                Collection::new(schema, client),
                PageCursor::new(PaginationMode::Accumulate),
            ),
        }
    }

    /// Members and lookups. Loading goes through the cursor only.
    pub fn collection(&self) -> &CollectionView {
        &self.pager.collection
    }

    pub fn cursor(&self) -> PageCursor {
        self.pager.cursor()
    }

    pub fn current_page(&self) -> u32 {
        self.cursor().current_page()
    }

    pub fn is_first_page(&self) -> bool {
        self.cursor().is_first_page()
    }

    pub fn is_last_page(&self) -> bool {
        self.cursor().is_last_page()
    }

    pub fn has_more_pages(&self) -> bool {
        self.cursor().has_more_pages()
    }

    pub fn page_state(&self) -> PageState {
        self.cursor().state()
    }

    /// Always fails with [`ModelError::FetchDisallowed`]; use
    /// [`more`](Self::more) or [`reset`](Self::reset).
    pub async fn fetch(&self, _filters: Filters) -> ModelResult<HttpResponse> {
        Err(ModelError::FetchDisallowed)
    }

    /// Appends the next page.
    pub async fn more(&self, filters: Filters) -> ModelResult<HttpResponse> {
        self.pager.move_and_load(PageCursor::advance, filters).await
    }

    /// Drops every member, rewinds the cursor and loads the first page.
    pub async fn reset(&self, filters: Filters) -> ModelResult<HttpResponse> {
        self.pager.collection.clear();
        lock(&self.pager.cursor).reset();
        self.more(filters).await
    }
}

impl Deref for ScrollableCollection {
    type Target = CollectionView;

    fn deref(&self) -> &CollectionView {
        &self.pager.collection
    }
}
