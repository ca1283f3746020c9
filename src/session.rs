use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::debounce::{Debouncer, DEFAULT_DEBOUNCE};
use crate::dispatcher::QueryDispatcher;
use crate::fetcher::{FetchError, LoadOutcome, Row, TableLoader};
use crate::navigation::{Location, Navigator};
use crate::pagination;
use crate::query::{self, QueryMap};
use crate::state::{PaginationState, SortSpec, TableStateSnapshot, TableStore};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub id: String,
    pub header: String,
}

impl ColumnDef {
    pub fn new(id: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            header: header.into(),
        }
    }
}

pub fn default_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("name", "Full Name"),
        ColumnDef::new("email", "Email Address"),
        ColumnDef::new("age", "Age"),
    ]
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub columns: Vec<ColumnDef>,
    pub debounce: Duration,
    pub reset_page_on_filter: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            debounce: DEFAULT_DEBOUNCE,
            reset_page_on_filter: false,
        }
    }
}

/// What the table currently displays.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TableView {
    pub rows: Vec<Row>,
    pub total_count: u64,
    pub page_count: usize,
    pub query: String,
}

struct FilterInput {
    column_id: String,
    input: Debouncer<String>,
}

/// A mounted table: store, URL dispatcher, debounced filter inputs and the
/// loader, wired together.
pub struct TableSession {
    store: Arc<TableStore>,
    navigator: Arc<dyn Navigator>,
    dispatcher: Arc<QueryDispatcher>,
    loader: Arc<TableLoader>,
    columns: Vec<ColumnDef>,
    filter_inputs: Vec<FilterInput>,
    reset_page_on_filter: bool,
    view: Mutex<TableView>,
    dispatch_task: JoinHandle<()>,
}

impl TableSession {
    /// Reads the initial state from the navigator's location and starts the
    /// dispatcher. Must be called inside a tokio runtime.
    pub fn mount(
        navigator: Arc<dyn Navigator>,
        loader: Arc<TableLoader>,
        options: SessionOptions,
    ) -> Self {
        let location = navigator.location();
        let initial = query::deserialize(&location.query);
        tracing::info!(%location, "mounting table session");

        let store = Arc::new(TableStore::new(initial.clone()));
        let dispatcher = Arc::new(QueryDispatcher::new(navigator.clone()));
        let dispatch_task = dispatcher.spawn(store.subscribe());

        let filter_inputs = options
            .columns
            .iter()
            .map(|column| {
                let initial_value = initial.filters.get(&column.id).unwrap_or_default();
                FilterInput {
                    column_id: column.id.clone(),
                    input: filter_debouncer(
                        store.clone(),
                        column.id.clone(),
                        initial_value.to_string(),
                        options.debounce,
                        options.reset_page_on_filter,
                    ),
                }
            })
            .collect();

        Self {
            store,
            navigator,
            dispatcher,
            loader,
            columns: options.columns,
            filter_inputs,
            reset_page_on_filter: options.reset_page_on_filter,
            view: Mutex::new(TableView::default()),
            dispatch_task,
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn snapshot(&self) -> TableStateSnapshot {
        self.store.snapshot()
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn location(&self) -> Location {
        self.navigator.location()
    }

    pub fn view(&self) -> TableView {
        self.view.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn has_column(&self, column_id: &str) -> bool {
        self.columns.iter().any(|c| c.id == column_id)
    }

    /// Header click: unsorted, then ascending, then descending, then unsorted.
    pub fn toggle_sort(&self, column_id: &str) -> Option<SortSpec> {
        if !self.has_column(column_id) {
            tracing::warn!(column = column_id, "toggle_sort on unknown column");
            return self.snapshot().sort;
        }
        let next = match self.snapshot().sort {
            Some(s) if s.column_id == column_id && !s.descending => {
                Some(SortSpec::descending(column_id))
            }
            Some(s) if s.column_id == column_id => None,
            _ => Some(SortSpec::ascending(column_id)),
        };
        self.store.set_sort(next.clone());
        next
    }

    pub fn set_sort(&self, sort: Option<SortSpec>) {
        self.store.set_sort(sort);
    }

    /// Keystroke in a column's filter box. Reaches the store once the input
    /// has been quiet for the debounce delay.
    pub fn type_filter(&self, column_id: &str, text: &str) -> bool {
        match self.filter_input(column_id) {
            Some(f) => {
                f.input.set_pending(text.to_string());
                true
            }
            None => {
                tracing::warn!(column = column_id, "type_filter on unknown column");
                false
            }
        }
    }

    /// Applies a filter value immediately, bypassing the debounce.
    pub fn apply_filter(&self, column_id: &str, value: &str) -> bool {
        let Some(f) = self.filter_input(column_id) else {
            tracing::warn!(column = column_id, "apply_filter on unknown column");
            return false;
        };
        f.input.sync(value.to_string());
        commit_filter(&self.store, column_id, value, self.reset_page_on_filter);
        true
    }

    pub fn filter_text(&self, column_id: &str) -> Option<String> {
        self.filter_input(column_id).and_then(|f| f.input.current())
    }

    fn filter_input(&self, column_id: &str) -> Option<&FilterInput> {
        self.filter_inputs.iter().find(|f| f.column_id == column_id)
    }

    pub fn set_pagination(&self, pagination: PaginationState) {
        self.store.set_pagination(pagination);
    }

    pub fn can_next_page(&self) -> bool {
        let page_count = self.view().page_count;
        pagination::can_next_page(self.snapshot().pagination.page_index(), page_count)
    }

    pub fn can_previous_page(&self) -> bool {
        pagination::can_previous_page(self.snapshot().pagination.page_index())
    }

    pub fn next_page(&self) -> bool {
        if !self.can_next_page() {
            return false;
        }
        let page_count = self.view().page_count;
        let current = self.snapshot().pagination;
        self.store
            .set_pagination(pagination::next_page(current, page_count));
        true
    }

    pub fn previous_page(&self) -> bool {
        if !self.can_previous_page() {
            return false;
        }
        let current = self.snapshot().pagination;
        self.store.set_pagination(pagination::previous_page(current));
        true
    }

    pub fn set_page_size(&self, page_size: usize) {
        let current = self.snapshot().pagination;
        self.store
            .set_pagination(pagination::with_page_size(current, page_size));
    }

    /// Writes the current snapshot to the URL right away instead of waiting
    /// for the dispatcher task.
    pub fn sync_url(&self) -> Option<QueryMap> {
        self.dispatcher.dispatch(&self.store.snapshot())
    }

    /// Fetches rows for the current location. Returns `None` when a newer
    /// load superseded this one, or when the location moved on while the
    /// request was in flight.
    pub async fn load(&self) -> Result<Option<TableView>, FetchError> {
        let query = self.navigator.location().search();
        match self.loader.load(&query).await? {
            LoadOutcome::Stale => Ok(None),
            LoadOutcome::Fresh(_) if self.navigator.location().search() != query => {
                tracing::warn!(query = %query, "location changed during load, dropping rows");
                Ok(None)
            }
            LoadOutcome::Fresh(result) => {
                let view = TableView {
                    page_count: result.page_count(),
                    total_count: result.total_count,
                    rows: result.rows,
                    query,
                };
                if let Ok(mut current) = self.view.lock() {
                    *current = view.clone();
                }
                Ok(Some(view))
            }
        }
    }

    /// Reloads on every navigation. Load errors are logged and the previous
    /// rows are kept.
    pub fn spawn_autoload(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::downgrade(self);
        let mut changes = self.navigator.subscribe();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(session) = session.upgrade() else {
                    return;
                };
                if let Err(e) = session.load().await {
                    tracing::error!(error = %e, "table load failed");
                }
            }
        })
    }
}

impl Drop for TableSession {
    fn drop(&mut self) {
        self.dispatch_task.abort();
    }
}

fn filter_debouncer(
    store: Arc<TableStore>,
    column_id: String,
    initial: String,
    delay: Duration,
    reset_page: bool,
) -> Debouncer<String> {
    Debouncer::new(
        initial,
        move |value: String| {
            tracing::debug!(column = %column_id, value = %value, "filter input settled");
            commit_filter(&store, &column_id, &value, reset_page);
        },
        delay,
    )
}

fn commit_filter(store: &TableStore, column_id: &str, value: &str, reset_page: bool) {
    if store.snapshot().filters.get(column_id).unwrap_or_default() == value {
        return;
    }
    store.update_filters(|filters| filters.set(column_id, value));
    if reset_page {
        let first = store.snapshot().pagination.first_page();
        store.set_pagination(first);
    }
}
