use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;

pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Single-column sort. `None` at the snapshot level means "unsorted".
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub column_id: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn ascending(column_id: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            descending: false,
        }
    }

    pub fn descending(column_id: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            descending: true,
        }
    }

    pub fn direction_label(&self) -> &'static str {
        if self.descending {
            "desc"
        } else {
            "asc"
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilterEntry {
    pub column_id: String,
    pub value: String,
}

/// Per-column filter values, unique by column and kept in insertion order.
///
/// Writing a column that is already present replaces its value in place, so
/// the serialized `search` parameter keeps a stable order while the user
/// edits an existing filter. An empty value removes the column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterSet {
    entries: Vec<FilterEntry>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (column_id, value) in entries {
            set.set(column_id, value);
        }
        set
    }

    pub fn set(&mut self, column_id: impl Into<String>, value: impl Into<String>) {
        let column_id = column_id.into();
        let value = value.into();
        if value.is_empty() {
            self.remove(&column_id);
            return;
        }
        match self.entries.iter_mut().find(|e| e.column_id == column_id) {
            Some(entry) => entry.value = value,
            None => self.entries.push(FilterEntry { column_id, value }),
        }
    }

    pub fn remove(&mut self, column_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.column_id != column_id);
        self.entries.len() != before
    }

    pub fn get(&self, column_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.column_id == column_id)
            .map(|e| e.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterEntry> {
        self.entries.iter()
    }
}

/// Zero-based page index plus a page size that is never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    page_index: usize,
    page_size: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationState {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        let page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        Self {
            page_index,
            page_size,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// One-based page number as shown in the URL and the page footer.
    pub fn page_number(&self) -> usize {
        self.page_index.saturating_add(1)
    }

    pub fn first_page(&self) -> Self {
        Self::new(0, self.page_size)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TableStateSnapshot {
    pub sort: Option<SortSpec>,
    pub filters: FilterSet,
    pub pagination: PaginationState,
}

/// Holds the current snapshot and publishes every applied setter call.
///
/// Observers hold a `watch::Receiver`, so one that falls behind only ever
/// sees the newest snapshot. The store itself never drops a write.
#[derive(Debug)]
pub struct TableStore {
    tx: watch::Sender<TableStateSnapshot>,
    revision: AtomicU64,
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new(TableStateSnapshot::default())
    }
}

impl TableStore {
    pub fn new(initial: TableStateSnapshot) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx,
            revision: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> TableStateSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TableStateSnapshot> {
        self.tx.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn set_sort(&self, sort: Option<SortSpec>) {
        tracing::debug!(?sort, "set sort");
        self.apply(|s| s.sort = sort);
    }

    pub fn set_filters(&self, filters: FilterSet) {
        tracing::debug!(filters = filters.len(), "set filters");
        self.apply(|s| s.filters = filters);
    }

    pub fn set_pagination(&self, pagination: PaginationState) {
        tracing::debug!(
            page_index = pagination.page_index(),
            page_size = pagination.page_size(),
            "set pagination"
        );
        self.apply(|s| s.pagination = pagination);
    }

    /// Edits the filter slice in place. Counts as one `set_filters` call.
    pub fn update_filters<F>(&self, edit: F)
    where
        F: FnOnce(&mut FilterSet),
    {
        self.apply(|s| edit(&mut s.filters));
    }

    fn apply<F>(&self, edit: F)
    where
        F: FnOnce(&mut TableStateSnapshot),
    {
        self.tx.send_modify(edit);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}
