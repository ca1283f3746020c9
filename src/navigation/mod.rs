use std::fmt;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::query::QueryMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: QueryMap,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            query: QueryMap::new(),
        }
    }
}

impl Location {
    pub fn new(path: impl Into<String>, query: QueryMap) -> Self {
        Self {
            path: path.into(),
            query,
        }
    }

    /// Accepts `/path?query`, `?query`, or a bare query string.
    pub fn parse(href: &str) -> Self {
        let href = href.trim();
        let (path, query) = match href.split_once('?') {
            Some((path, query)) => (path, query),
            None if href.starts_with('/') => (href, ""),
            None => ("", href),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self::new(path, QueryMap::parse(query))
    }

    pub fn search(&self) -> String {
        self.query.encode()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}?{}", self.path, self.query.encode())
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigateMode {
    Push,
    Replace,
}

/// The routing shell as seen by the table engine.
pub trait Navigator: Send + Sync {
    fn location(&self) -> Location;

    /// Returns `false` when the navigation was a no-op (same query).
    fn navigate(&self, query: QueryMap, mode: NavigateMode) -> bool;

    fn subscribe(&self) -> watch::Receiver<Location>;

    fn replace(&self, query: QueryMap) -> bool {
        self.navigate(query, NavigateMode::Replace)
    }
}

#[derive(Debug)]
struct HistoryInner {
    entries: Vec<Location>,
    cursor: usize,
}

/// Browser-like history kept in memory.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<HistoryInner>,
    changes: watch::Sender<Location>,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(Location::default())
    }
}

impl MemoryHistory {
    pub fn new(initial: Location) -> Self {
        let (changes, _) = watch::channel(initial.clone());
        Self {
            inner: Mutex::new(HistoryInner {
                entries: vec![initial],
                cursor: 0,
            }),
            changes,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|h| h.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn back(&self) -> bool {
        self.step(|cursor, _| cursor.checked_sub(1))
    }

    pub fn forward(&self) -> bool {
        self.step(|cursor, len| (cursor + 1 < len).then_some(cursor + 1))
    }

    fn step<F>(&self, next: F) -> bool
    where
        F: FnOnce(usize, usize) -> Option<usize>,
    {
        let location = {
            let Ok(mut inner) = self.inner.lock() else {
                return false;
            };
            let Some(cursor) = next(inner.cursor, inner.entries.len()) else {
                return false;
            };
            inner.cursor = cursor;
            inner.entries[cursor].clone()
        };
        tracing::info!(%location, "history step");
        self.changes.send_replace(location);
        true
    }
}

impl Navigator for MemoryHistory {
    fn location(&self) -> Location {
        self.changes.borrow().clone()
    }

    fn navigate(&self, query: QueryMap, mode: NavigateMode) -> bool {
        let location = {
            let Ok(mut inner) = self.inner.lock() else {
                return false;
            };
            let cursor = inner.cursor;
            let current = &inner.entries[cursor];
            if current.query == query {
                return false;
            }
            let location = Location::new(current.path.clone(), query);
            match mode {
                NavigateMode::Push => {
                    inner.entries.truncate(cursor + 1);
                    inner.entries.push(location.clone());
                    inner.cursor = cursor + 1;
                }
                NavigateMode::Replace => inner.entries[cursor] = location.clone(),
            }
            location
        };
        tracing::info!(%location, ?mode, "navigate");
        self.changes.send_replace(location);
        true
    }

    fn subscribe(&self) -> watch::Receiver<Location> {
        self.changes.subscribe()
    }
}
