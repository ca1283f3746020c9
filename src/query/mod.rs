use std::fmt;

use serde::Serialize;

use crate::state::{FilterSet, PaginationState, SortSpec, TableStateSnapshot, DEFAULT_PAGE_SIZE};

pub const SEARCH_KEY: &str = "search";
pub const SORT_KEY: &str = "sort";
pub const PAGE_KEY: &str = "page";
pub const LIMIT_KEY: &str = "limit";

const OWNED_KEYS: [&str; 4] = [SEARCH_KEY, SORT_KEY, PAGE_KEY, LIMIT_KEY];

/// Ordered query-string map with unique keys.
///
/// Duplicate keys collapse to the last value at the first key's position,
/// the same way `Object.fromEntries(new URLSearchParams(..))` reads a query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryMap {
    pairs: Vec<(String, String)>,
}

impl QueryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `a=1&b=2` (with or without a leading `?`) as form-urlencoded.
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        let mut map = Self::new();
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            map.set(k.into_owned(), v.into_owned());
        }
        map
    }

    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(idx).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for QueryMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

impl fmt::Display for QueryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

pub fn format_sort(sort: &SortSpec) -> String {
    format!("{}:{}", sort.column_id, sort.direction_label())
}

pub fn format_search(filters: &FilterSet) -> String {
    filters
        .iter()
        .map(|e| format!("{}:{}", e.column_id, e.value))
        .collect::<Vec<_>>()
        .join(",")
}

/// Merges `snapshot` over `existing`.
///
/// Keys other than `search`, `sort`, `page` and `limit` are carried over in
/// their existing order; the owned keys follow in that fixed order. `page`
/// and `limit` are always written.
pub fn serialize(snapshot: &TableStateSnapshot, existing: &QueryMap) -> QueryMap {
    let mut out: QueryMap = existing
        .iter()
        .filter(|(k, _)| !OWNED_KEYS.contains(k))
        .collect();

    if !snapshot.filters.is_empty() {
        out.set(SEARCH_KEY, format_search(&snapshot.filters));
    }
    if let Some(sort) = snapshot.sort.as_ref() {
        out.set(SORT_KEY, format_sort(sort));
    }
    out.set(PAGE_KEY, snapshot.pagination.page_number().to_string());
    out.set(LIMIT_KEY, snapshot.pagination.page_size().to_string());
    out
}

/// Reads a snapshot back out of a query map. Never fails: any malformed
/// component falls back to its default.
pub fn deserialize(query: &QueryMap) -> TableStateSnapshot {
    let sort = query.get(SORT_KEY).and_then(|raw| {
        let parsed = parse_sort(raw);
        if parsed.is_none() {
            tracing::warn!(value = raw, "ignoring malformed sort parameter");
        }
        parsed
    });

    let filters = query.get(SEARCH_KEY).map(parse_search).unwrap_or_default();

    let page = query
        .get(PAGE_KEY)
        .and_then(parse_positive)
        .unwrap_or(1);
    let limit = query
        .get(LIMIT_KEY)
        .and_then(parse_positive)
        .unwrap_or(DEFAULT_PAGE_SIZE);

    TableStateSnapshot {
        sort,
        filters,
        pagination: PaginationState::new(page - 1, limit),
    }
}

pub fn parse_sort(raw: &str) -> Option<SortSpec> {
    let (column_id, direction) = raw.trim().rsplit_once(':')?;
    if column_id.is_empty() {
        return None;
    }
    match direction {
        "asc" => Some(SortSpec::ascending(column_id)),
        "desc" => Some(SortSpec::descending(column_id)),
        _ => None,
    }
}

pub fn parse_search(raw: &str) -> FilterSet {
    let mut filters = FilterSet::new();
    for item in raw.split(',') {
        match item.split_once(':') {
            Some((column_id, value)) if !column_id.is_empty() => filters.set(column_id, value),
            _ => {
                if !item.is_empty() {
                    tracing::warn!(entry = item, "ignoring malformed search entry");
                }
            }
        }
    }
    filters
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}
