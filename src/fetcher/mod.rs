use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pagination;
use crate::query::{self, QueryMap};

pub const USERS_PATH: &str = "users";
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

#[derive(Clone, Debug)]
pub struct FetcherConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid base URL: {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("request failed: {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Row {
    pub name: String,
    pub email: String,
    pub age: u32,
}

impl Row {
    pub fn cell(&self, column_id: &str) -> Option<String> {
        match column_id {
            "name" => Some(self.name.clone()),
            "email" => Some(self.email.clone()),
            "age" => Some(self.age.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    data: Vec<Row>,
    #[serde(rename = "totalCount")]
    total_count: u64,
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub total_count: u64,
    /// Page size the request was made with (the `limit` parameter).
    pub page_size: usize,
}

impl QueryResult {
    pub fn page_count(&self) -> usize {
        pagination::page_count(self.total_count, self.page_size)
    }
}

/// One `GET {base_url}/users?{query}` per call. No retries.
#[derive(Clone, Debug)]
pub struct DataFetcher {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl DataFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let endpoint = users_endpoint(&config.base_url)?;
        let client = build_client(config.timeout)?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    pub fn request_url(&self, query_string: &str) -> reqwest::Url {
        let mut url = self.endpoint.clone();
        let query_string = query_string.trim().trim_start_matches('?');
        url.set_query(if query_string.is_empty() {
            None
        } else {
            Some(query_string)
        });
        url
    }

    pub async fn fetch(&self, query_string: &str) -> Result<QueryResult, FetchError> {
        let url = self.request_url(query_string);
        let url_str = url.to_string();
        tracing::debug!(url = %url_str, "fetching rows");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url_str.clone(),
                source: e,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| FetchError::Transport {
            url: url_str.clone(),
            source: e,
        })?;
        let parsed: UsersResponse =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
                url: url_str.clone(),
                source: e,
            })?;

        let page_size = query::deserialize(&QueryMap::parse(query_string))
            .pagination
            .page_size();
        if let Some(count) = parsed.count {
            if count != parsed.data.len() {
                tracing::warn!(count, rows = parsed.data.len(), "row count mismatch in response");
            }
        }
        tracing::info!(
            url = %url_str,
            rows = parsed.data.len(),
            total = parsed.total_count,
            "rows loaded"
        );

        Ok(QueryResult {
            rows: parsed.data,
            total_count: parsed.total_count,
            page_size,
        })
    }
}

fn users_endpoint(base_url: &str) -> Result<reqwest::Url, FetchError> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    reqwest::Url::parse(&base)
        .and_then(|b| b.join(USERS_PATH))
        .map_err(|e| FetchError::InvalidBaseUrl {
            url: base_url.to_string(),
            source: e,
        })
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::HttpClientBuild { source: e })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket(u64);

/// Stale-response guard: only the most recently issued ticket is current.
#[derive(Debug, Default)]
pub struct LatestOnly {
    issued: AtomicU64,
}

impl LatestOnly {
    pub fn begin(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Fresh(QueryResult),
    Stale,
}

#[derive(Debug)]
pub struct TableLoader {
    fetcher: DataFetcher,
    guard: LatestOnly,
}

impl TableLoader {
    pub fn new(fetcher: DataFetcher) -> Self {
        Self {
            fetcher,
            guard: LatestOnly::default(),
        }
    }

    pub fn fetcher(&self) -> &DataFetcher {
        &self.fetcher
    }

    /// Fetches `query_string`; the result is dropped as `Stale` if another
    /// load started while this one was in flight. Errors from superseded
    /// loads are dropped the same way.
    pub async fn load(&self, query_string: &str) -> Result<LoadOutcome, FetchError> {
        let ticket = self.guard.begin();
        let result = self.fetcher.fetch(query_string).await;
        if !self.guard.is_current(ticket) {
            tracing::warn!(query = query_string, "discarding stale response");
            return Ok(LoadOutcome::Stale);
        }
        result.map(LoadOutcome::Fresh)
    }
}
