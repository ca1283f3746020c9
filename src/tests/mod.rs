use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::fetcher::{DataFetcher, FetchError, FetcherConfig, LoadOutcome, TableLoader};
use crate::navigation::{Location, MemoryHistory, Navigator};
use crate::query::{deserialize, serialize, QueryMap};
use crate::session::{SessionOptions, TableSession};
use crate::state::{FilterSet, PaginationState, SortSpec, TableStateSnapshot};

fn users_body(total: u64, names: &[&str]) -> String {
    let data: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, n)| {
            format!(
                r#"{{"name":"{n}","email":"{}@example.com","age":{}}}"#,
                n.to_lowercase(),
                20 + i
            )
        })
        .collect();
    format!(
        r#"{{"data":[{}],"totalCount":{total},"count":{}}}"#,
        data.join(","),
        names.len()
    )
}

async fn read_request_target(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string()
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) {
    let resp = format!(
        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(resp.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Answers every request with `status`/`body` and records request targets.
async fn serve(
    status: u16,
    body: String,
) -> (String, Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let task = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let target = read_request_target(&mut stream).await;
            log.lock().unwrap().push(target);
            respond(&mut stream, status, &body).await;
        }
    });
    (base, seen, task)
}

fn fetcher(base_url: &str) -> DataFetcher {
    DataFetcher::new(&FetcherConfig {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn pairs(q: &QueryMap) -> Vec<(&str, &str)> {
    q.iter().collect()
}

#[test]
fn serialize_then_deserialize_restores_snapshot() {
    let snapshots = [
        TableStateSnapshot {
            sort: Some(SortSpec::descending("age")),
            filters: FilterSet::from_entries([("name", "Jo"), ("email", "a:b")]),
            pagination: PaginationState::new(3, 20),
        },
        TableStateSnapshot {
            sort: None,
            filters: FilterSet::from_entries([("email", "gmail")]),
            pagination: PaginationState::new(0, 5),
        },
        TableStateSnapshot {
            sort: Some(SortSpec::ascending("name")),
            filters: FilterSet::new(),
            pagination: PaginationState::new(9, 100),
        },
        TableStateSnapshot::default(),
    ];
    for s in snapshots.iter() {
        let q = serialize(s, &QueryMap::new());
        assert_eq!(&deserialize(&q), s);
        assert_eq!(&deserialize(&QueryMap::parse(&q.encode())), s);
    }
}

#[test]
fn unrelated_keys_survive_every_shape_of_state() {
    let existing = QueryMap::parse("foo=bar&search=old:x&sort=old:asc&page=9&limit=9&z=1");
    let shapes = [
        TableStateSnapshot::default(),
        TableStateSnapshot {
            sort: Some(SortSpec::ascending("age")),
            ..Default::default()
        },
        TableStateSnapshot {
            filters: FilterSet::from_entries([("name", "A")]),
            ..Default::default()
        },
        TableStateSnapshot {
            sort: Some(SortSpec::descending("age")),
            filters: FilterSet::from_entries([("name", "A")]),
            pagination: PaginationState::new(1, 10),
        },
    ];
    for s in shapes.iter() {
        let out = serialize(s, &existing);
        assert_eq!(out.get("foo"), Some("bar"));
        assert_eq!(out.get("z"), Some("1"));
        assert_eq!(&pairs(&out)[..2], &[("foo", "bar"), ("z", "1")]);
    }
}

#[test]
fn filter_without_sort_drops_previous_sort_key() {
    let snapshot = TableStateSnapshot {
        sort: None,
        filters: FilterSet::from_entries([("name", "Jo")]),
        pagination: PaginationState::new(0, 5),
    };
    let out = serialize(&snapshot, &QueryMap::parse("sort=email:asc"));
    assert_eq!(
        pairs(&out),
        vec![("search", "name:Jo"), ("page", "1"), ("limit", "5")]
    );
}

#[test]
fn sort_without_filter_has_no_search_key() {
    let snapshot = TableStateSnapshot {
        sort: Some(SortSpec::descending("age")),
        filters: FilterSet::new(),
        pagination: PaginationState::new(2, 20),
    };
    let out = serialize(&snapshot, &QueryMap::new());
    assert_eq!(
        pairs(&out),
        vec![("sort", "age:desc"), ("page", "3"), ("limit", "20")]
    );
    assert_eq!(out.encode(), "sort=age%3Adesc&page=3&limit=20");
}

#[test]
fn shared_url_restores_filters_in_order() {
    let q = QueryMap::parse("?search=email:test,name:A&sort=age:asc&page=2&limit=10");
    let s = deserialize(&q);
    let filters: Vec<_> = s
        .filters
        .iter()
        .map(|e| (e.column_id.as_str(), e.value.as_str()))
        .collect();
    assert_eq!(filters, vec![("email", "test"), ("name", "A")]);
    assert_eq!(s.sort, Some(SortSpec::ascending("age")));
    assert_eq!(s.pagination, PaginationState::new(1, 10));
}

#[tokio::test]
async fn fetch_requests_users_with_query_and_decodes_rows() {
    let (base, seen, server) = serve(200, users_body(12, &["Ann", "Bob"])).await;
    let result = fetcher(&base)
        .fetch("search=name%3AA&page=2&limit=5")
        .await
        .unwrap();
    server.abort();

    assert_eq!(seen.lock().unwrap()[0], "/users?search=name%3AA&page=2&limit=5");
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[1].email, "bob@example.com");
    assert_eq!(result.total_count, 12);
    assert_eq!(result.page_size, 5);
    assert_eq!(result.page_count(), 3);
}

#[tokio::test]
async fn fetch_surfaces_server_errors() {
    let (base, _, server) = serve(500, "{}".to_string()).await;
    let err = fetcher(&base).fetch("page=1&limit=5").await.unwrap_err();
    server.abort();
    assert!(matches!(err, FetchError::Status { status: 500, .. }));
}

#[tokio::test]
async fn fetch_surfaces_bad_bodies() {
    let (base, _, server) = serve(200, "not json".to_string()).await;
    let err = fetcher(&base).fetch("").await.unwrap_err();
    server.abort();
    assert!(matches!(err, FetchError::Decode { .. }));
}

#[tokio::test]
async fn fetch_surfaces_transport_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let err = fetcher(&base).fetch("page=1").await.unwrap_err();
    assert!(matches!(err, FetchError::Transport { .. }));
}

#[tokio::test]
async fn superseded_load_is_discarded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    // hold both requests, answer the newer one first
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        for _ in 0..2 {
            let (mut stream, _) = listener.accept().await.unwrap();
            let target = read_request_target(&mut stream).await;
            held.push((target, stream));
        }
        held.sort_by_key(|(target, _)| !target.contains("page=2"));
        for (target, mut stream) in held {
            let total = if target.contains("page=2") { 20 } else { 10 };
            respond(&mut stream, 200, &users_body(total, &["Ann"])).await;
        }
    });

    let loader = TableLoader::new(fetcher(&base));
    let (older, newer) = tokio::join!(loader.load("page=1&limit=5"), async {
        tokio::task::yield_now().await;
        loader.load("page=2&limit=5").await
    });
    server.await.unwrap();

    assert_eq!(older.unwrap(), LoadOutcome::Stale);
    match newer.unwrap() {
        LoadOutcome::Fresh(result) => assert_eq!(result.total_count, 20),
        LoadOutcome::Stale => panic!("latest load must not be stale"),
    }
}

fn mount(
    href: &str,
    base_url: &str,
    options: SessionOptions,
) -> (Arc<MemoryHistory>, TableSession) {
    let history = Arc::new(MemoryHistory::new(Location::parse(href)));
    let loader = Arc::new(TableLoader::new(fetcher(base_url)));
    let session = TableSession::mount(history.clone(), loader, options);
    (history, session)
}

#[tokio::test(start_paused = true)]
async fn typed_filter_reaches_url_after_quiet_period() {
    let (history, session) = mount(
        "/?foo=bar&page=3&limit=10",
        "http://127.0.0.1:9",
        SessionOptions::default(),
    );

    session.type_filter("name", "J");
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.type_filter("name", "Jo");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!history.location().query.contains_key("search"));
    assert_eq!(session.filter_text("name").as_deref(), Some("Jo"));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let q = history.location().query;
    assert_eq!(
        pairs(&q),
        vec![
            ("foo", "bar"),
            ("search", "name:Jo"),
            ("page", "3"),
            ("limit", "10")
        ]
    );
    assert_eq!(history.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn filter_change_can_reset_to_first_page() {
    let (history, session) = mount(
        "/?page=4&limit=5",
        "http://127.0.0.1:9",
        SessionOptions {
            reset_page_on_filter: true,
            ..SessionOptions::default()
        },
    );

    session.type_filter("email", "gmail");
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let q = history.location().query;
    assert_eq!(q.get("search"), Some("email:gmail"));
    assert_eq!(q.get("page"), Some("1"));
}

#[tokio::test(start_paused = true)]
async fn clearing_a_filter_removes_search() {
    let (history, session) = mount(
        "/?search=name:Jo&page=1&limit=5",
        "http://127.0.0.1:9",
        SessionOptions::default(),
    );
    assert_eq!(session.filter_text("name").as_deref(), Some("Jo"));

    session.type_filter("name", "");
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(!history.location().query.contains_key("search"));
    assert!(session.snapshot().filters.is_empty());
}

#[tokio::test]
async fn header_clicks_cycle_sort() {
    let (_, session) = mount("/", "http://127.0.0.1:9", SessionOptions::default());
    assert_eq!(session.toggle_sort("age"), Some(SortSpec::ascending("age")));
    assert_eq!(session.toggle_sort("age"), Some(SortSpec::descending("age")));
    assert_eq!(session.toggle_sort("age"), None);
    assert_eq!(session.toggle_sort("age"), Some(SortSpec::ascending("age")));
    assert_eq!(session.toggle_sort("name"), Some(SortSpec::ascending("name")));
    assert_eq!(session.toggle_sort("phone"), Some(SortSpec::ascending("name")));

    session.sync_url();
    assert_eq!(session.location().query.get("sort"), Some("name:asc"));
}

#[tokio::test]
async fn paging_is_bounded_by_loaded_page_count() {
    let body = users_body(12, &["Ann", "Bob", "Cy", "Di", "Ed"]);
    let (base, seen, server) = serve(200, body).await;
    let (history, session) = mount("/?limit=5", &base, SessionOptions::default());

    assert!(!session.next_page());
    session.sync_url();
    let view = session.load().await.unwrap().unwrap();
    assert_eq!(view.page_count, 3);
    assert!(!session.can_previous_page());

    assert!(session.next_page());
    assert!(session.next_page());
    assert!(!session.next_page());
    session.sync_url();
    assert_eq!(history.location().query.get("page"), Some("3"));

    session.load().await.unwrap();
    assert!(session.previous_page());
    session.sync_url();
    assert_eq!(history.location().query.get("page"), Some("2"));
    server.abort();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], "/users?page=1&limit=5");
    assert_eq!(seen[1], "/users?page=3&limit=5");
}

#[tokio::test]
async fn page_size_change_keeps_top_row() {
    let (_, session) = mount(
        "/?page=5&limit=10",
        "http://127.0.0.1:9",
        SessionOptions::default(),
    );
    session.set_page_size(20);
    assert_eq!(session.snapshot().pagination, PaginationState::new(2, 20));
}

#[tokio::test]
async fn bookmarked_far_page_survives_page_size_change() {
    let (history, session) = mount(
        "/?page=4000000000000000000&limit=10",
        "http://127.0.0.1:9",
        SessionOptions::default(),
    );
    session.set_page_size(20);
    session.sync_url();

    let pagination = session.snapshot().pagination;
    assert_eq!(pagination.page_size(), 20);
    assert!(pagination.page_index() > 0);
    assert_eq!(history.location().query.get("limit"), Some("20"));
}

#[tokio::test]
async fn load_overtaken_by_navigation_keeps_previous_view() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let release = Arc::new(Notify::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (gate, log) = (release.clone(), seen.clone());
    // ascending requests wait for `release`, everything else answers at once
    let server = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let (gate, log) = (gate.clone(), log.clone());
            tokio::spawn(async move {
                let target = read_request_target(&mut stream).await;
                log.lock().unwrap().push(target.clone());
                if target.contains("email%3Aasc") {
                    gate.notified().await;
                    respond(&mut stream, 200, &users_body(10, &["Old"])).await;
                } else {
                    respond(&mut stream, 200, &users_body(20, &["New"])).await;
                }
            });
        }
    });

    let (history, session) = mount("/", &base, SessionOptions::default());
    let session = Arc::new(session);
    session.toggle_sort("email");
    session.sync_url();
    let in_flight = tokio::spawn({
        let session = session.clone();
        async move { session.load().await }
    });

    let requested = tokio::time::timeout(Duration::from_secs(5), async {
        while seen.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(requested.is_ok());

    session.toggle_sort("email");
    session.sync_url();
    assert_eq!(history.location().query.get("sort"), Some("email:desc"));
    release.notify_one();

    assert_eq!(in_flight.await.unwrap().unwrap(), None);
    assert_eq!(session.view().total_count, 0);
    assert!(session.view().rows.is_empty());

    let view = session.load().await.unwrap().unwrap();
    assert_eq!(view.total_count, 20);
    assert_eq!(view.rows[0].name, "New");
    assert!(view.query.contains("sort=email%3Adesc"));
    server.abort();
}

#[tokio::test]
async fn navigation_triggers_reload() {
    let (base, seen, server) = serve(200, users_body(7, &["Ann"])).await;
    let (_, session) = mount("/", &base, SessionOptions::default());
    let session = Arc::new(session);
    let autoload = session.spawn_autoload();

    session.toggle_sort("email");

    let loaded = tokio::time::timeout(Duration::from_secs(5), async {
        while session.view().total_count == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(loaded.is_ok());
    assert!(session.view().query.contains("sort=email%3Aasc"));
    assert!(seen
        .lock()
        .unwrap()
        .iter()
        .any(|t| t.contains("sort=email%3Aasc")));

    autoload.abort();
    server.abort();
}
