use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use shared::{
    domain::{OwnerId, Visibility},
    error::SearchErrorKind,
};
use tokio::{net::TcpListener, sync::Notify};

use super::*;

fn allow_local_connections() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
}

fn photo(id: &str) -> Photo {
    Photo {
        id: PhotoId::from(id),
        owner: OwnerId::from("200901462@N06"),
        secret: "0fd5305b1b".into(),
        server: "65535".into(),
        farm: 66,
        title: format!("snap {id}"),
        visibility: Visibility {
            is_public: true,
            is_friend: false,
            is_family: false,
        },
    }
}

fn named_batch(page: u32, total: u64, ids: &[&str]) -> PhotoBatch {
    PhotoBatch {
        page,
        total_available: total,
        photos: ids.iter().map(|id| photo(id)).collect(),
    }
}

fn numbered_batch(page: u32, total: u64, start: u32, count: u32) -> PhotoBatch {
    PhotoBatch {
        page,
        total_available: total,
        photos: (start..start + count)
            .map(|n| photo(&format!("id-{n}")))
            .collect(),
    }
}

enum Reply {
    Ready(Result<PhotoBatch, SearchError>),
    Gated(Arc<Notify>, Result<PhotoBatch, SearchError>),
}

#[derive(Default)]
struct FakeProvider {
    replies: StdMutex<VecDeque<Reply>>,
    calls: StdMutex<Vec<(String, u32)>>,
    started: Notify,
}

impl FakeProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push_ok(&self, batch: PhotoBatch) {
        self.replies.lock().unwrap().push_back(Reply::Ready(Ok(batch)));
    }

    fn push_err(&self, err: SearchError) {
        self.replies.lock().unwrap().push_back(Reply::Ready(Err(err)));
    }

    fn push_gated(&self, gate: Arc<Notify>, batch: PhotoBatch) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Gated(gate, Ok(batch)));
    }

    fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoProvider for FakeProvider {
    async fn search(&self, query: &str, page: u32) -> Result<PhotoBatch, SearchError> {
        self.calls.lock().unwrap().push((query.to_string(), page));
        self.started.notify_one();
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted search call");
        match reply {
            Reply::Ready(outcome) => outcome,
            Reply::Gated(gate, outcome) => {
                gate.notified().await;
                outcome
            }
        }
    }

    async fn fetch_image(&self, _url: &str) -> Result<Vec<u8>, SearchError> {
        Ok(Vec::new())
    }

    fn image_host(&self) -> &str {
        "http://images.invalid"
    }
}

fn result_ids(snapshot: &SearchSnapshot) -> Vec<&str> {
    snapshot.results.iter().map(|photo| photo.id.as_str()).collect()
}

#[tokio::test]
async fn first_submission_populates_results() {
    let fake = FakeProvider::new();
    fake.push_ok(numbered_batch(1, 72, 0, 30));
    let controller = SearchController::new(fake.clone());

    let snapshot = controller.submit_search("fox").await;

    assert_eq!(snapshot.query, "fox");
    assert_eq!(snapshot.results.len(), 30);
    assert_eq!(snapshot.page, 1);
    assert_eq!(snapshot.total_available, 72);
    assert!(snapshot.has_more);
    assert!(snapshot.has_searched_once);
    assert!(!snapshot.is_loading);
    assert_eq!(snapshot.error_message, None);
    assert_eq!(fake.calls(), vec![("fox".to_string(), 1)]);
}

#[tokio::test]
async fn submitted_queries_are_trimmed() {
    let fake = FakeProvider::new();
    fake.push_ok(named_batch(1, 1, &["a"]));
    let controller = SearchController::new(fake.clone());

    let snapshot = controller.submit_search("  fox  ").await;

    assert_eq!(snapshot.query, "fox");
    assert_eq!(fake.calls(), vec![("fox".to_string(), 1)]);
}

#[tokio::test]
async fn blank_submissions_change_nothing() {
    let fake = FakeProvider::new();
    let controller = SearchController::new(fake.clone());
    let mut events = controller.subscribe();

    let snapshot = controller.submit_search("   ").await;

    assert_eq!(snapshot, SearchSnapshot::default());
    assert!(fake.calls().is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn loading_is_refused_before_the_first_submission() {
    let fake = FakeProvider::new();
    let controller = SearchController::new(fake.clone());

    let snapshot = controller.load_next_page().await;

    assert_eq!(snapshot, SearchSnapshot::default());
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn paging_exhausts_the_result_set() {
    let fake = FakeProvider::new();
    fake.push_ok(numbered_batch(1, 72, 0, 30));
    fake.push_ok(numbered_batch(2, 72, 30, 30));
    fake.push_ok(numbered_batch(3, 72, 60, 12));
    let controller = SearchController::new(fake.clone());

    let after_one = controller.submit_search("fox").await;
    assert_eq!(after_one.results.len(), 30);
    assert!(after_one.has_more);

    let after_two = controller.load_next_page().await;
    assert_eq!(after_two.results.len(), 60);
    assert_eq!(after_two.page, 2);
    assert!(after_two.has_more);

    let after_three = controller.load_next_page().await;
    assert_eq!(after_three.results.len(), 72);
    assert_eq!(after_three.page, 3);
    assert!(!after_three.has_more);

    // Exhausted: further load requests never reach the provider.
    let after_extra = controller.load_next_page().await;
    assert_eq!(after_extra, after_three);
    assert_eq!(fake.calls().len(), 3);
}

#[tokio::test]
async fn short_final_page_stops_further_loads() {
    let fake = FakeProvider::new();
    fake.push_ok(numbered_batch(1, 45, 0, 30));
    fake.push_ok(numbered_batch(2, 45, 30, 15));
    let controller = SearchController::new(fake.clone());

    controller.submit_search("harbor").await;
    let snapshot = controller.load_next_page().await;

    assert_eq!(snapshot.results.len(), 45);
    assert!(!snapshot.has_more);
}

#[tokio::test]
async fn duplicate_ids_are_dropped_on_append() {
    let fake = FakeProvider::new();
    fake.push_ok(named_batch(1, 4, &["a", "b"]));
    fake.push_ok(named_batch(2, 4, &["b", "c"]));
    let controller = SearchController::new(fake.clone());

    controller.submit_search("gulls").await;
    let snapshot = controller.load_next_page().await;

    assert_eq!(result_ids(&snapshot), vec!["a", "b", "c"]);
    assert!(snapshot.has_more);
}

#[tokio::test]
async fn failed_appends_keep_earlier_results() {
    let fake = FakeProvider::new();
    fake.push_ok(numbered_batch(1, 60, 0, 30));
    fake.push_err(SearchError::Transport("connection refused".into()));
    let controller = SearchController::new(fake.clone());

    controller.submit_search("glacier").await;
    let snapshot = controller.load_next_page().await;

    assert_eq!(snapshot.results.len(), 30);
    assert!(!snapshot.has_more);
    assert!(!snapshot.is_loading);
    let message = snapshot.error_message.as_deref().unwrap_or_default();
    assert!(message.contains("failed to fetch photos"), "got {message:?}");
}

#[tokio::test]
async fn fetch_failures_block_further_loading() {
    let fake = FakeProvider::new();
    fake.push_err(SearchError::MissingCredential);
    let controller = SearchController::new(fake.clone());

    let snapshot = controller.submit_search("fox").await;

    assert!(snapshot.results.is_empty());
    assert!(!snapshot.has_more);
    assert!(!snapshot.is_loading);
    assert!(snapshot.has_searched_once);
    let message = snapshot.error_message.as_deref().unwrap_or_default();
    assert!(message.contains("FLICKR_API_KEY"), "got {message:?}");

    controller.load_next_page().await;
    assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn loads_are_ignored_while_one_is_in_flight() {
    let fake = FakeProvider::new();
    let gate = Arc::new(Notify::new());
    fake.push_ok(numbered_batch(1, 90, 0, 30));
    fake.push_gated(gate.clone(), numbered_batch(2, 90, 30, 30));
    let controller = SearchController::new(fake.clone());

    controller.submit_search("ridge").await;

    let inflight = tokio::spawn({
        let controller = controller.clone();
        async move { controller.load_next_page().await }
    });

    // First permit is from the page-1 call, second waits for page 2.
    fake.started.notified().await;
    fake.started.notified().await;

    let blocked = controller.load_next_page().await;
    assert!(blocked.is_loading);
    assert_eq!(fake.calls().len(), 2);

    gate.notify_one();
    let snapshot = inflight.await.expect("load task");
    assert_eq!(snapshot.results.len(), 60);
    assert_eq!(snapshot.page, 2);
    assert!(snapshot.has_more);
}

#[tokio::test]
async fn new_submissions_supersede_inflight_fetches() {
    let fake = FakeProvider::new();
    let gate = Arc::new(Notify::new());
    fake.push_gated(gate.clone(), numbered_batch(1, 100, 0, 30));
    fake.push_ok(named_batch(1, 1, &["dog-1"]));
    let controller = SearchController::new(fake.clone());

    let stale = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit_search("cats").await }
    });
    fake.started.notified().await;

    let snapshot = controller.submit_search("dogs").await;
    assert_eq!(snapshot.query, "dogs");
    assert_eq!(result_ids(&snapshot), vec!["dog-1"]);
    assert!(!snapshot.has_more);

    gate.notify_one();
    stale.await.expect("stale task");

    let settled = controller.snapshot().await;
    assert_eq!(settled.query, "dogs");
    assert_eq!(result_ids(&settled), vec!["dog-1"]);
    assert!(!settled.is_loading);
    assert_eq!(settled.page, 1);
}

#[tokio::test]
async fn state_changes_are_broadcast_in_order() {
    let fake = FakeProvider::new();
    fake.push_ok(named_batch(1, 2, &["a", "b"]));
    let controller = SearchController::new(fake.clone());
    let mut events = controller.subscribe();

    controller.submit_search("owls").await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        let SearchEvent::StateChanged(snapshot) = event;
        seen.push(snapshot);
    }

    assert!(seen.len() >= 3, "expected reset, loading, merged; got {}", seen.len());
    let reset = &seen[0];
    assert!(reset.results.is_empty());
    assert!(reset.has_searched_once);
    assert!(seen.iter().any(|snapshot| snapshot.is_loading));
    let last = seen.last().expect("at least one event");
    assert!(!last.is_loading);
    assert_eq!(last.results.len(), 2);
    assert!(!last.has_more);
}

#[derive(Clone)]
struct SearchServerState {
    reply: Value,
    hits: Arc<StdMutex<Vec<HashMap<String, String>>>>,
}

async fn search_endpoint(
    State(state): State<SearchServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.hits.lock().unwrap().push(params);
    Json(state.reply.clone())
}

async fn spawn_search_server(reply: Value) -> (String, SearchServerState) {
    let state = SearchServerState {
        reply,
        hits: Arc::default(),
    };
    let app = Router::new()
        .route("/rest", get(search_endpoint))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/rest"), state)
}

fn local_settings(endpoint: &str) -> ProviderSettings {
    ProviderSettings {
        api_key: Some("test-key-123".into()),
        api_endpoint: endpoint.to_string(),
        image_host: "http://images.invalid".into(),
        per_page: 30,
        request_timeout_secs: 2,
    }
}

fn sample_reply(page: u32, total: &str, ids: &[&str]) -> Value {
    let photo_entries: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "owner": "200901462@N06",
                "secret": "0fd5305b1b",
                "server": "65535",
                "farm": 66,
                "title": format!("snap {id}"),
                "ispublic": 1,
                "isfriend": 0,
                "isfamily": 0,
            })
        })
        .collect();
    json!({
        "photos": {
            "page": page,
            "pages": 3,
            "perpage": 30,
            "total": total,
            "photo": photo_entries,
        },
        "stat": "ok",
    })
}

#[tokio::test]
async fn searches_carry_the_expected_query_parameters() {
    allow_local_connections();
    let (endpoint, server) = spawn_search_server(sample_reply(1, "72", &["r1", "r2"])).await;
    let provider = FlickrProvider::new(local_settings(&endpoint)).expect("provider");

    let batch = provider.search("mountain lake", 1).await.expect("search");

    assert_eq!(batch.page, 1);
    assert_eq!(batch.total_available, 72);
    assert_eq!(batch.photos.len(), 2);
    assert_eq!(batch.photos[0].title, "snap r1");
    assert!(batch.photos[0].visibility.is_public);
    assert_eq!(batch.photos[0].owner.as_str(), "200901462@N06");

    let hits = server.hits.lock().unwrap().clone();
    assert_eq!(hits.len(), 1);
    let params = &hits[0];
    assert_eq!(params.get("method").map(String::as_str), Some("flickr.photos.search"));
    assert_eq!(params.get("api_key").map(String::as_str), Some("test-key-123"));
    assert_eq!(params.get("text").map(String::as_str), Some("mountain lake"));
    assert_eq!(params.get("page").map(String::as_str), Some("1"));
    assert_eq!(params.get("per_page").map(String::as_str), Some("30"));
    assert_eq!(params.get("sort").map(String::as_str), Some("relevance"));
    assert_eq!(params.get("format").map(String::as_str), Some("json"));
    assert_eq!(params.get("nojsoncallback").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn provider_failure_replies_surface_code_and_message() {
    allow_local_connections();
    let reply = json!({
        "stat": "fail",
        "code": 100,
        "message": "Invalid API Key (Key has invalid format)",
    });
    let (endpoint, _server) = spawn_search_server(reply).await;
    let provider = FlickrProvider::new(local_settings(&endpoint)).expect("provider");

    let err = provider.search("fox", 1).await.expect_err("should fail");

    assert_eq!(err.kind(), SearchErrorKind::ProviderError);
    let message = err.to_string();
    assert!(message.contains("Invalid API Key"), "got {message:?}");
    assert!(message.contains("100"), "got {message:?}");
}

#[tokio::test]
async fn unreadable_totals_are_provider_errors() {
    allow_local_connections();
    let (endpoint, _server) = spawn_search_server(sample_reply(1, "many", &["r1"])).await;
    let provider = FlickrProvider::new(local_settings(&endpoint)).expect("provider");

    let err = provider.search("fox", 1).await.expect_err("should fail");

    assert_eq!(err.kind(), SearchErrorKind::ProviderError);
    assert!(err.to_string().contains("total"), "got {err}");
}

#[tokio::test]
async fn http_failures_map_to_transport_errors() {
    allow_local_connections();
    let app = Router::new().route("/rest", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let provider =
        FlickrProvider::new(local_settings(&format!("http://{addr}/rest"))).expect("provider");

    let err = provider.search("fox", 1).await.expect_err("should fail");

    assert_eq!(err.kind(), SearchErrorKind::TransportFailure);
}

#[tokio::test]
async fn slow_replies_time_out_as_transport_errors() {
    allow_local_connections();
    let app = Router::new().route(
        "/rest",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({"stat": "ok"}))
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let mut settings = local_settings(&format!("http://{addr}/rest"));
    settings.request_timeout_secs = 1;
    let provider = FlickrProvider::new(settings).expect("provider");

    let err = provider.search("fox", 1).await.expect_err("should time out");

    assert_eq!(err.kind(), SearchErrorKind::TransportFailure);
    assert!(err.to_string().contains("timed out"), "got {err}");
}

#[tokio::test]
async fn absent_credential_fails_before_any_request() {
    // Port 9 is the discard service; nothing may ever connect to it.
    let mut settings = local_settings("http://127.0.0.1:9/rest");
    settings.api_key = None;
    let provider = FlickrProvider::new(settings).expect("provider");

    let err = provider.search("fox", 1).await.expect_err("should fail");
    assert_eq!(err.kind(), SearchErrorKind::MissingCredential);

    let mut blank = local_settings("http://127.0.0.1:9/rest");
    blank.api_key = Some("   ".into());
    let provider = FlickrProvider::new(blank).expect("provider");
    let err = provider.search("fox", 1).await.expect_err("should fail");
    assert_eq!(err.kind(), SearchErrorKind::MissingCredential);
}

#[tokio::test]
async fn fetch_image_returns_raw_bytes() {
    allow_local_connections();
    let app = Router::new().route(
        "/65535/11aa22bb33_0fd5305b1b_b.jpg",
        get(|| async { axum::body::Bytes::from_static(b"not really a jpeg") }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let provider = FlickrProvider::new(local_settings("http://unused.invalid/rest")).expect("provider");

    let url = format!("http://{addr}/65535/11aa22bb33_0fd5305b1b_b.jpg");
    let bytes = provider.fetch_image(&url).await.expect("image bytes");

    assert_eq!(bytes, b"not really a jpeg");
}

#[derive(Clone)]
struct PagedServerState {
    replies: Arc<StdMutex<HashMap<String, Value>>>,
    hits: Arc<StdMutex<Vec<HashMap<String, String>>>>,
}

async fn paged_endpoint(
    State(state): State<PagedServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.hits.lock().unwrap().push(params.clone());
    let page = params.get("page").cloned().unwrap_or_default();
    let reply = state
        .replies
        .lock()
        .unwrap()
        .get(&page)
        .cloned()
        .expect("unscripted page");
    Json(reply)
}

#[tokio::test]
async fn controller_and_provider_round_trip() {
    allow_local_connections();
    let mut replies = HashMap::new();
    replies.insert("1".to_string(), sample_reply(1, "3", &["r1", "r2"]));
    replies.insert("2".to_string(), sample_reply(2, "3", &["r3"]));
    let state = PagedServerState {
        replies: Arc::new(StdMutex::new(replies)),
        hits: Arc::default(),
    };
    let app = Router::new()
        .route("/rest", get(paged_endpoint))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let mut settings = local_settings(&format!("http://{addr}/rest"));
    settings.per_page = 2;
    let provider = Arc::new(FlickrProvider::new(settings).expect("provider"));
    let controller = SearchController::new(provider);

    let first = controller.submit_search("river").await;
    assert_eq!(first.results.len(), 2);
    assert!(first.has_more);

    let second = controller.load_next_page().await;
    assert_eq!(second.results.len(), 3);
    assert!(!second.has_more);

    let hits = state.hits.lock().unwrap().clone();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].get("text").map(String::as_str), Some("river"));
    assert_eq!(hits[0].get("per_page").map(String::as_str), Some("2"));
    assert_eq!(hits[1].get("page").map(String::as_str), Some("2"));
}
