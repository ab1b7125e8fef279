//! `NtfyRelay` and `LinkBroker` against small in-process HTTP servers that
//! answer the way ntfy and the link broker do.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use enchat_net::{
    join_from_link, spawn_listener, Connectivity, Cursor, EnvelopeCodec, HttpOptions, Inbound,
    LinkBroker, ListenerConfig, NetError, NtfyRelay, Relay, RelayOp,
};
use enchat_shared::{LinkError, RoomCredentials, RoomKey, SessionKeyStore};

const TOPIC: &str = "enchat-test-topic";

#[derive(Default)]
struct NtfyState {
    /// `(id, time, message)` in arrival order.
    messages: Vec<(String, i64, String)>,
    /// Answer every request with this status instead.
    fail_with: Option<u16>,
    /// Bodies above this size get a 413, like a server without attachments.
    body_limit: Option<usize>,
    /// `since` values seen by the poll endpoint.
    since_seen: Vec<String>,
}

#[derive(Clone, Default)]
struct FakeNtfy(Arc<Mutex<NtfyState>>);

impl FakeNtfy {
    fn lock(&self) -> MutexGuard<'_, NtfyState> {
        self.0.lock().unwrap()
    }

    fn router(&self) -> Router {
        Router::new()
            .route(&format!("/{TOPIC}"), post(ntfy_publish))
            .route(&format!("/{TOPIC}/json"), get(ntfy_poll))
            .route("/v1/health", get(ntfy_health))
            .with_state(self.clone())
    }
}

fn failure(fail_with: Option<u16>) -> Option<Response> {
    fail_with.map(|code| StatusCode::from_u16(code).unwrap().into_response())
}

async fn ntfy_publish(State(ntfy): State<FakeNtfy>, body: String) -> Response {
    let mut state = ntfy.lock();
    if let Some(resp) = failure(state.fail_with) {
        return resp;
    }
    if state.body_limit.is_some_and(|limit| body.len() > limit) {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }
    let n = state.messages.len() as i64;
    let (id, time) = (format!("msg{n}"), 1_700_000_000 + n * 10);
    state.messages.push((id.clone(), time, body.clone()));
    Json(json!({"id": id, "time": time, "event": "message", "topic": TOPIC, "message": body}))
        .into_response()
}

/// NDJSON like `GET /<topic>/json?poll=1&since=...`, framed by the `open` and
/// `keepalive` events a real server interleaves.
async fn ntfy_poll(
    State(ntfy): State<FakeNtfy>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = ntfy.lock();
    if let Some(resp) = failure(state.fail_with) {
        return resp;
    }
    assert_eq!(params.get("poll").map(String::as_str), Some("1"));
    let since = params.get("since").cloned().unwrap_or_else(|| "all".into());
    state.since_seen.push(since.clone());

    let selected: Vec<&(String, i64, String)> = match since.as_str() {
        "all" => state.messages.iter().collect(),
        s => match s.parse::<i64>() {
            Ok(time) => state.messages.iter().filter(|m| m.1 >= time).collect(),
            Err(_) => match state.messages.iter().position(|m| m.0 == s) {
                Some(pos) => state.messages[pos + 1..].iter().collect(),
                None => state.messages.iter().collect(),
            },
        },
    };

    let mut lines = vec![json!({"id": "open0", "time": 1, "event": "open", "topic": TOPIC}).to_string()];
    for (id, time, message) in selected {
        lines.push(
            json!({"id": id, "time": time, "event": "message", "topic": TOPIC, "message": message})
                .to_string(),
        );
        lines.push(json!({"id": "ka", "time": time, "event": "keepalive", "topic": TOPIC}).to_string());
    }
    lines.join("\n").into_response()
}

async fn ntfy_health(State(ntfy): State<FakeNtfy>) -> Response {
    match failure(ntfy.lock().fail_with) {
        Some(resp) => resp,
        None => Json(json!({"healthy": true})).into_response(),
    }
}

#[derive(Default)]
struct BrokerState {
    /// Session id to `(payload, uses left)`.
    sessions: HashMap<String, (String, u32)>,
    fail_create: bool,
}

#[derive(Clone, Default)]
struct FakeBroker(Arc<Mutex<BrokerState>>);

impl FakeBroker {
    fn router(&self) -> Router {
        Router::new()
            .route("/create", post(broker_create))
            .fallback(broker_get)
            .with_state(self.clone())
    }
}

async fn broker_create(State(broker): State<FakeBroker>, Json(req): Json<Value>) -> Response {
    let mut state = broker.0.lock().unwrap();
    if state.fail_create {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let payload = req["payload"].as_str().unwrap_or_default().to_string();
    let uses = req["uses"].as_u64().unwrap_or(1) as u32;
    let id = format!("sess{}", state.sessions.len());
    state.sessions.insert(id.clone(), (payload, uses));
    Json(json!({"session_id": id})).into_response()
}

async fn broker_get(State(broker): State<FakeBroker>, uri: Uri) -> Response {
    let Some(id) = uri.path().strip_prefix("/get/") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut state = broker.0.lock().unwrap();
    match state.sessions.get_mut(id) {
        Some((payload, uses)) if *uses > 0 => {
            *uses -= 1;
            Json(json!({"payload": payload.clone()})).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn options() -> HttpOptions {
    HttpOptions::with_timeout(Duration::from_secs(5))
}

async fn ntfy_relay() -> (FakeNtfy, NtfyRelay) {
    let ntfy = FakeNtfy::default();
    let url = serve(ntfy.router()).await;
    let relay = NtfyRelay::new(&url, TOPIC, &options()).unwrap();
    (ntfy, relay)
}

fn texts(messages: &[enchat_net::RelayMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.text.as_str()).collect()
}

#[tokio::test]
async fn test_publish_then_poll_by_time_and_by_id() {
    let (ntfy, relay) = ntfy_relay().await;
    relay.publish("first").await.unwrap();
    relay.publish("second").await.unwrap();
    relay.publish("third").await.unwrap();

    let all = relay.fetch_since(&Cursor::All).await.unwrap();
    assert_eq!(texts(&all), ["first", "second", "third"]);
    assert_eq!(all[0].time, 1_700_000_000);

    let by_time = relay.fetch_since(&Cursor::Since(all[1].time)).await.unwrap();
    assert_eq!(texts(&by_time), ["second", "third"]);

    let by_id = relay.fetch_since(&Cursor::After(all[0].id.clone())).await.unwrap();
    assert_eq!(texts(&by_id), ["second", "third"]);

    let caught_up = relay.fetch_since(&Cursor::After(all[2].id.clone())).await.unwrap();
    assert!(caught_up.is_empty());

    assert_eq!(ntfy.lock().since_seen, ["all", "1700000010", "msg0", "msg2"]);
    relay.health().await.unwrap();
}

#[tokio::test]
async fn test_http_errors_map_to_status() {
    let (ntfy, relay) = ntfy_relay().await;
    ntfy.lock().fail_with = Some(503);

    for err in [
        relay.publish("hello").await.unwrap_err(),
        relay.fetch_since(&Cursor::All).await.unwrap_err(),
        relay.health().await.unwrap_err(),
    ] {
        assert!(matches!(err, NetError::Status { status: 503, .. }), "{err}");
        assert!(!err.is_permanent());
    }
    assert!(ntfy.lock().messages.is_empty());
}

#[tokio::test]
async fn test_server_side_size_refusal_is_permanent() {
    let (ntfy, relay) = ntfy_relay().await;
    ntfy.lock().body_limit = Some(64);

    let err = relay.publish(&"z".repeat(100)).await.unwrap_err();
    assert!(matches!(err, NetError::TooLarge { size: 100, .. }));
    assert!(err.is_permanent());
    relay.publish("small").await.unwrap();
}

async fn next(rx: &mut mpsc::Receiver<Inbound>) -> Inbound {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("listener produced nothing")
        .expect("listener channel closed")
}

#[tokio::test]
async fn test_listener_reports_offline_and_recovers_over_http() {
    let (ntfy, relay) = ntfy_relay().await;
    ntfy.lock().fail_with = Some(500);

    let codec = Arc::new(EnvelopeCodec::new(
        "http-room",
        RoomKey::from_bytes([9u8; 32]),
        Arc::new(SessionKeyStore::new()),
        true,
    ));
    let relay: Arc<dyn Relay> = Arc::new(relay);
    let config = ListenerConfig {
        poll_interval: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        ..ListenerConfig::default()
    };
    let (tx, mut rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = spawn_listener(relay, codec, config, tx, stop_rx);

    match next(&mut rx).await {
        Inbound::Connectivity {
            op: RelayOp::Poll,
            status: Connectivity::Offline(reason),
        } => assert!(reason.contains("500"), "{reason}"),
        other => panic!("expected offline, got {other:?}"),
    }

    ntfy.lock().fail_with = None;
    assert_eq!(
        next(&mut rx).await,
        Inbound::Connectivity {
            op: RelayOp::Poll,
            status: Connectivity::Online
        }
    );

    stop_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_share_link_round_trip_then_used_up() {
    let broker_state = FakeBroker::default();
    let url = serve(broker_state.router()).await;
    let broker = LinkBroker::new(&url, &options()).unwrap();
    let creds = RoomCredentials::new("ops", "https://ntfy.example", "s3cret|with|bars");

    let link = broker.share_room(&creds, Some(600), Some(1)).await.unwrap();
    assert!(link.starts_with(&format!("{url}/join#sess0:")));

    // The broker only ever saw ciphertext.
    let stored = broker_state.0.lock().unwrap().sessions["sess0"].0.clone();
    assert!(!stored.contains("s3cret"));

    let joined = join_from_link(&link, &options()).await.unwrap();
    assert_eq!(joined, creds);

    let err = join_from_link(&link, &options()).await.unwrap_err();
    assert!(matches!(err, NetError::Link(LinkError::ExpiredOrUsed)), "{err}");
}

#[tokio::test]
async fn test_unknown_link_and_failed_create() {
    let broker_state = FakeBroker::default();
    let url = serve(broker_state.router()).await;
    let broker = LinkBroker::new(&url, &options()).unwrap();

    let err = broker.fetch_payload("nope").await.unwrap_err();
    assert!(matches!(err, NetError::Link(LinkError::ExpiredOrUsed)));

    broker_state.0.lock().unwrap().fail_create = true;
    let creds = RoomCredentials::new("ops", "https://ntfy.example", "pw");
    let err = broker.share_room(&creds, None, None).await.unwrap_err();
    assert!(matches!(err, NetError::Status { status: 500, .. }), "{err}");
}
