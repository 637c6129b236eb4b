//! End-to-end tests using real WebSocket and HTTP clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use async_trait::async_trait;
use jamroom_core::{GenreFilter, SessionId, SessionRecord};
use jamroom_server::{AppContext, RelayConfig, ServerConfig, ServerHandle};
use jamroom_store::{DirectoryConfig, SessionDirectory, SessionStore, StoreError};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server on a random port.
async fn boot_server() -> ServerHandle {
    boot_with(SessionDirectory::open(&DirectoryConfig::default()).unwrap()).await
}

async fn boot_with(directory: SessionDirectory) -> ServerHandle {
    jamroom_telemetry::init_for_tests();
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        shutdown_grace_secs: 2,
        ..Default::default()
    };
    jamroom_server::start(AppContext::new(config, RelayConfig::default(), directory))
        .await
        .unwrap()
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn connect(server: &ServerHandle) -> WsStream {
    let url = format!("ws://127.0.0.1:{}/ws", server.port());
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn join(ws: &mut WsStream, session_id: &str, peer_id: &str) {
    let frame = json!({
        "event": "join-room",
        "data": { "sessionId": session_id, "peerId": peer_id },
    });
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Poll until `cond` holds; panics after `TIMEOUT`.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_for_members(server: &ServerHandle, room: &str, count: usize) {
    let gateway = server.context().gateway.clone();
    let room = SessionId::from_raw(room);
    wait_until(move || gateway.room_members(&room).len() == count).await;
}

/// Next text frame as JSON, skipping control frames.
async fn next_event(ws: &mut WsStream) -> Value {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).unwrap()
                }
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    })
    .await
    .expect("no event received")
}

/// Assert no text frame arrives within `QUIET`.
async fn assert_silent(ws: &mut WsStream) {
    let result = timeout(QUIET, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = result {
        panic!("unexpected event: {text}");
    }
}

#[tokio::test]
async fn second_joiner_is_announced_to_first() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;

    join(&mut a, "room-1", "peer-a").await;
    wait_for_members(&server, "room-1", 1).await;
    join(&mut b, "room-1", "peer-b").await;
    wait_for_members(&server, "room-1", 2).await;

    assert_eq!(
        next_event(&mut a).await,
        json!({"event": "viewer joining", "data": {"peerId": "peer-b"}})
    );
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn disconnect_notifies_each_room_once() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let mut c = connect(&server).await;
    let mut d = connect(&server).await;

    join(&mut a, "s1", "pa").await;
    join(&mut b, "s2", "pb").await;
    join(&mut d, "s3", "pd").await;
    wait_for_members(&server, "s1", 1).await;
    wait_for_members(&server, "s2", 1).await;
    wait_for_members(&server, "s3", 1).await;

    join(&mut c, "s1", "pc").await;
    join(&mut c, "s2", "pc").await;
    wait_for_members(&server, "s2", 2).await;
    let _ = next_event(&mut a).await;
    let _ = next_event(&mut b).await;

    c.close(None).await.unwrap();
    wait_for_members(&server, "s1", 1).await;
    wait_for_members(&server, "s2", 1).await;

    assert_eq!(next_event(&mut a).await, json!({"event": "viewer leaving"}));
    assert_eq!(next_event(&mut b).await, json!({"event": "viewer leaving"}));
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
    assert_silent(&mut d).await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_frames_do_not_break_the_connection() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;

    a.send(Message::Text("not json".into())).await.unwrap();
    a.send(Message::Text(r#"["join-room","../etc","p"]"#.into()))
        .await
        .unwrap();
    join(&mut a, "ok-room", "pa").await;
    wait_for_members(&server, "ok-room", 1).await;

    join(&mut b, "ok-room", "pb").await;
    assert_eq!(
        next_event(&mut a).await,
        json!({"event": "viewer joining", "data": {"peerId": "pb"}})
    );
    assert_eq!(server.context().gateway.room_count(), 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn create_then_list_public() {
    let server = boot_server().await;
    let http = http_client();
    let base = format!("http://127.0.0.1:{}", server.port());

    let resp = http
        .post(format!("{base}/create/done"))
        .form(&[("visibility", "public"), ("genre", "jazz"), ("title", "late set")])
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());
    let location = resp.headers()["location"].to_str().unwrap().to_owned();
    let id = location.strip_prefix("/session/").unwrap().to_owned();
    assert!(uuid_like(&id), "got: {id}");

    let _ = http
        .post(format!("{base}/create/done"))
        .form(&[("visibility", "private"), ("genre", "jazz")])
        .send()
        .await
        .unwrap();

    let listed: Vec<Value> = http
        .get(format!("{base}/join/public?genreTags=jazz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        listed,
        vec![json!({
            "visibility": "public",
            "genre": "jazz",
            "title": "late set",
            "sessionId": id,
        })]
    );

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn list_public_with_many_tags() {
    let server = boot_server().await;
    let http = http_client();
    let base = format!("http://127.0.0.1:{}", server.port());

    for (visibility, genre) in [
        ("public", "rap"),
        ("public", "pop"),
        ("public", "jazz"),
        ("private", "rap"),
    ] {
        let resp = http
            .post(format!("{base}/create/done"))
            .form(&[("visibility", visibility), ("genre", genre)])
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_redirection());
    }

    for query in [
        "genreTags=rap&genreTags=pop",
        "genreTags%5B%5D=rap&genreTags%5B%5D=pop",
        "genreTags=rap,pop",
    ] {
        let listed: Vec<Value> = http
            .get(format!("{base}/join/public?{query}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let mut genres: Vec<&str> = listed.iter().map(|r| r["genre"].as_str().unwrap()).collect();
        genres.sort_unstable();
        assert_eq!(genres, vec!["pop", "rap"], "query: {query}");
        assert!(listed.iter().all(|r| r["visibility"] == "public"));
    }

    let all: Vec<Value> = http
        .get(format!("{base}/join/public"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn created_genre_can_always_be_listed_back() {
    let server = boot_server().await;
    let http = http_client();
    let base = format!("http://127.0.0.1:{}", server.port());

    for genre in ["r&b soul", "r&b", "drum & bass"] {
        let resp = http
            .post(format!("{base}/create/done"))
            .form(&[("visibility", "public"), ("genre", genre)])
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_redirection());
    }

    let resp = http
        .post(format!("{base}/create/done"))
        .form(&[("visibility", "public"), ("genre", "r&b, soul")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    for genre in ["r&b soul", "r&b", "drum & bass"] {
        let listed: Vec<Value> = http
            .get(format!("{base}/join/public"))
            .query(&[("genreTags", genre)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.len(), 1, "genre: {genre}");
        assert_eq!(listed[0]["genre"], genre);
    }

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn join_private_redirects_without_lookup() {
    let server = boot_server().await;
    let http = http_client();
    let base = format!("http://127.0.0.1:{}", server.port());

    let resp = http
        .get(format!("{base}/join/private?sessionID=nonexistent-id"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()["location"], "/session/nonexistent-id");

    let resp = http
        .get(format!("{base}/join/private"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn create_with_unknown_visibility_is_rejected() {
    let server = boot_server().await;
    let http = http_client();
    let resp = http
        .post(format!("http://127.0.0.1:{}/create/done", server.port()))
        .form(&[("visibility", "secret")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    server.shutdown().await.unwrap();
}

struct DownStore;

#[async_trait]
impl SessionStore for DownStore {
    async fn insert(&self, _record: SessionRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn find_public(&self, _filter: GenreFilter) -> Result<Vec<SessionRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn store_failure_is_reported_and_relay_keeps_working() {
    let directory = SessionDirectory::new(Arc::new(DownStore), Duration::from_secs(1));
    let server = boot_with(directory).await;
    let http = http_client();
    let base = format!("http://127.0.0.1:{}", server.port());

    let resp = http
        .post(format!("{base}/create/done"))
        .form(&[("visibility", "public")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "store_error");

    let resp = http.get(format!("{base}/join/public")).send().await.unwrap();
    assert_eq!(resp.status(), 500);

    let resp = http
        .get(format!("{base}/join/private?sessionID=abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["location"], "/session/abc");

    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    join(&mut a, "r", "pa").await;
    wait_for_members(&server, "r", 1).await;
    join(&mut b, "r", "pb").await;
    assert_eq!(
        next_event(&mut a).await,
        json!({"event": "viewer joining", "data": {"peerId": "pb"}})
    );

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_drains_connections() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    join(&mut a, "room", "pa").await;
    wait_for_members(&server, "room", 1).await;

    let gateway = server.context().gateway.clone();
    server.shutdown().await.unwrap();

    assert_eq!(gateway.connection_count(), 0);
    assert_eq!(gateway.room_count(), 0);

    let closed = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

fn uuid_like(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == 5
        && parts.iter().map(|p| p.len()).collect::<Vec<_>>() == vec![8, 4, 4, 4, 12]
        && parts[2].starts_with('4')
        && s.chars().all(|c| c == '-' || c.is_ascii_hexdigit())
}
