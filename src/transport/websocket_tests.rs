use crate::config::Settings;
use crate::hub::{HubCommand, HubHandle};
use crate::server::Server;
use crate::transport::{ConnectionContext, start_websocket_server};
use crate::upstream::testing::{ScriptedSource, playing};
use futures_util::StreamExt;
use reqwest::StatusCode;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::utils::error::ServerError;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Running {
    addr: SocketAddr,
    source: Arc<ScriptedSource>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

async fn start_server(allowed_origins: Vec<String>) -> Running {
    let mut settings = Settings::default();
    settings.server.host = "127.0.0.1".to_string();
    settings.server.port = 0;
    settings.server.allowed_origins = allowed_origins;
    settings.poller.interval_ms = 50;
    settings.shutdown.grace_secs = 2;

    let source = Arc::new(ScriptedSource::constant(playing("T1", 1000)));
    let server = Server::bind(settings).await.expect("bind failed");
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(server.run(source.clone(), shutdown.clone()));

    Running {
        addr,
        source,
        shutdown,
        task,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .expect("WebSocket handshake failed");
    client
}

async fn next_state(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("no message within 2s")
            .expect("connection closed")
            .expect("read error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Serves only the routes, backed by a detached hub.
async fn serve_routes(
    allowed_origins: Vec<String>,
) -> (SocketAddr, UnboundedReceiver<HubCommand>, CancellationToken) {
    let (hub, commands) = HubHandle::detached();
    let ctx = ConnectionContext::new(
        hub,
        allowed_origins,
        Settings::default().connection,
        TaskTracker::new(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(start_websocket_server(listener, ctx, shutdown.clone()));
    (addr, commands, shutdown)
}

async fn wait_closed(client: &mut Client) {
    let end = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => return,
                Some(Ok(WsMessage::Text(text))) => panic!("unexpected payload {text:?}"),
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(end.is_ok(), "connection stayed open");
}

#[tokio::test]
async fn test_subscriber_receives_current_state() {
    let server = start_server(Vec::new()).await;
    let mut client = connect(server.addr).await;

    let state = next_state(&mut client).await;
    assert_eq!(state["is_playing"], true);
    assert_eq!(state["item"]["id"], "T1");
    assert!(state.get("progress_ms").is_none());

    server.shutdown.cancel();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_changes_reach_every_subscriber() {
    let server = start_server(Vec::new()).await;
    let mut first = connect(server.addr).await;
    let mut second = connect(server.addr).await;

    assert_eq!(next_state(&mut first).await["item"]["id"], "T1");
    assert_eq!(next_state(&mut second).await["item"]["id"], "T1");

    server.source.set_fallback(playing("T2", 0));
    assert_eq!(next_state(&mut first).await["item"]["id"], "T2");
    assert_eq!(next_state(&mut second).await["item"]["id"], "T2");

    server.shutdown.cancel();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_disallowed_origin_is_closed_without_payload() {
    let server = start_server(vec!["https://a.example".to_string()]).await;

    let mut request = format!("ws://{}/", server.addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://b.example"));
    let (mut client, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("WebSocket handshake failed");

    wait_closed(&mut client).await;

    // an allowed origin on the same server still gets the state
    let mut request = format!("ws://{}/", server.addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://a.example"));
    let (mut client, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(next_state(&mut client).await["item"]["id"], "T1");

    server.shutdown.cancel();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_health_route() {
    let (addr, mut commands, shutdown) = serve_routes(Vec::new()).await;
    let http = reqwest::Client::new();

    let response = http.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");

    // obs-text in an unrelated header is still a valid request
    let response = http
        .get(format!("http://{addr}/health"))
        .header(
            "X-Client",
            reqwest::header::HeaderValue::from_bytes(b"caf\xe9").unwrap(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = http.head(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await.unwrap().is_empty());

    assert!(commands.try_recv().is_err());
    shutdown.cancel();
}

#[tokio::test]
async fn test_plain_request_on_root_gets_upgrade_hint() {
    let (addr, mut commands, shutdown) = serve_routes(Vec::new()).await;

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    let headers = response.headers();
    assert_eq!(headers["upgrade"], "websocket");
    assert_eq!(headers["connection"], "Upgrade");
    assert_eq!(headers["x-source"], "github.com/skidoodle/spotify-ws");
    assert_eq!(
        response.text().await.unwrap(),
        "426 Upgrade Required (github.com/skidoodle/spotify-ws)"
    );

    assert!(commands.try_recv().is_err());
    shutdown.cancel();
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let (addr, _commands, shutdown) = serve_routes(Vec::new()).await;

    for path in ["/favicon.ico", "/health/extra"] {
        let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        assert_eq!(response.text().await.unwrap(), "404 page not found");
    }

    shutdown.cancel();
}

#[tokio::test]
async fn test_upgrade_checks_origin_before_registering() {
    let (addr, mut commands, shutdown) =
        serve_routes(vec!["https://a.example".to_string()]).await;

    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://b.example"));
    let (mut client, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("WebSocket handshake failed");
    wait_closed(&mut client).await;
    assert!(commands.try_recv().is_err());

    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://a.example"));
    let (mut client, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    let subscriber = match tokio::time::timeout(Duration::from_secs(2), commands.recv()).await {
        Ok(Some(HubCommand::Register(subscriber))) => subscriber,
        other => panic!("expected register, got {other:?}"),
    };
    subscriber
        .try_send(axum::extract::ws::Message::text("{\"is_playing\":false,\"item\":null}"))
        .unwrap();
    let msg = client.next().await.unwrap().unwrap();
    assert_eq!(msg.to_text().unwrap(), "{\"is_playing\":false,\"item\":null}");

    shutdown.cancel();
}

#[tokio::test]
async fn test_grace_period_bounds_shutdown() {
    let mut settings = Settings::default();
    settings.server.host = "127.0.0.1".to_string();
    settings.server.port = 0;
    settings.shutdown.grace_secs = 1;

    let server = Server::bind(settings).await.expect("bind failed");
    // a connection task that ignores shutdown entirely
    server
        .tracker()
        .spawn(tokio::time::sleep(Duration::from_secs(30)));

    let source = Arc::new(ScriptedSource::constant(playing("T1", 1000)));
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(server.run(source, shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("run did not return after the grace period")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    let server = start_server(Vec::new()).await;
    let mut client = connect(server.addr).await;
    next_state(&mut client).await;

    server.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(3), server.task)
        .await
        .expect("server did not stop within the grace period")
        .unwrap()
        .unwrap();

    wait_closed(&mut client).await;

    assert!(TcpStream::connect(server.addr).await.is_err());
}
