//! WebSocket transport tests against a real listener on an ephemeral port

use async_trait::async_trait;
use daz_config::AppConfig;
use daz_foundation::codec::Envelope;
use daz_foundation::errors::DazResult;
use daz_foundation::model::mcp::McpResponse;
use daz_transport::{run_ws_server, McpDispatcher};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Echoes the method back; `slow/*` methods take a while
struct EchoDispatcher;

#[async_trait]
impl McpDispatcher for EchoDispatcher {
    async fn dispatch(&self, envelope: Envelope) -> DazResult<Option<McpResponse>> {
        match envelope {
            Envelope::Request(request) => {
                if request.method.starts_with("slow/") {
                    tokio::time::sleep(Duration::from_millis(1500)).await;
                }
                Ok(Some(McpResponse::success(
                    request.id,
                    json!({"method": request.method}),
                )))
            }
            Envelope::Notification(_) => Ok(None),
        }
    }
}

async fn spawn_server(config: AppConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_ws_server(
        listener,
        Arc::new(config),
        Arc::new(EchoDispatcher),
    ));
    format!("ws://{}", addr)
}

fn request(id: i64, method: &str) -> Message {
    Message::Text(
        json!({"jsonrpc": "2.0", "id": id, "method": method})
            .to_string()
            .into(),
    )
}

fn parse(message: Message) -> Value {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_replies_follow_request_order() {
    let url = spawn_server(AppConfig::default()).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    ws.send(request(1, "initialize")).await.unwrap();
    ws.send(Message::Text("{broken".to_string().into()))
        .await
        .unwrap();
    ws.send(Message::Text(
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#
            .to_string()
            .into(),
    ))
    .await
    .unwrap();
    ws.send(request(2, "tools/list")).await.unwrap();

    let first = parse(ws.next().await.unwrap().unwrap());
    let second = parse(ws.next().await.unwrap().unwrap());
    let third = parse(ws.next().await.unwrap().unwrap());

    assert_eq!(first["id"], 1);
    assert_eq!(second["id"], Value::Null);
    assert_eq!(second["error"]["code"], -32700);
    assert_eq!(third["id"], 2);
    assert_eq!(third["result"]["method"], "tools/list");
}

#[tokio::test]
async fn test_binary_frames_are_read_as_text() {
    let url = spawn_server(AppConfig::default()).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    let body = json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"}).to_string();
    ws.send(Message::Binary(body.into_bytes().into()))
        .await
        .unwrap();

    let reply = parse(ws.next().await.unwrap().unwrap());
    assert_eq!(reply["id"], 7);
}

#[tokio::test]
async fn test_slow_client_does_not_block_others() {
    let url = spawn_server(AppConfig::default()).await;
    let (mut slow, _) = connect_async(url.as_str()).await.unwrap();
    let (mut fast, _) = connect_async(url.as_str()).await.unwrap();

    slow.send(request(1, "slow/render")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    fast.send(request(2, "tools/list")).await.unwrap();

    let fast_reply = tokio::time::timeout(Duration::from_millis(1000), fast.next())
        .await
        .expect("fast client was blocked by the slow one")
        .unwrap()
        .unwrap();
    assert_eq!(parse(fast_reply)["id"], 2);

    let slow_reply = parse(slow.next().await.unwrap().unwrap());
    assert_eq!(slow_reply["id"], 1);
}

#[tokio::test]
async fn test_max_clients_rejects_extra_connections() {
    let mut config = AppConfig::default();
    config.server.max_clients = Some(1);
    let url = spawn_server(config).await;

    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    first.send(request(1, "initialize")).await.unwrap();
    first.next().await.unwrap().unwrap();

    assert!(connect_async(url.as_str()).await.is_err());

    let _ = first.close(None).await;
    drop(first);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (mut again, _) = connect_async(url.as_str()).await.unwrap();
    again.send(request(2, "initialize")).await.unwrap();
    assert_eq!(parse(again.next().await.unwrap().unwrap())["id"], 2);
}
