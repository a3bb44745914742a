#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests for the webhook, REST and WebSocket surfaces.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    hmac::{Hmac, Mac},
    secrecy::Secret,
    serde_json::{Value, json},
    sha2::Sha256,
    tokio::net::TcpListener,
    tokio_tungstenite::{connect_async, tungstenite::Message},
};

use {
    inbox_config::InboxConfig,
    inbox_gateway::{build_gateway_app, build_state},
};

fn test_config() -> InboxConfig {
    let mut config = InboxConfig::default();
    config.database.url = "sqlite::memory:".into();
    config.webhook.verify_token = Some(Secret::new("verify-me".into()));
    config
}

/// Spin up a test gateway on an ephemeral port, return the bound address.
async fn start_test_server(config: InboxConfig) -> SocketAddr {
    let state = build_state(&config).await.unwrap();
    let app = build_gateway_app(Arc::new(state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

fn delivery(id: &str, from: &str, body: &str, ts: i64) -> Value {
    json!({
        "payload_type": "whatsapp_webhook",
        "metaData": {
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "contacts": [{ "wa_id": from, "profile": { "name": "Ravi" } }],
                        "messages": [{
                            "from": from,
                            "id": id,
                            "timestamp": ts.to_string(),
                            "type": "text",
                            "text": { "body": body }
                        }]
                    }
                }]
            }]
        }
    })
}

async fn post_json(addr: SocketAddr, path: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .json(body)
        .send()
        .await
        .unwrap()
}

async fn get_json(addr: SocketAddr, path: &str) -> Value {
    let resp = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    assert_eq!(resp.status(), 200, "GET {path}");
    resp.json().await.unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_json() {
    let addr = start_test_server(test_config()).await;
    let json = get_json(addr, "/health").await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["protocol"], 1);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn webhook_handshake_echoes_challenge_only_for_matching_token() {
    let addr = start_test_server(test_config()).await;

    let ok = reqwest::get(format!(
        "http://{addr}/api/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444"
    ))
    .await
    .unwrap();
    assert_eq!(ok.status(), 200);
    assert_eq!(ok.text().await.unwrap(), "1158201444");

    let bad = reqwest::get(format!(
        "http://{addr}/api/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1"
    ))
    .await
    .unwrap();
    assert_eq!(bad.status(), 403);
}

#[tokio::test]
async fn delivered_message_shows_up_in_conversations_and_history() {
    let addr = start_test_server(test_config()).await;

    let resp = post_json(addr, "/api/webhook", &delivery("wamid.A", "111", "hi", 1_700_000_000)).await;
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["success"], true);
    assert_eq!(report["processed"], 1);
    assert_eq!(report["messages"][0]["id"], "wamid.A");

    let conversations = get_json(addr, "/api/conversations").await;
    assert_eq!(conversations[0]["wa_id"], "111");
    assert_eq!(conversations[0]["contact_name"], "Ravi");
    assert_eq!(conversations[0]["unread_count"], 1);
    assert_eq!(conversations[0]["last_message_preview"], "hi");

    let history = get_json(addr, "/api/messages/111").await;
    assert_eq!(history["hasMore"], false);
    assert_eq!(history["messages"][0]["message_body"], "hi");
    assert_eq!(history["messages"][0]["direction"], "inbound");

    let conversations = get_json(addr, "/api/conversations").await;
    assert_eq!(conversations[0]["unread_count"], 0);
}

#[tokio::test]
async fn history_pages_newest_first_in_chronological_order() {
    let addr = start_test_server(test_config()).await;
    for i in 1..=5 {
        let resp = post_json(
            addr,
            "/api/webhook",
            &delivery(&format!("m{i}"), "111", &format!("n{i}"), 1_700_000_000 + i),
        )
        .await;
        assert_eq!(resp.status(), 200);
    }

    let first = get_json(addr, "/api/messages/111?page=1&limit=2").await;
    let ids: Vec<&str> = first["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["m4", "m5"]);
    assert_eq!(first["hasMore"], true);

    let last = get_json(addr, "/api/messages/111?page=3&limit=2").await;
    assert_eq!(last["messages"].as_array().unwrap().len(), 1);
    assert_eq!(last["messages"][0]["id"], "m1");
    assert_eq!(last["hasMore"], false);

    let bad = reqwest::get(format!("http://{addr}/api/messages/111?page=0"))
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);
}

#[tokio::test]
async fn unparseable_delivery_is_a_generic_server_error() {
    let addr = start_test_server(test_config()).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/webhook"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "malformed_payload");
    assert_eq!(body["message"], "failed to process webhook");

    // The gateway keeps serving after a rejected delivery.
    let ok = post_json(addr, "/api/webhook", &delivery("wamid.after", "111", "ok", 1_700_000_000)).await;
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn send_message_creates_outbound_record() {
    let addr = start_test_server(test_config()).await;

    let resp = post_json(
        addr,
        "/api/messages",
        &json!({ "wa_id": "111", "message_body": "hello there" }),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let message: Value = resp.json().await.unwrap();
    assert_eq!(message["direction"], "outbound");
    assert_eq!(message["status"], "sent");
    assert_eq!(message["message_type"], "text");
    assert!(!message["id"].as_str().unwrap().is_empty());

    let conversations = get_json(addr, "/api/conversations").await;
    assert_eq!(conversations[0]["last_message_preview"], "hello there");
    assert_eq!(conversations[0]["unread_count"], 0);

    let missing = post_json(addr, "/api/messages", &json!({ "wa_id": "111" })).await;
    assert_eq!(missing.status(), 400);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let bad_type = post_json(
        addr,
        "/api/messages",
        &json!({ "wa_id": "111", "message_body": "x", "message_type": "hologram" }),
    )
    .await;
    assert_eq!(bad_type.status(), 400);
}

#[tokio::test]
async fn status_update_matches_existing_message_or_404s() {
    let addr = start_test_server(test_config()).await;
    post_json(addr, "/api/webhook", &delivery("wamid.S", "111", "hi", 1_700_000_000)).await;

    let client = reqwest::Client::new();
    let resp = client
        .put(format!("http://{addr}/api/messages/wamid.S/status"))
        .json(&json!({ "status": "read" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let message: Value = resp.json().await.unwrap();
    assert_eq!(message["status"], "read");
    assert_eq!(message["message_body"], "hi");

    let missing = client
        .put(format!("http://{addr}/api/messages/nope/status"))
        .json(&json!({ "status": "read" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let invalid = client
        .put(format!("http://{addr}/api/messages/wamid.S/status"))
        .json(&json!({ "status": "teleported" }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
async fn signed_deliveries_require_a_valid_signature() {
    let mut config = test_config();
    config.webhook.app_secret = Some(Secret::new("app-secret".into()));
    let addr = start_test_server(config).await;
    let body = delivery("wamid.sig", "111", "signed", 1_700_000_000).to_string();

    let client = reqwest::Client::new();
    let unsigned = client
        .post(format!("http://{addr}/api/webhook"))
        .header("content-type", "application/json")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), 401);
    let err: Value = unsigned.json().await.unwrap();
    assert_eq!(err["error"], "unauthorized");

    let mut mac = Hmac::<Sha256>::new_from_slice(b"app-secret").unwrap();
    mac.update(body.as_bytes());
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    let signed = client
        .post(format!("http://{addr}/api/webhook"))
        .header("content-type", "application/json")
        .header("X-Hub-Signature-256", signature)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(signed.status(), 200);
}

#[tokio::test]
async fn unknown_route_returns_json_404() {
    let addr = start_test_server(test_config()).await;
    let resp = reqwest::get(format!("http://{addr}/api/unknown")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "route not found");
}

async fn next_frame<S>(ws: &mut S) -> Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .unwrap();
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn ws_client_receives_hello_and_message_updates() {
    let addr = start_test_server(test_config()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect failed");

    let hello = next_frame(&mut ws).await;
    assert_eq!(hello["type"], "event");
    assert_eq!(hello["event"], "hello");
    assert_eq!(hello["payload"]["protocol"], 1);
    assert!(hello["payload"]["features"]["methods"].is_array());

    let join = json!({
        "type": "req",
        "id": "j1",
        "method": "conversation.join",
        "params": { "wa_id": "999" }
    });
    ws.send(Message::Text(join.to_string().into())).await.unwrap();
    let res = next_frame(&mut ws).await;
    assert_eq!(res["type"], "res");
    assert_eq!(res["id"], "j1");
    assert_eq!(res["ok"], true);

    // Broadcasts are global: joining 999 does not filter updates for 111.
    let resp = post_json(addr, "/api/webhook", &delivery("wamid.live", "111", "live", 1_700_000_000)).await;
    assert_eq!(resp.status(), 200);

    let update = next_frame(&mut ws).await;
    assert_eq!(update["event"], "message.upsert");
    assert_eq!(update["payload"]["id"], "wamid.live");
    assert_eq!(update["payload"]["message_body"], "live");
    assert!(update["seq"].as_u64().unwrap() > hello["seq"].as_u64().unwrap());

    let health = get_json(addr, "/health").await;
    assert_eq!(health["connections"], 1);

    ws.close(None).await.ok();
}
