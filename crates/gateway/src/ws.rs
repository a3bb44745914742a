use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    inbox_protocol::{
        BROADCAST_CAPACITY, ConversationParams, ErrorShape, EventFrame, Features, Hello,
        MAX_PAYLOAD_BYTES, PROTOCOL_VERSION, RequestFrame, ResponseFrame, TypingParams,
        error_codes, events, methods,
    },
    serde::Serialize,
    serde_json::{Value, json},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    broadcast::WsBroadcaster,
    state::{ConnectedClient, GatewayState},
};

/// Handle a single WebSocket connection through its full lifecycle:
/// hello → request loop → cleanup.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let remote_ip = remote_addr.ip().to_string();
    info!(conn_id = %conn_id, remote_ip = %remote_ip, "ws: new connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::channel::<String>(BROADCAST_CAPACITY);

    // Forward queued frames to the socket until either side goes away.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws: write loop closed");
                break;
            }
        }
    });

    let broadcaster = &state.broadcaster;
    broadcaster.register(ConnectedClient::new(&conn_id, &remote_ip, client_tx));

    let hello = Hello {
        protocol: PROTOCOL_VERSION,
        version: state.version.clone(),
        conn_id: conn_id.clone(),
        features: Features::current(),
        max_payload: MAX_PAYLOAD_BYTES,
    };
    if let Ok(payload) = serde_json::to_value(&hello) {
        let frame = EventFrame::new(events::HELLO, payload, broadcaster.next_seq());
        send_frame(broadcaster, &conn_id, &frame);
    }

    #[cfg(feature = "metrics")]
    {
        inbox_metrics::counter!(inbox_metrics::websocket::CONNECTIONS_TOTAL).increment(1);
        inbox_metrics::gauge!(inbox_metrics::websocket::CONNECTIONS_ACTIVE).increment(1.0);
    }

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        };

        #[cfg(feature = "metrics")]
        inbox_metrics::counter!(inbox_metrics::websocket::MESSAGES_RECEIVED_TOTAL).increment(1);

        let response = if text.len() > MAX_PAYLOAD_BYTES {
            warn!(conn_id = %conn_id, size = text.len(), "ws: payload too large");
            ResponseFrame::err(
                "",
                ErrorShape::new(
                    error_codes::INVALID_REQUEST,
                    format!("payload exceeds {MAX_PAYLOAD_BYTES} bytes"),
                ),
            )
        } else {
            match serde_json::from_str::<RequestFrame>(&text) {
                Ok(req) => dispatch(broadcaster, &conn_id, req),
                Err(e) => {
                    warn!(conn_id = %conn_id, error = %e, "ws: invalid frame");
                    ResponseFrame::err(
                        "",
                        ErrorShape::new(error_codes::INVALID_REQUEST, "invalid frame"),
                    )
                },
            }
        };
        send_frame(broadcaster, &conn_id, &response);
    }

    // Dropping the registered sender ends the write loop.
    if let Some(client) = broadcaster.remove(&conn_id) {
        info!(
            conn_id = %conn_id,
            duration_secs = client.connected_at.elapsed().as_secs(),
            "ws: connection closed"
        );
    }
    write_handle.abort();

    #[cfg(feature = "metrics")]
    inbox_metrics::gauge!(inbox_metrics::websocket::CONNECTIONS_ACTIVE).decrement(1.0);
}

fn send_frame(broadcaster: &WsBroadcaster, conn_id: &str, frame: &impl Serialize) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if !broadcaster.send_to(conn_id, &json) {
                debug!(conn_id, "ws: dropped frame for slow or closed client");
            }
        },
        Err(e) => warn!(conn_id, error = %e, "ws: failed to serialize frame"),
    }
}

/// Run one client request and build its response.
pub(crate) fn dispatch(broadcaster: &WsBroadcaster, conn_id: &str, req: RequestFrame) -> ResponseFrame {
    let params = req.params.unwrap_or(Value::Null);
    debug!(conn_id, request_id = %req.id, method = %req.method, "ws: request");

    match req.method.as_str() {
        methods::CONVERSATION_JOIN | methods::CONVERSATION_LEAVE => {
            let params: ConversationParams = match serde_json::from_value(params) {
                Ok(p) => p,
                Err(e) => return invalid_params(&req.id, e),
            };
            if req.method == methods::CONVERSATION_JOIN {
                broadcaster.join(conn_id, &params.wa_id);
            } else {
                broadcaster.leave(conn_id, &params.wa_id);
            }
            ResponseFrame::ok(
                &req.id,
                json!({ "wa_id": params.wa_id, "joined": broadcaster.joined(conn_id) }),
            )
        },
        methods::TYPING => {
            let params: TypingParams = match serde_json::from_value(params) {
                Ok(p) => p,
                Err(e) => return invalid_params(&req.id, e),
            };
            let payload = json!({
                "wa_id": params.wa_id,
                "isTyping": params.is_typing,
                "connId": conn_id,
            });
            match broadcaster.broadcast(events::TYPING, payload, Some(conn_id)) {
                Ok(delivered) => ResponseFrame::ok(&req.id, json!({ "delivered": delivered })),
                Err(e) => ResponseFrame::err(
                    &req.id,
                    ErrorShape::new(error_codes::INVALID_REQUEST, e.to_string()),
                ),
            }
        },
        other => ResponseFrame::err(
            &req.id,
            ErrorShape::new(error_codes::UNKNOWN_METHOD, format!("unknown method: {other}")),
        ),
    }
}

fn invalid_params(id: &str, err: serde_json::Error) -> ResponseFrame {
    ResponseFrame::err(
        id,
        ErrorShape::new(error_codes::INVALID_REQUEST, format!("invalid params: {err}")),
    )
}
