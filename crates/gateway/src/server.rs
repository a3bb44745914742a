use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        http::{HeaderValue, StatusCode},
        response::IntoResponse,
        routing::{get, post, put},
    },
    inbox_config::{InboxConfig, InboxSection},
    inbox_messages::{Inbox, InboxOptions, MessageBroadcaster},
    inbox_store::{SqliteConversationStore, SqliteMessageStore, SqlitePool},
    serde_json::json,
    tower_http::{
        cors::{AllowOrigin, Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{api, broadcast::WsBroadcaster, state::GatewayState, webhook, ws::handle_connection};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Wiring ───────────────────────────────────────────────────────────────────

pub fn inbox_options(section: &InboxSection) -> InboxOptions {
    InboxOptions {
        preview_chars: section.preview_chars,
        conversation_limit: section.conversation_limit,
        default_page_size: section.default_page_size,
        max_page_size: section.max_page_size,
    }
}

/// An [`Inbox`] backed by the SQLite stores on `pool`.
pub fn sqlite_inbox(
    pool: SqlitePool,
    broadcaster: Arc<dyn MessageBroadcaster>,
    section: &InboxSection,
) -> Inbox {
    Inbox::new(
        Arc::new(SqliteMessageStore::new(pool.clone())),
        Arc::new(SqliteConversationStore::new(pool)),
        broadcaster,
        inbox_options(section),
    )
}

/// Open the database, run migrations and assemble the gateway state.
///
/// The metrics recorder is not installed here; see [`start_gateway`].
pub async fn build_state(config: &InboxConfig) -> anyhow::Result<GatewayState> {
    let pool = inbox_store::connect(&config.database.url, config.database.max_connections).await?;
    inbox_store::run_migrations(&pool).await?;

    let broadcaster = Arc::new(WsBroadcaster::new());
    let inbox = sqlite_inbox(pool, broadcaster.clone(), &config.inbox);
    Ok(GatewayState::new(Arc::new(inbox), broadcaster, config))
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = cors_layer(&state.cors_origins);

    let api = Router::new()
        .route(
            "/webhook",
            get(webhook::verify_handler).post(webhook::receive_handler),
        )
        .route("/conversations", get(api::list_conversations))
        .route("/messages", post(api::send_message))
        // `{id}` is the conversation id here and a message id below.
        .route("/messages/{id}", get(api::list_messages))
        .route("/messages/{id}/status", put(api::update_status));

    let router = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .nest("/api", api);

    #[cfg(feature = "metrics")]
    let router = router
        .route(
            "/metrics",
            get(crate::metrics_routes::prometheus_metrics_handler),
        )
        .layer(axum::middleware::from_fn(
            crate::metrics_middleware::http_metrics_middleware,
        ));

    router
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { gateway: state })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin, error = %e, "ignoring invalid CORS origin");
                None
            },
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Start the gateway HTTP + WebSocket server.
pub async fn start_gateway(config: InboxConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;

    #[cfg(feature = "metrics")]
    let state = state.with_metrics(inbox_metrics::init_metrics(
        inbox_metrics::MetricsRecorderConfig {
            enabled: config.metrics.enabled,
            global_labels: vec![("service".into(), "inbox".into())],
        },
    )?);

    let app = build_gateway_app(Arc::new(state));

    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;
    info!(
        %addr,
        environment = %config.server.environment,
        database = %config.database.url,
        "inbox gateway listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("inbox gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = &state.gateway;
    Json(json!({
        "status": "ok",
        "version": gateway.version,
        "protocol": inbox_protocol::PROTOCOL_VERSION,
        "timestamp": chrono::Utc::now(),
        "environment": gateway.environment,
        "uptime_secs": gateway.started_at.elapsed().as_secs(),
        "connections": gateway.broadcaster.client_count(),
    }))
}

async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": "inbox",
        "version": state.gateway.version,
        "endpoints": {
            "health": "GET /health",
            "metrics": "GET /metrics",
            "websocket": "GET /ws",
            "webhook_verify": "GET /api/webhook",
            "webhook": "POST /api/webhook",
            "conversations": "GET /api/conversations",
            "messages": "GET /api/messages/{wa_id}?page&limit",
            "send": "POST /api/messages",
            "status": "PUT /api/messages/{id}/status",
        },
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "route not found" })),
    )
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state.gateway, addr))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{body::Body, http::Request},
        tower::ServiceExt,
    };

    async fn app() -> Router {
        let mut config = InboxConfig::default();
        config.database.url = "sqlite::memory:".into();
        build_gateway_app(Arc::new(build_state(&config).await.unwrap()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_environment_and_connections() {
        let (status, body) = get_json(app().await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["environment"], "production");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (status, body) = get_json(app().await, "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "route not found");
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let (status, body) = get_json(app().await, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["webhook"], "POST /api/webhook");
    }

    #[tokio::test]
    async fn development_environment_exposes_webhook_error_detail() {
        let mut config = InboxConfig::default();
        config.database.url = "sqlite::memory:".into();
        assert!(!build_state(&config).await.unwrap().is_development());

        config.server.environment = inbox_config::Environment::Development;
        let state = build_state(&config).await.unwrap();
        assert!(state.is_development());

        let response = build_gateway_app(Arc::new(state))
            .oneshot(
                Request::post("/api/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from("{ not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "malformed_payload");
        assert_ne!(body["message"], "failed to process webhook");
    }

    #[test]
    fn options_follow_config_section() {
        let section = InboxSection {
            preview_chars: 10,
            conversation_limit: 3,
            default_page_size: 4,
            max_page_size: 5,
        };
        let options = inbox_options(&section);
        assert_eq!(options.preview_chars, 10);
        assert_eq!(options.max_page_size, 5);
    }
}
