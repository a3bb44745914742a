//! WhatsApp Business webhook endpoints: the subscription handshake and
//! event delivery.

use {
    axum::{
        Json,
        body::Bytes,
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
    },
    hmac::{Hmac, Mac},
    serde::Deserialize,
    serde_json::{Value, json},
    sha2::Sha256,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use {
    inbox_metrics::{counter, histogram, labels, webhook as webhook_metrics},
    std::time::Instant,
};

use crate::{error::ApiError, server::AppState};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Check an `X-Hub-Signature-256` value (`sha256=<hex>`) against the body.
pub fn verify_signature(body: &[u8], signature_header: &str, app_secret: &str) -> bool {
    let Some(expected) = signature_header.strip_prefix("sha256=") else {
        debug!("signature header missing sha256= prefix");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        warn!("failed to create HMAC");
        return false;
    };
    mac.update(body);
    let computed = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&computed, &expected.to_ascii_lowercase())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Query parameters of the subscription handshake.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Returns the challenge to echo when the handshake is valid. With no
/// configured token every handshake fails.
pub fn verify_subscription(query: &VerifyQuery, configured_token: Option<&str>) -> Option<String> {
    let configured = configured_token?;
    let mode = query.mode.as_deref()?;
    let token = query.verify_token.as_deref()?;
    let challenge = query.challenge.as_deref()?;

    (mode == "subscribe" && constant_time_eq(token, configured)).then(|| challenge.to_string())
}

/// `GET /api/webhook`
pub async fn verify_handler(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    match verify_subscription(&query, state.gateway.webhook.verify_token()) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge)
        },
        None => {
            warn!(mode = ?query.mode, "webhook verification rejected");
            #[cfg(feature = "metrics")]
            counter!(webhook_metrics::REJECTED_TOTAL, labels::REASON => "verify_token").increment(1);
            (StatusCode::FORBIDDEN, "verification failed".to_string())
        },
    }
}

/// `POST /api/webhook`
pub async fn receive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let gateway = &state.gateway;

    if let Some(secret) = gateway.webhook.app_secret() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, signature, secret) {
            warn!(
                has_header = !signature.is_empty(),
                "webhook signature rejected"
            );
            #[cfg(feature = "metrics")]
            counter!(webhook_metrics::REJECTED_TOTAL, labels::REASON => "signature").increment(1);
            return Err(ApiError::unauthorized("invalid webhook signature"));
        }
    }

    #[cfg(feature = "metrics")]
    let start = Instant::now();

    let result = gateway.inbox.ingest_webhook(&body).await;

    #[cfg(feature = "metrics")]
    {
        let outcome = if result.is_ok() { "accepted" } else { "rejected" };
        counter!(webhook_metrics::DELIVERIES_TOTAL, labels::RESULT => outcome).increment(1);
        histogram!(webhook_metrics::PROCESSING_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
    }

    let report = result.map_err(|e| ApiError::from_webhook(e, gateway.is_development()))?;

    Ok(Json(json!({
        "success": true,
        "processed": report.processed(),
        "created": report.created,
        "updated": report.updated,
        "failed": report.failed,
        "skipped": report.skipped,
        "shape": report.shape,
        "messages": report.messages,
    })))
}
