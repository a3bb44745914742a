//! REST endpoints over the inbox service.

use {
    axum::{
        Json,
        extract::{Path, Query, State, rejection::JsonRejection},
        http::StatusCode,
    },
    inbox_messages::{CanonicalMessage, ConversationSummary, Error, HistoryPage, SendMessage},
    serde::Deserialize,
};

use crate::{error::ApiError, server::AppState};

type ApiResult<T> = Result<T, ApiError>;

fn map_err(state: &AppState) -> impl Fn(Error) -> ApiError + '_ {
    move |e| ApiError::from_inbox(e, state.gateway.is_development())
}

/// Unreadable request bodies get the same error shape as everything else.
fn json_body<T>(state: &AppState, body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| map_err(state)(Error::malformed(rejection.body_text())))
}

/// `GET /api/conversations`
pub async fn list_conversations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let conversations = state
        .gateway
        .inbox
        .conversations()
        .await
        .map_err(map_err(&state))?;
    Ok(Json(conversations))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// `GET /api/messages/{wa_id}?page&limit`
pub async fn list_messages(
    State(state): State<AppState>,
    Path(wa_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryPage>> {
    let page = state
        .gateway
        .inbox
        .history(&wa_id, query.page, query.limit)
        .await
        .map_err(map_err(&state))?;
    Ok(Json(page))
}

/// `POST /api/messages`
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessage>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CanonicalMessage>)> {
    let request = json_body(&state, body)?;
    let message = state
        .gateway
        .inbox
        .send_message(request)
        .await
        .map_err(map_err(&state))?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
}

/// `PUT /api/messages/{id}/status`
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<CanonicalMessage>> {
    let status = json_body(&state, body)?.status.unwrap_or_default();
    let message = state
        .gateway
        .inbox
        .update_status(&id, &status)
        .await
        .map_err(map_err(&state))?;
    Ok(Json(message))
}
