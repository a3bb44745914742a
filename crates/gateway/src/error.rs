//! HTTP mapping of inbox errors.
//!
//! Every failure leaves the gateway as `{ "error": <kind>, "message": <text> }`.
//! Outside development, storage and payload errors carry a generic message
//! instead of the underlying detail.

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    inbox_messages::Error,
    serde_json::json,
    tracing::error,
};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    /// Map an inbox error, hiding internal detail unless `expose_detail`.
    pub fn from_inbox(err: Error, expose_detail: bool) -> Self {
        let (status, generic) = match &err {
            Error::MalformedPayload { .. } => (StatusCode::BAD_REQUEST, Some("invalid payload")),
            Error::Validation { .. } => (StatusCode::BAD_REQUEST, None),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, None),
            Error::Storage { .. } | Error::Broadcast { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, Some("internal server error"))
            },
        };
        if status.is_server_error() {
            error!(kind = err.kind(), error = %err, "request failed");
        }

        let message = match generic {
            Some(generic) if !expose_detail => generic.to_string(),
            _ => err.to_string(),
        };
        Self {
            status,
            kind: err.kind(),
            message,
        }
    }

    /// Map a failed webhook delivery. A body that cannot be parsed at all is
    /// a generic server error; everything else maps as in [`Self::from_inbox`].
    pub fn from_webhook(err: Error, expose_detail: bool) -> Self {
        if !matches!(err, Error::MalformedPayload { .. }) {
            return Self::from_inbox(err, expose_detail);
        }
        error!(kind = err.kind(), error = %err, "failed to process webhook");
        let message = if expose_detail {
            err.to_string()
        } else {
            "failed to process webhook".to_string()
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: err.kind(),
            message,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "unauthorized",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.kind, "message": self.message })),
        )
            .into_response()
    }
}
