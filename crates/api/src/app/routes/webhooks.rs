use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use hookrelay_infra::submit::SubmitOutcome;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// `POST /send`: admit and enqueue one webhook.
///
/// The body is decoded as JSON whatever its `Content-Type`.
pub async fn send(
    Extension(services): Extension<Arc<AppServices>>,
    raw: Bytes,
) -> axum::response::Response {
    let body: dto::SendRequest = match serde_json::from_slice(&raw) {
        Ok(b) => b,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.to_string());
        }
    };

    let user_id = body.user_id.trim().to_string();
    if user_id.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Field 'user_id' is required",
        );
    }

    let payload = match body.payload_bytes() {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.to_string()),
    };

    // Store calls block; keep them off the async workers.
    let submitter = services.submitter.clone();
    let outcome = match tokio::task::spawn_blocking(move || submitter.submit(&user_id, payload)).await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "submit task failed");
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal Server Error",
            );
        }
    };

    match outcome {
        SubmitOutcome::Accepted => {
            (StatusCode::ACCEPTED, Json(dto::SendResponse::queued())).into_response()
        }
        SubmitOutcome::RateLimited => errors::json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "Rate limit exceeded. Try again later.",
        ),
        SubmitOutcome::InternalError(_) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Failed to accept task",
        ),
    }
}
