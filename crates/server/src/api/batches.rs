//! Batch inspection and cancellation handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use bundlebot_core::{Batch, CancelOutcome, UserId};

use crate::state::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct BatchErrorResponse {
    pub error: String,
}

/// Current batch of a user, open or finalizing.
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Batch>, (StatusCode, Json<BatchErrorResponse>)> {
    let user = UserId(user_id);
    state.orchestrator().batch(user).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(BatchErrorResponse {
                error: format!("No batch for user {}", user),
            }),
        )
    })
}

/// Cancel the user's open batch. Sends no chat message.
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Json<CancelOutcome> {
    Json(state.orchestrator().cancel(UserId(user_id)))
}
