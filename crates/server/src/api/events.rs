//! Inbound chat event endpoint.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::debug;

use bundlebot_core::{DispatchOutcome, InboundEvent};

use super::middleware::AuthCaller;
use crate::metrics::EVENTS_TOTAL;
use crate::state::AppState;

/// Accept one chat event from the platform adapter.
///
/// Returns 202: a finalize triggered here keeps running after the response.
pub async fn post_event(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(event): Json<InboundEvent>,
) -> (StatusCode, Json<DispatchOutcome>) {
    debug!(
        caller = %caller,
        user = %event.user_id,
        message_id = event.message_id,
        "Inbound event"
    );

    let outcome = state.dispatcher().dispatch(event).await;
    EVENTS_TOTAL.with_label_values(&[outcome_label(&outcome)]).inc();
    (StatusCode::ACCEPTED, Json(outcome))
}

fn outcome_label(outcome: &DispatchOutcome) -> &'static str {
    match outcome {
        DispatchOutcome::BatchStarted { .. } => "batch_started",
        DispatchOutcome::ItemRecorded { .. } => "item_recorded",
        DispatchOutcome::ItemIgnored { .. } => "item_ignored",
        DispatchOutcome::FinalizeScheduled => "finalize_scheduled",
        DispatchOutcome::Cancelled { .. } => "cancelled",
        DispatchOutcome::Unhandled => "unhandled",
    }
}
