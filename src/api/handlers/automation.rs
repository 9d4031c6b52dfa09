//! Automation scheduler endpoint.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::app_state::AppState;
use crate::error::{ErrorResponse, ServiceError};
use crate::service::scheduler::TickReport;

/// `POST /automations/tick` — Run one scheduler tick.
///
/// The entry point for the platform's external time-based invoker. Each
/// tick is a pure function of the current time and the stored
/// automation rows; the scheduler holds no state between ticks.
///
/// # Errors
///
/// Returns [`ServiceError::Store`] only if the automation list cannot
/// be loaded — individual handler failures are counted in the report,
/// not surfaced.
#[utoipa::path(
    post,
    path = "/api/v1/automations/tick",
    tag = "Automations",
    summary = "Run one scheduler tick",
    responses(
        (status = 200, description = "Tick outcome", body = TickReport),
        (status = 500, description = "Automations could not be loaded", body = ErrorResponse),
    )
)]
pub async fn tick(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let report = state.scheduler.tick(Utc::now()).await?;
    Ok(Json(report))
}

/// Automation routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/automations/tick", post(tick))
}
