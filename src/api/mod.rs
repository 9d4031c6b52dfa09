//! REST API layer: route handlers, DTOs, auth gate, and router
//! composition.
//!
//! All control endpoints are mounted under `/api/v1` behind the admin
//! capability gate; system endpoints (`/health`) are open and live at
//! the root.

pub mod auth;
pub mod dto;
pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// OpenAPI document for the control surface.
#[cfg(feature = "swagger-ui")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        handlers::backfill::create_job,
        handlers::backfill::list_jobs,
        handlers::backfill::get_job,
        handlers::backfill::delete_job,
        handlers::backfill::pause_job,
        handlers::backfill::resume_job,
        handlers::backfill::cancel_job,
        handlers::backfill::job_logs,
        handlers::automation::tick,
        handlers::system::health_handler,
    ),
    tags(
        (name = "Backfill", description = "Historical backfill job control"),
        (name = "Automations", description = "Recurring automation scheduling"),
        (name = "System", description = "Service health"),
    )
)]
struct ApiDoc;

/// Builds the complete router: authenticated `/api/v1` resources,
/// open system routes, and (with the `swagger-ui` feature) the OpenAPI
/// explorer.
pub fn build_router(state: AppState) -> Router {
    let guarded = Router::new()
        .nest("/api/v1", handlers::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let router = Router::new().merge(guarded).merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", <ApiDoc as utoipa::OpenApi>::openapi()),
    );

    router.with_state(state)
}
