use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/scheduler/status", get(status))
        .route("/scheduler/trigger/:job", post(trigger))
}

pub async fn status(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.scheduler.status())
}

/// Manual run of `reserved-to-active` or `overdue`; waits for an in-flight run.
pub async fn trigger(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job): Path<String>,
) -> axum::response::Response {
    match services.scheduler.trigger_by_name(&job).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::scheduler_error_to_response(e),
    }
}
