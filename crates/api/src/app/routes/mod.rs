use axum::Router;

pub mod scheduler;
pub mod system;
pub mod work_orders;

/// Router for every non-health endpoint.
pub fn router() -> Router {
    Router::new()
        .merge(work_orders::router())
        .merge(scheduler::router())
}
