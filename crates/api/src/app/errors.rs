use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::warn;

use rentdesk_core::DomainError;
use rentdesk_infra::ledger::LedgerError;
use rentdesk_infra::rentals::RentalStoreError;
use rentdesk_infra::scheduler::SchedulerError;

const UNAVAILABLE: &str = "storage temporarily unavailable, retry later";

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::InvalidArgument(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg)
        }
        LedgerError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        err @ LedgerError::InsufficientStock { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock", err.to_string())
        }
        LedgerError::Conflict(detail) => {
            warn!(%detail, "ledger conflict");
            json_error(StatusCode::CONFLICT, "conflict", "request conflicts with current state")
        }
        LedgerError::TransientStoreFailure(detail) => {
            warn!(%detail, "ledger store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", UNAVAILABLE)
        }
    }
}

pub fn scheduler_error_to_response(err: SchedulerError) -> axum::response::Response {
    match err {
        SchedulerError::UnknownJob(name) => {
            json_error(StatusCode::NOT_FOUND, "unknown_job", format!("no job named {name}"))
        }
        SchedulerError::Store(RentalStoreError::Conflict(detail)) => {
            warn!(%detail, "rental store conflict");
            json_error(StatusCode::CONFLICT, "conflict", "request conflicts with current state")
        }
        SchedulerError::Store(RentalStoreError::TransientStoreFailure(detail)) => {
            warn!(%detail, "rental store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", UNAVAILABLE)
        }
    }
}

pub fn invalid_id(err: DomainError) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", err.to_string())
}

pub fn invalid_body(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
