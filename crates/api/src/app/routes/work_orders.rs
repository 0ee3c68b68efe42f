//! Work-order inventory endpoints: thin adapters over [`InventoryLedger`].
//!
//! [`InventoryLedger`]: rentdesk_infra::ledger::InventoryLedger

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};

use rentdesk_core::{InventoryItemId, UsageId, WorkOrderId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route(
            "/work-orders/:id/inventory",
            get(list_inventory).post(allocate),
        )
        .route(
            "/work-order-inventory/:usage_id",
            put(resize).delete(release),
        )
}

pub async fn list_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let work_order_id: WorkOrderId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.ledger.list_by_work_order(work_order_id).await {
        Ok(lines) => (
            StatusCode::OK,
            Json(dto::WorkOrderInventoryResponse::new(work_order_id, lines)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::AllocateRequest>, JsonRejection>,
) -> axum::response::Response {
    let work_order_id: WorkOrderId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::invalid_body(rejection),
    };

    match services
        .ledger
        .allocate(
            work_order_id,
            InventoryItemId::new(body.inventory_id),
            body.quantity,
        )
        .await
    {
        Ok(usage) => (StatusCode::CREATED, Json(usage)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn resize(
    Extension(services): Extension<Arc<AppServices>>,
    Path(usage_id): Path<String>,
    body: Result<Json<dto::ResizeRequest>, JsonRejection>,
) -> axum::response::Response {
    let usage_id: UsageId = match usage_id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::invalid_body(rejection),
    };

    match services.ledger.resize(usage_id, body.quantity).await {
        Ok(usage) => (StatusCode::OK, Json(usage)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn release(
    Extension(services): Extension<Arc<AppServices>>,
    Path(usage_id): Path<String>,
) -> axum::response::Response {
    let usage_id: UsageId = match usage_id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.ledger.release(usage_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
