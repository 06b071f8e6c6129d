//! Order API handlers

use axum::extract::{Path, State};

use crate::core::ServerState;
use crate::shipping::ShippingError;
use shared::models::{Order, Shipping};
use shared::{ApiResponse, AppError, AppResult, ErrorCode, Json};

/// GET /api/orders
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<ApiResponse<Vec<Order>>>> {
    let orders = state
        .store
        .get_all_orders()
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(Json(ApiResponse::success(orders)))
}

/// GET /api/orders/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state
        .store
        .get_order(&id)
        .map_err(|e| AppError::storage(e.to_string()))?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id))?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/orders/:id/shipping-guide
pub async fn create_shipping_guide(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Shipping>>> {
    let shipping = match state.orchestrator.create_guide(&id).await {
        Ok(shipping) => shipping,
        // Idempotent retry: the existing guide is the useful answer
        Err(ShippingError::AlreadyCreated(existing)) => *existing,
        Err(err) => return Err(shipping_error(err)),
    };
    Ok(Json(ApiResponse::success(shipping)))
}

fn shipping_error(err: ShippingError) -> AppError {
    match err {
        ShippingError::OrderNotFound(id) => {
            AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id)
        }
        ShippingError::NotPaid(id) => {
            AppError::new(ErrorCode::OrderNotPaid).with_detail("order_id", id)
        }
        ShippingError::NotQuoted(id) => {
            AppError::new(ErrorCode::ShippingNotQuoted).with_detail("order_id", id)
        }
        ShippingError::AlreadyCreated(existing) => {
            AppError::new(ErrorCode::GuideAlreadyCreated).with_detail("order_id", existing.order_id)
        }
        ShippingError::CarrierTransport(reason) => {
            AppError::with_message(ErrorCode::CarrierTransport, reason)
        }
        ShippingError::Storage(e) => AppError::storage(e.to_string()),
    }
}
