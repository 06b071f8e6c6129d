//! Product API handlers

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::ServerState;
use crate::ledger::{LedgerError, MovementRequest};
use shared::models::{InventoryMovement, LedgerAudit, MovementType, Product};
use shared::{ApiResponse, AppError, AppResult, ErrorCode, Json};

/// GET /api/products/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let product = state
        .store
        .get_product(&id)
        .map_err(|e| AppError::storage(e.to_string()))?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", id))?;
    Ok(Json(ApiResponse::success(product)))
}

/// GET /api/products/:id/movements
pub async fn movements(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<InventoryMovement>>>> {
    // Existence check first so an unknown id is not an empty history
    state
        .store
        .get_product(&id)
        .map_err(|e| AppError::storage(e.to_string()))?
        .ok_or_else(|| {
            AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", id.clone())
        })?;

    let movements = state
        .store
        .get_movements(&id)
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(Json(ApiResponse::success(movements)))
}

/// GET /api/products/:id/audit
pub async fn audit(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<LedgerAudit>>> {
    let audit = state
        .pipeline
        .ledger()
        .audit_product(&id)
        .map_err(ledger_error)?;
    Ok(Json(ApiResponse::success(audit)))
}

/// One line of a restock intake
#[derive(Debug, Deserialize)]
pub struct RestockLine {
    pub product_id: String,
    /// Units received, must be positive
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub items: Vec<RestockLine>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestockFailure {
    pub product_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RestockReport {
    /// Intake reference stamped on every movement of this batch
    pub reference_id: String,
    pub applied: Vec<InventoryMovement>,
    pub failed: Vec<RestockFailure>,
}

/// POST /api/products/restock
///
/// Resilient semantics: one bad line (unknown product) is reported in
/// the response, the remaining lines still commit.
pub async fn restock(
    State(state): State<ServerState>,
    Json(request): Json<RestockRequest>,
) -> AppResult<Json<ApiResponse<RestockReport>>> {
    if request.items.is_empty() {
        return Err(AppError::validation("restock batch is empty"));
    }
    if let Some(bad) = request.items.iter().find(|l| l.quantity <= 0) {
        return Err(
            AppError::validation("restock quantity must be positive")
                .with_detail("product_id", bad.product_id.clone()),
        );
    }

    let reference_id = format!("restock-{}", Uuid::new_v4());
    let created_by = request
        .created_by
        .unwrap_or_else(|| "admin".to_string());
    let requests: Vec<MovementRequest> = request
        .items
        .iter()
        .map(|line| MovementRequest {
            product_id: line.product_id.clone(),
            quantity: line.quantity,
            movement_type: MovementType::RestockReceived,
            reference_id: reference_id.clone(),
            created_by: created_by.clone(),
        })
        .collect();

    let pipeline = state.pipeline.clone();
    let report =
        tokio::task::spawn_blocking(move || pipeline.ledger().apply_batch_resilient(requests))
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;

    let report = RestockReport {
        reference_id,
        applied: report.applied,
        failed: report
            .failed
            .into_iter()
            .map(|f| RestockFailure {
                product_id: f.request.product_id,
                error: f.error.to_string(),
            })
            .collect(),
    };
    Ok(Json(ApiResponse::success(report)))
}

fn ledger_error(err: LedgerError) -> AppError {
    match err {
        LedgerError::ProductNotFound(id) => {
            AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", id)
        }
        other => AppError::storage(other.to_string()),
    }
}
