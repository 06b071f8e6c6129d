//! Webhook handlers
//!
//! Verification happens first, in the dispatcher. Only a verified,
//! normalized event reaches the pipeline, and the pipeline runs on the
//! blocking pool because redb commits are synchronous.

use axum::extract::{Form, Json, State};
use serde::Serialize;

use crate::core::ServerState;
use crate::gateway::{PayuConfirmation, WompiEnvelope};
use crate::orders::{PipelineError, PipelineOutcome};
use shared::gateway::{GatewayError, PaymentEvent};
use shared::{ApiResponse, AppError, AppResult, ErrorCode};

/// Acknowledgement body returned to the gateway
#[derive(Serialize)]
pub struct WebhookAck {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
}

/// POST /api/webhooks/wompi
pub async fn wompi(
    State(state): State<ServerState>,
    Json(envelope): Json<WompiEnvelope>,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let event = state
        .dispatcher
        .dispatch_wompi(&envelope)
        .map_err(gateway_error)?;
    apply(state, event).await
}

/// POST /api/webhooks/payu
pub async fn payu(
    State(state): State<ServerState>,
    Form(confirmation): Form<PayuConfirmation>,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let event = state
        .dispatcher
        .dispatch_payu(&confirmation)
        .map_err(gateway_error)?;
    apply(state, event).await
}

async fn apply(
    state: ServerState,
    event: PaymentEvent,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    tracing::info!(
        provider = %event.provider,
        reference = %event.order_reference,
        status = ?event.external_status,
        "webhook event verified"
    );

    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.apply_payment_event(&event))
        .await
        .map_err(|e| AppError::internal(e.to_string()))?
        .map_err(pipeline_error)?;

    let ack = match outcome {
        PipelineOutcome::Transitioned { order_id, .. } => WebhookAck {
            outcome: "applied",
            order_id: Some(order_id),
        },
        PipelineOutcome::AlreadyPaid { order_id } => WebhookAck {
            outcome: "duplicate",
            order_id: Some(order_id),
        },
        PipelineOutcome::AlreadyCancelled { order_id } => WebhookAck {
            outcome: "duplicate",
            order_id: Some(order_id),
        },
        PipelineOutcome::NoChange { order_id } => WebhookAck {
            outcome: "no_change",
            order_id: Some(order_id),
        },
    };
    Ok(Json(ApiResponse::success(ack)))
}

fn gateway_error(err: GatewayError) -> AppError {
    match err {
        GatewayError::InvalidSignature(provider) => {
            tracing::warn!(provider = %provider, "webhook signature rejected");
            AppError::new(ErrorCode::InvalidSignature).with_detail("provider", provider.to_string())
        }
        GatewayError::MalformedPayload { provider, reason } => {
            AppError::with_message(ErrorCode::MalformedPayload, reason)
                .with_detail("provider", provider.to_string())
        }
        GatewayError::UnsupportedEvent { provider, event } => {
            // Soft ack: 200 with an error code in the body
            AppError::new(ErrorCode::UnsupportedEvent)
                .with_detail("provider", provider.to_string())
                .with_detail("event", event)
        }
    }
}

fn pipeline_error(err: PipelineError) -> AppError {
    match err {
        // Soft ack: the reference may belong to a purged or foreign order
        PipelineError::OrderNotFound(reference) => {
            AppError::new(ErrorCode::OrderNotFound).with_detail("reference", reference)
        }
        PipelineError::InvalidTransition { order_id, from, to } => {
            AppError::new(ErrorCode::InvalidTransition)
                .with_detail("order_id", order_id)
                .with_detail("from", from.to_string())
                .with_detail("to", to.to_string())
        }
        PipelineError::StockExhausted(product) => {
            AppError::new(ErrorCode::StockExhausted).with_detail("product", product)
        }
        PipelineError::Ledger(e) => AppError::storage(e.to_string()),
        PipelineError::Storage(e) => AppError::storage(e.to_string()),
    }
}
