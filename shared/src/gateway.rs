//! Normalized payment gateway event
//!
//! Every provider adapter parses its own payload shape at the boundary and
//! produces a [`PaymentEvent`]; all downstream code (the order pipeline,
//! the ledger, the reconciler) only ever sees this one shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Order status reported by a gateway, mapped through the provider-specific
/// lookup table. Unknown or unmapped codes always become [`Pending`], never
/// silently `Paid` or `Cancelled`.
///
/// [`Pending`]: ExternalStatus::Pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalStatus {
    Paid,
    Cancelled,
    Pending,
}

/// Payment method reported by a gateway, used by the fee schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    WompiCard,
    PayuCard,
    Pse,
    BankTransfer,
    Cash,
    CashOnDelivery,
    Other,
}

impl PaymentMethod {
    /// Human-readable label used in payment details
    pub fn label(&self) -> &'static str {
        match self {
            Self::WompiCard => "Wompi card",
            Self::PayuCard => "PayU card",
            Self::Pse => "PSE",
            Self::BankTransfer => "Bank transfer",
            Self::Cash => "Cash",
            Self::CashOnDelivery => "Cash on delivery",
            Self::Other => "Other",
        }
    }
}

/// Normalized payment event produced by a provider adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider identity that produced this event
    pub provider: Provider,
    /// Gateway's reference for the order (our order reference code)
    pub order_reference: String,
    /// Gateway transaction id
    pub transaction_id: String,
    /// Mapped order status
    pub external_status: ExternalStatus,
    /// Paid amount in cents
    pub amount_cents: i64,
    /// Payment method as mapped by the adapter
    pub payment_method: PaymentMethod,
    /// Raw provider payload fragment kept for audit/debugging
    pub raw_meta: Value,
}

/// Supported payment gateway providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Wompi,
    Payu,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wompi => write!(f, "wompi"),
            Self::Payu => write!(f, "payu"),
        }
    }
}

/// Errors produced while verifying and normalizing a webhook payload
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Signature/checksum did not match (hard failure, gateway should alert)
    #[error("invalid signature for {0} webhook")]
    InvalidSignature(Provider),

    /// Payload could not be parsed into the provider's shape
    #[error("malformed {provider} payload: {reason}")]
    MalformedPayload { provider: Provider, reason: String },

    /// Event type the pipeline does not care about (soft, acked with 200)
    #[error("unsupported {provider} event: {event}")]
    UnsupportedEvent { provider: Provider, event: String },
}
