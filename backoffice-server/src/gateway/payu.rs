//! PayU confirmation adapter (reference-signature based)
//!
//! PayU posts a form-encoded confirmation page whose `sign` field is the
//! hex digest of `api_key~merchant_id~reference_sale~new_value~currency~state_pol`
//! (merchant configured for the SHA-256 signature algorithm).
//!
//! `new_value` is NOT the raw `value` field: PayU reformats the amount
//! before signing: one decimal place when the second decimal digit is
//! zero (`150.00` → `150.0`), two otherwise (`150.26` → `150.26`).
//! Getting this reformat wrong is the #1 source of false signature
//! failures, so it is reimplemented here exactly as documented.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use shared::gateway::{ExternalStatus, GatewayError, PaymentEvent, PaymentMethod, Provider};
use std::str::FromStr;

use super::constant_time_eq;

/// PayU transactional state codes (`state_pol`)
const STATE_APPROVED: &str = "4";
const STATE_EXPIRED: &str = "5";
const STATE_DECLINED: &str = "6";
const STATE_PENDING: &str = "7";

/// Raw form-encoded confirmation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayuConfirmation {
    pub merchant_id: String,
    pub state_pol: String,
    /// Our order reference
    pub reference_sale: String,
    /// PayU's transaction reference
    pub reference_pol: String,
    /// Gross amount as sent by PayU, e.g. `"150000.00"`
    pub value: String,
    pub currency: String,
    pub sign: String,
    #[serde(default)]
    pub payment_method_type: Option<String>,
    #[serde(default)]
    pub payment_method_name: Option<String>,
    #[serde(default)]
    pub response_message_pol: Option<String>,
}

fn malformed(reason: impl Into<String>) -> GatewayError {
    GatewayError::MalformedPayload {
        provider: Provider::Payu,
        reason: reason.into(),
    }
}

/// Reformat the amount the way PayU does before signing
pub(crate) fn normalize_amount(value: &str) -> Result<String, GatewayError> {
    let amount =
        Decimal::from_str(value.trim()).map_err(|_| malformed(format!("bad value: {value}")))?;
    let mut rounded = amount.round_dp(2);

    // second decimal digit zero -> one decimal place, else two
    let cents = rounded * Decimal::from(100);
    let one_decimal = (cents % Decimal::from(10)).is_zero();
    rounded.rescale(if one_decimal { 1 } else { 2 });
    Ok(rounded.to_string())
}

/// Recompute the confirmation signature
fn compute_signature(
    confirmation: &PayuConfirmation,
    api_key: &str,
    merchant_id: &str,
) -> Result<String, GatewayError> {
    let new_value = normalize_amount(&confirmation.value)?;
    let joined = format!(
        "{api_key}~{merchant_id}~{reference}~{new_value}~{currency}~{state}",
        reference = confirmation.reference_sale,
        currency = confirmation.currency,
        state = confirmation.state_pol,
    );
    Ok(hex::encode(Sha256::digest(joined.as_bytes())))
}

/// Map `state_pol` into the internal status table. Unknown codes become
/// Pending, never Paid or Cancelled.
fn map_status(state_pol: &str) -> ExternalStatus {
    match state_pol {
        STATE_APPROVED => ExternalStatus::Paid,
        STATE_DECLINED | STATE_EXPIRED => ExternalStatus::Cancelled,
        STATE_PENDING => ExternalStatus::Pending,
        _ => ExternalStatus::Pending,
    }
}

fn map_method(payment_method_type: Option<&str>) -> PaymentMethod {
    match payment_method_type {
        Some("2") => PaymentMethod::PayuCard,
        Some("4") => PaymentMethod::Pse,
        Some("5") => PaymentMethod::BankTransfer,
        Some("7") => PaymentMethod::Cash,
        _ => PaymentMethod::Other,
    }
}

/// Verify the confirmation signature and normalize into a [`PaymentEvent`]
pub fn verify_and_normalize(
    confirmation: &PayuConfirmation,
    api_key: &str,
    merchant_id: &str,
) -> Result<PaymentEvent, GatewayError> {
    if confirmation.merchant_id != merchant_id {
        return Err(malformed(format!(
            "unexpected merchant_id: {}",
            confirmation.merchant_id
        )));
    }

    let expected = compute_signature(confirmation, api_key, merchant_id)?;
    let supplied = confirmation.sign.to_lowercase();
    if !constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
        return Err(GatewayError::InvalidSignature(Provider::Payu));
    }

    let amount = Decimal::from_str(confirmation.value.trim())
        .map_err(|_| malformed(format!("bad value: {}", confirmation.value)))?;
    let amount_cents = (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| malformed(format!("amount out of range: {}", confirmation.value)))?;

    Ok(PaymentEvent {
        provider: Provider::Payu,
        order_reference: confirmation.reference_sale.clone(),
        transaction_id: confirmation.reference_pol.clone(),
        external_status: map_status(&confirmation.state_pol),
        amount_cents,
        payment_method: map_method(confirmation.payment_method_type.as_deref()),
        raw_meta: json!({
            "reference_pol": confirmation.reference_pol,
            "state_pol": confirmation.state_pol,
            "payment_method_name": confirmation.payment_method_name,
            "response_message_pol": confirmation.response_message_pol,
        }),
    })
}
