//! Wompi webhook adapter (checksum-based)
//!
//! Wompi signs its event envelopes with a checksum: the values at the
//! property paths listed in `signature.properties` are concatenated in
//! order, the envelope `timestamp` and the merchant's events secret are
//! appended, and the SHA-256 hex digest of the whole string must equal
//! `signature.checksum`.
//!
//! Only `transaction.updated` events carry a payment status; anything
//! else is reported as `UnsupportedEvent` so Wompi gets a 200 and does
//! not retry-storm on events the pipeline does not care about.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use shared::gateway::{ExternalStatus, GatewayError, PaymentEvent, PaymentMethod, Provider};

use super::constant_time_eq;

/// Event name carrying a transaction status change
const TRANSACTION_UPDATED: &str = "transaction.updated";

/// Raw Wompi event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WompiEnvelope {
    pub event: String,
    pub data: Value,
    pub signature: WompiSignature,
    pub timestamp: i64,
    #[serde(default)]
    pub sent_at: Option<String>,
}

/// Signature block of the envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WompiSignature {
    /// Ordered property paths relative to `data`, e.g. `transaction.id`
    pub properties: Vec<String>,
    pub checksum: String,
}

/// Resolve a dotted property path relative to `data`
fn lookup_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Render a JSON value the way Wompi concatenates it (no quotes, no
/// scientific notation for the integer amounts it signs)
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Recompute the checksum over the envelope
fn compute_checksum(envelope: &WompiEnvelope, events_secret: &str) -> Result<String, GatewayError> {
    let mut concat = String::new();
    for path in &envelope.signature.properties {
        let value = lookup_path(&envelope.data, path).ok_or_else(|| {
            GatewayError::MalformedPayload {
                provider: Provider::Wompi,
                reason: format!("signed property missing: {path}"),
            }
        })?;
        concat.push_str(&render_value(value));
    }
    concat.push_str(&envelope.timestamp.to_string());
    concat.push_str(events_secret);

    let digest = Sha256::digest(concat.as_bytes());
    Ok(hex::encode(digest))
}

/// Map Wompi's transaction status into the internal status table.
/// Unknown codes become Pending, never Paid or Cancelled.
fn map_status(status: &str) -> ExternalStatus {
    match status {
        "APPROVED" => ExternalStatus::Paid,
        "DECLINED" | "ERROR" | "VOIDED" => ExternalStatus::Cancelled,
        _ => ExternalStatus::Pending,
    }
}

fn map_method(payment_method_type: Option<&str>) -> PaymentMethod {
    match payment_method_type {
        Some("CARD") => PaymentMethod::WompiCard,
        Some("PSE") => PaymentMethod::Pse,
        Some("BANCOLOMBIA_TRANSFER") => PaymentMethod::BankTransfer,
        _ => PaymentMethod::Other,
    }
}

fn require_str<'a>(transaction: &'a Value, field: &str) -> Result<&'a str, GatewayError> {
    transaction
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::MalformedPayload {
            provider: Provider::Wompi,
            reason: format!("transaction.{field} missing"),
        })
}

/// Verify the envelope checksum and normalize into a [`PaymentEvent`]
pub fn verify_and_normalize(
    envelope: &WompiEnvelope,
    events_secret: &str,
) -> Result<PaymentEvent, GatewayError> {
    if envelope.event != TRANSACTION_UPDATED {
        return Err(GatewayError::UnsupportedEvent {
            provider: Provider::Wompi,
            event: envelope.event.clone(),
        });
    }

    let expected = compute_checksum(envelope, events_secret)?;
    let supplied = envelope.signature.checksum.to_lowercase();
    if !constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
        return Err(GatewayError::InvalidSignature(Provider::Wompi));
    }

    let transaction =
        envelope
            .data
            .get("transaction")
            .ok_or_else(|| GatewayError::MalformedPayload {
                provider: Provider::Wompi,
                reason: "data.transaction missing".to_string(),
            })?;

    let amount_cents = transaction
        .get("amount_in_cents")
        .and_then(Value::as_i64)
        .ok_or_else(|| GatewayError::MalformedPayload {
            provider: Provider::Wompi,
            reason: "transaction.amount_in_cents missing".to_string(),
        })?;

    Ok(PaymentEvent {
        provider: Provider::Wompi,
        order_reference: require_str(transaction, "reference")?.to_string(),
        transaction_id: require_str(transaction, "id")?.to_string(),
        external_status: map_status(require_str(transaction, "status")?),
        amount_cents,
        payment_method: map_method(
            transaction
                .get("payment_method_type")
                .and_then(Value::as_str),
        ),
        raw_meta: transaction.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test_events_secret";

    fn envelope(status: &str) -> WompiEnvelope {
        let mut env = WompiEnvelope {
            event: TRANSACTION_UPDATED.to_string(),
            data: json!({
                "transaction": {
                    "id": "1234-5678",
                    "status": status,
                    "amount_in_cents": 4_500_000,
                    "reference": "ORD-000042",
                    "payment_method_type": "CARD",
                }
            }),
            signature: WompiSignature {
                properties: vec![
                    "transaction.id".to_string(),
                    "transaction.status".to_string(),
                    "transaction.amount_in_cents".to_string(),
                ],
                checksum: String::new(),
            },
            timestamp: 1_700_000_000,
            sent_at: None,
        };
        env.signature.checksum = compute_checksum(&env, SECRET).unwrap();
        env
    }

    #[test]
    fn valid_checksum_normalizes() {
        let event = verify_and_normalize(&envelope("APPROVED"), SECRET).unwrap();
        assert_eq!(event.external_status, ExternalStatus::Paid);
        assert_eq!(event.order_reference, "ORD-000042");
        assert_eq!(event.transaction_id, "1234-5678");
        assert_eq!(event.amount_cents, 4_500_000);
        assert_eq!(event.payment_method, PaymentMethod::WompiCard);
    }

    #[test]
    fn uppercase_checksum_accepted() {
        let mut env = envelope("APPROVED");
        env.signature.checksum = env.signature.checksum.to_uppercase();
        assert!(verify_and_normalize(&env, SECRET).is_ok());
    }

    #[test]
    fn tampered_signed_field_is_rejected() {
        let mut env = envelope("DECLINED");
        env.data["transaction"]["status"] = json!("APPROVED");
        let err = verify_and_normalize(&env, SECRET).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature(Provider::Wompi)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let err = verify_and_normalize(&envelope("APPROVED"), "other_secret").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature(Provider::Wompi)));
    }

    #[test]
    fn unknown_event_is_soft_failure() {
        let mut env = envelope("APPROVED");
        env.event = "nequi_token.updated".to_string();
        let err = verify_and_normalize(&env, SECRET).unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedEvent { .. }));
    }

    #[test]
    fn unknown_status_maps_to_pending() {
        let event = verify_and_normalize(&envelope("WEIRD_NEW_STATE"), SECRET).unwrap();
        assert_eq!(event.external_status, ExternalStatus::Pending);
    }

    #[test]
    fn missing_signed_property_is_malformed() {
        let mut env = envelope("APPROVED");
        env.signature
            .properties
            .push("transaction.does_not_exist".to_string());
        let err = verify_and_normalize(&env, SECRET).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedPayload { .. }));
    }
}
