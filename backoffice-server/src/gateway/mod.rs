//! Webhook dispatcher & signature verifiers
//!
//! One adapter per payment provider. Each adapter parses its raw payload
//! into a typed shape at the boundary, verifies authenticity with the
//! provider's own scheme, and normalizes the result into a
//! [`shared::gateway::PaymentEvent`]. Everything downstream of this
//! module is provider-agnostic.

pub mod payu;
pub mod wompi;

pub use payu::PayuConfirmation;
pub use wompi::WompiEnvelope;

use shared::gateway::{GatewayError, PaymentEvent};

/// Provider credentials, injected at construction. Verification logic
/// never reads the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Wompi events secret used for the checksum
    pub wompi_events_secret: String,
    /// PayU API key used for the confirmation signature
    pub payu_api_key: String,
    /// PayU merchant id (part of the signed string)
    pub payu_merchant_id: String,
}

/// Webhook dispatcher holding the per-provider verifiers
#[derive(Clone)]
pub struct WebhookDispatcher {
    config: GatewayConfig,
}

impl WebhookDispatcher {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Verify and normalize a Wompi event envelope
    pub fn dispatch_wompi(&self, envelope: &WompiEnvelope) -> Result<PaymentEvent, GatewayError> {
        wompi::verify_and_normalize(envelope, &self.config.wompi_events_secret)
    }

    /// Verify and normalize a PayU confirmation
    pub fn dispatch_payu(
        &self,
        confirmation: &PayuConfirmation,
    ) -> Result<PaymentEvent, GatewayError> {
        payu::verify_and_normalize(
            confirmation,
            &self.config.payu_api_key,
            &self.config.payu_merchant_id,
        )
    }
}

/// Constant-time byte comparison for hex digests.
///
/// Not strictly required by either gateway, but it closes the timing
/// side channel at no cost.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc123", b"abc123"));
        assert!(!constant_time_eq(b"abc123", b"abc124"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
