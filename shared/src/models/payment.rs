//! Payment details model

use crate::gateway::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One-to-one payment record for an order
///
/// Keyed by order id so that repeated webhook delivery for the same
/// transaction is a no-op update, not a duplicate insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub order_id: String,
    pub method: PaymentMethod,
    pub transaction_id: String,
    /// Free-text detail such as card franchise or bank name
    pub details: String,
    pub updated_at: DateTime<Utc>,
}
