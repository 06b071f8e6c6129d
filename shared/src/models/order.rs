//! Order model and status state machine types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order lifecycle status
///
/// ```text
/// Created ──> Pending ──> Paid ──> Sent
///    │           │          │
///    └───────────┴──────────┴────> Cancelled
/// ```
///
/// `Sent` and `Cancelled` are terminal. There is intentionally no
/// re-activation path out of `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Pending,
    Paid,
    Sent,
    Cancelled,
}

impl OrderStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Sent => "SENT",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// Customer and delivery address snapshot captured at checkout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Normalized phone (digits only, no country prefix separators)
    pub phone: String,
    pub address: String,
    pub city: String,
    /// Carrier locality code (DANE-style)
    pub locality_code: String,
}

/// One line item of an order
///
/// `product_id` is `None` for manually entered line items. Items become
/// immutable once the parent order is paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Option<String>,
    pub quantity: i64,
    /// Unit price captured at checkout
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub sku: Option<String>,
    pub name: String,
}

/// Historical financial snapshot, computed exactly once at the PAID
/// transition and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_product_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub gateway_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub net_profit: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit_margin_pct: Decimal,
    pub paid_at: DateTime<Utc>,
}

/// Order entity, owned by the order pipeline
///
/// Mutated only through state transitions; never written directly by
/// webhook handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Monotonic order number (crash-safe counter)
    pub order_number: u64,
    /// External reference sent to gateways (e.g. `ORD-000042`)
    pub reference: String,
    pub status: OrderStatus,
    pub customer: CustomerSnapshot,
    pub items: Vec<OrderItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub financials: Option<FinancialSnapshot>,
    /// Last pipeline error captured for admin intervention
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build the external reference code for a given order number
    pub fn reference_for(order_number: u64) -> String {
        format!("ORD-{order_number:06}")
    }
}
