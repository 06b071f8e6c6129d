//! Product model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ABC inventory classification by cumulative profit contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbcClass {
    A,
    B,
    C,
}

/// Product entity
///
/// `stock` is exclusively mutated by the inventory ledger; order logic
/// never writes it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub sku: String,
    /// Current stock counter; must equal the sum of ledger movements
    pub stock: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Acquisition cost used for the financial snapshot
    #[serde(with = "rust_decimal::serde::float")]
    pub acq_price: Decimal,
    /// Packaging size string, e.g. `"M_LIGHT"` (dimension + weight class)
    pub size: String,
    pub classification: AbcClass,
}
