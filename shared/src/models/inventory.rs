//! Inventory ledger models
//!
//! A movement is one immutable fact recording a stock quantity change, its
//! cause and the before/after snapshot. Movements are never updated or
//! deleted; for any product the sum of its movement deltas must equal the
//! stored stock counter.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cause of an inventory movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    InitialIntake,
    RestockReceived,
    OrderPlaced,
    OrderCancelled,
    ManualAdjustment,
    InitialMigration,
}

impl MovementType {
    /// Movement types whose item quantities carry a negative sign
    pub fn is_decrement(&self) -> bool {
        matches!(self, Self::OrderPlaced)
    }
}

/// Append-only inventory movement fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub product_id: String,
    /// Signed stock delta
    pub quantity: i64,
    pub movement_type: MovementType,
    pub previous_stock: i64,
    pub new_stock: i64,
    /// Acquisition cost at movement time
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    /// Sale price at movement time
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Order or restock id that caused this movement
    pub reference_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Result of auditing one product against its ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub product_id: String,
    pub stored_stock: i64,
    pub ledger_sum: i64,
    pub movement_count: usize,
}

impl LedgerAudit {
    /// Whether the stored counter matches the ledger sum
    pub fn is_consistent(&self) -> bool {
        self.stored_stock == self.ledger_sum
    }
}
