//! Inventory ledger: append-only movement log + derived stock counter
//!
//! Two write paths with different failure semantics:
//!
//! - **Atomic batch** ([`Ledger::apply_batch_atomic`]): used inside the
//!   PAID transition. The first failing movement aborts the caller's
//!   transaction; no partial decrement ever commits.
//! - **Resilient batch** ([`Ledger::apply_batch_resilient`]): each movement
//!   is its own transaction. A failure on one movement (missing product,
//!   insufficient stock) is captured into the report; the others still
//!   commit. Used for restock intakes and migration backfills where one
//!   bad line item must not sink the whole batch.
//!
//! Every applied movement updates the product stock counter in the same
//! transaction, so `stock == Σ(movement deltas)` holds after every commit.

use crate::storage::{StorageError, Store};
use chrono::Utc;
use redb::WriteTransaction;
use shared::models::{InventoryMovement, LedgerAudit, MovementType, Product};
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock for {product_name}: requested {requested}, available {available}")]
    StockExhausted {
        product_name: String,
        requested: i64,
        available: i64,
    },

    #[error(
        "Movement snapshot mismatch for {product_id}: previous {previous_stock} + delta {quantity} != new {new_stock}"
    )]
    SnapshotMismatch {
        product_id: String,
        previous_stock: i64,
        quantity: i64,
        new_stock: i64,
    },

    #[error(
        "Ledger invariant violated for {product_id}: stored stock {stored} != ledger sum {ledger_sum}"
    )]
    InvariantViolation {
        product_id: String,
        stored: i64,
        ledger_sum: i64,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Request to record one movement; snapshots are filled in-transaction
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub product_id: String,
    /// Signed stock delta
    pub quantity: i64,
    pub movement_type: MovementType,
    pub reference_id: String,
    pub created_by: String,
}

/// One failed movement of a resilient batch, with its cause
#[derive(Debug)]
pub struct FailedMovement {
    pub request: MovementRequest,
    pub error: LedgerError,
}

/// Report of a resilient batch: `applied.len() + failed.len()` always
/// equals the input length.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub applied: Vec<InventoryMovement>,
    pub failed: Vec<FailedMovement>,
}

impl BatchReport {
    pub fn all_applied(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Inventory ledger over the shared [`Store`]
#[derive(Clone)]
pub struct Ledger {
    store: Store,
}

impl Ledger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Build a movement for `request`, reading the product's current stock
    /// inside the caller's transaction.
    pub fn plan_movement(
        &self,
        txn: &WriteTransaction,
        request: &MovementRequest,
    ) -> LedgerResult<(InventoryMovement, Product)> {
        let product = self
            .store
            .get_product_txn(txn, &request.product_id)?
            .ok_or_else(|| LedgerError::ProductNotFound(request.product_id.clone()))?;

        let movement = InventoryMovement {
            product_id: product.id.clone(),
            quantity: request.quantity,
            movement_type: request.movement_type,
            previous_stock: product.stock,
            new_stock: product.stock + request.quantity,
            cost: product.acq_price,
            price: product.price,
            reference_id: request.reference_id.clone(),
            created_by: request.created_by.clone(),
            created_at: Utc::now(),
        };
        Ok((movement, product))
    }

    /// Apply a single movement inside the caller's transaction
    ///
    /// Validates the before/after snapshot, rejects any movement whose
    /// delta would drive the stock counter negative, appends the ledger
    /// row and updates the product stock counter.
    pub fn apply_movement(
        &self,
        txn: &WriteTransaction,
        movement: &InventoryMovement,
    ) -> LedgerResult<()> {
        let mut product = self
            .store
            .get_product_txn(txn, &movement.product_id)?
            .ok_or_else(|| LedgerError::ProductNotFound(movement.product_id.clone()))?;

        if movement.previous_stock + movement.quantity != movement.new_stock
            || movement.previous_stock != product.stock
        {
            return Err(LedgerError::SnapshotMismatch {
                product_id: movement.product_id.clone(),
                previous_stock: movement.previous_stock,
                quantity: movement.quantity,
                new_stock: movement.new_stock,
            });
        }

        // A decrement is any negative delta, whatever its cause: manual
        // adjustments and migrations must respect the floor exactly like
        // order placements. Increments are exempt by construction.
        if movement.quantity < 0 && movement.new_stock < 0 {
            return Err(LedgerError::StockExhausted {
                product_name: product.name.clone(),
                requested: -movement.quantity,
                available: product.stock,
            });
        }

        self.store.append_movement(txn, movement)?;
        product.stock = movement.new_stock;
        self.store.put_product(txn, &product)?;

        tracing::debug!(
            product_id = %movement.product_id,
            delta = movement.quantity,
            new_stock = movement.new_stock,
            movement_type = ?movement.movement_type,
            "ledger movement applied"
        );
        Ok(())
    }

    /// Plan and apply one request inside the caller's transaction
    pub fn record(
        &self,
        txn: &WriteTransaction,
        request: &MovementRequest,
    ) -> LedgerResult<InventoryMovement> {
        let (movement, _product) = self.plan_movement(txn, request)?;
        self.apply_movement(txn, &movement)?;
        Ok(movement)
    }

    /// Apply all requests inside the caller's transaction; the first
    /// failure aborts. The caller drops the transaction on error, so
    /// nothing commits.
    pub fn apply_batch_atomic(
        &self,
        txn: &WriteTransaction,
        requests: &[MovementRequest],
    ) -> LedgerResult<Vec<InventoryMovement>> {
        let mut applied = Vec::with_capacity(requests.len());
        for request in requests {
            applied.push(self.record(txn, request)?);
        }
        Ok(applied)
    }

    /// Apply each request independently; per-movement failures are
    /// captured into the report and do not affect the other movements.
    pub fn apply_batch_resilient(&self, requests: Vec<MovementRequest>) -> BatchReport {
        let mut report = BatchReport::default();

        for request in requests {
            match self.apply_one(&request) {
                Ok(movement) => report.applied.push(movement),
                Err(error) => {
                    tracing::warn!(
                        product_id = %request.product_id,
                        reference_id = %request.reference_id,
                        error = %error,
                        "resilient batch movement failed"
                    );
                    report.failed.push(FailedMovement { request, error });
                }
            }
        }
        report
    }

    fn apply_one(&self, request: &MovementRequest) -> LedgerResult<InventoryMovement> {
        let txn = self.store.begin_write()?;
        let movement = self.record(&txn, request)?;
        txn.commit().map_err(StorageError::from)?;
        Ok(movement)
    }

    // ========== Read-only reconciliation queries ==========

    /// All movements for a product, in append order
    pub fn movements_for_product(
        &self,
        product_id: &str,
    ) -> LedgerResult<Vec<InventoryMovement>> {
        Ok(self.store.get_movements(product_id)?)
    }

    /// Most recent movements across all products, newest first
    pub fn recent_movements(&self, limit: usize) -> LedgerResult<Vec<InventoryMovement>> {
        Ok(self.store.get_recent_movements(limit)?)
    }

    /// Recompute the ledger sum for a product and compare it to the
    /// stored stock counter. A mismatch is reported, never auto-healed.
    pub fn audit_product(&self, product_id: &str) -> LedgerResult<LedgerAudit> {
        let product = self
            .store
            .get_product(product_id)?
            .ok_or_else(|| LedgerError::ProductNotFound(product_id.to_string()))?;
        let movements = self.store.get_movements(product_id)?;
        let ledger_sum: i64 = movements.iter().map(|m| m.quantity).sum();

        let audit = LedgerAudit {
            product_id: product_id.to_string(),
            stored_stock: product.stock,
            ledger_sum,
            movement_count: movements.len(),
        };
        if !audit.is_consistent() {
            tracing::error!(
                product_id = %product_id,
                stored = product.stock,
                ledger_sum,
                "ledger sum invariant violated"
            );
        }
        Ok(audit)
    }

    /// [`Ledger::audit_product`] as a hard check, for callers that must
    /// refuse to proceed on a mismatch.
    pub fn verify_product(&self, product_id: &str) -> LedgerResult<LedgerAudit> {
        let audit = self.audit_product(product_id)?;
        if !audit.is_consistent() {
            return Err(LedgerError::InvariantViolation {
                product_id: audit.product_id.clone(),
                stored: audit.stored_stock,
                ledger_sum: audit.ledger_sum,
            });
        }
        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::AbcClass;

    fn seed_product(store: &Store, id: &str, stock: i64) {
        let product = Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            sku: format!("SKU-{id}"),
            stock: 0,
            price: Decimal::from(25),
            acq_price: Decimal::from(10),
            size: "M_LIGHT".to_string(),
            classification: AbcClass::B,
        };
        let txn = store.begin_write().unwrap();
        store.put_product(&txn, &product).unwrap();
        txn.commit().unwrap();

        if stock != 0 {
            let ledger = Ledger::new(store.clone());
            let txn = store.begin_write().unwrap();
            ledger
                .record(
                    &txn,
                    &MovementRequest {
                        product_id: id.to_string(),
                        quantity: stock,
                        movement_type: MovementType::InitialIntake,
                        reference_id: "intake-1".to_string(),
                        created_by: "test".to_string(),
                    },
                )
                .unwrap();
            txn.commit().unwrap();
        }
    }

    fn request(product_id: &str, quantity: i64, movement_type: MovementType) -> MovementRequest {
        MovementRequest {
            product_id: product_id.to_string(),
            quantity,
            movement_type,
            reference_id: "ref-1".to_string(),
            created_by: "test".to_string(),
        }
    }

    #[test]
    fn movement_updates_stock_and_ledger() {
        let store = Store::open_in_memory().unwrap();
        seed_product(&store, "p1", 10);
        let ledger = Ledger::new(store.clone());

        let txn = store.begin_write().unwrap();
        ledger
            .record(&txn, &request("p1", -3, MovementType::OrderPlaced))
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 7);
        let audit = ledger.verify_product("p1").unwrap();
        assert_eq!(audit.ledger_sum, 7);
        assert_eq!(audit.movement_count, 2);
    }

    #[test]
    fn decrement_below_zero_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        seed_product(&store, "p1", 2);
        let ledger = Ledger::new(store.clone());

        let txn = store.begin_write().unwrap();
        let err = ledger
            .record(&txn, &request("p1", -5, MovementType::OrderPlaced))
            .unwrap_err();
        drop(txn);

        assert!(matches!(err, LedgerError::StockExhausted { available: 2, .. }));
        assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 2);
    }

    #[test]
    fn manual_adjustment_cannot_drive_stock_negative() {
        let store = Store::open_in_memory().unwrap();
        seed_product(&store, "p1", 5);
        let ledger = Ledger::new(store.clone());

        for movement_type in [MovementType::ManualAdjustment, MovementType::InitialMigration] {
            let txn = store.begin_write().unwrap();
            let err = ledger
                .record(&txn, &request("p1", -100, movement_type))
                .unwrap_err();
            drop(txn);
            assert!(matches!(err, LedgerError::StockExhausted { available: 5, .. }));
        }
        assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 5);
    }

    #[test]
    fn cancellation_restock_may_exceed_zero_freely() {
        // OrderCancelled is an increment; it never trips the negative
        // stock guard even when the counter was manually adjusted down.
        let store = Store::open_in_memory().unwrap();
        seed_product(&store, "p1", 0);
        let ledger = Ledger::new(store.clone());

        let txn = store.begin_write().unwrap();
        ledger
            .record(&txn, &request("p1", 4, MovementType::OrderCancelled))
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 4);
    }

    #[test]
    fn stale_snapshot_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        seed_product(&store, "p1", 5);
        let ledger = Ledger::new(store.clone());

        let txn = store.begin_write().unwrap();
        let (mut movement, _) = ledger
            .plan_movement(&txn, &request("p1", -1, MovementType::OrderPlaced))
            .unwrap();
        movement.previous_stock += 1; // stale read
        let err = ledger.apply_movement(&txn, &movement).unwrap_err();
        assert!(matches!(err, LedgerError::SnapshotMismatch { .. }));
    }

    #[test]
    fn resilient_batch_partial_success() {
        let store = Store::open_in_memory().unwrap();
        seed_product(&store, "p1", 10);
        seed_product(&store, "p3", 10);
        let ledger = Ledger::new(store.clone());

        let report = ledger.apply_batch_resilient(vec![
            request("p1", -2, MovementType::OrderPlaced),
            request("p2-missing", -1, MovementType::OrderPlaced),
            request("p3", -4, MovementType::OrderPlaced),
        ]);

        assert_eq!(report.applied.len() + report.failed.len(), 3);
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0].error,
            LedgerError::ProductNotFound(_)
        ));
        assert_eq!(store.get_product("p1").unwrap().unwrap().stock, 8);
        assert_eq!(store.get_product("p3").unwrap().unwrap().stock, 6);
    }

    #[test]
    fn ledger_sum_invariant_over_interleavings() {
        let store = Store::open_in_memory().unwrap();
        seed_product(&store, "p1", 0);
        let ledger = Ledger::new(store.clone());

        let deltas: [(i64, MovementType); 6] = [
            (20, MovementType::InitialIntake),
            (-3, MovementType::OrderPlaced),
            (15, MovementType::RestockReceived),
            (-7, MovementType::OrderPlaced),
            (3, MovementType::OrderCancelled),
            (-2, MovementType::ManualAdjustment),
        ];
        for (delta, movement_type) in deltas {
            let txn = store.begin_write().unwrap();
            ledger.record(&txn, &request("p1", delta, movement_type)).unwrap();
            txn.commit().unwrap();
        }

        let audit = ledger.verify_product("p1").unwrap();
        assert_eq!(audit.stored_stock, 26);
        assert_eq!(audit.ledger_sum, 26);
        assert_eq!(audit.movement_count, 6);
    }

    #[test]
    fn recent_movements_are_newest_first_across_products() {
        let store = Store::open_in_memory().unwrap();
        seed_product(&store, "p1", 10);
        seed_product(&store, "p2", 10);
        let ledger = Ledger::new(store.clone());

        for (product, delta) in [("p1", -1), ("p2", -2), ("p1", -3)] {
            let txn = store.begin_write().unwrap();
            ledger
                .record(&txn, &request(product, delta, MovementType::OrderPlaced))
                .unwrap();
            txn.commit().unwrap();
        }

        let recent = ledger.recent_movements(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].quantity, -3);
        assert_eq!(recent[1].quantity, -2);
    }
}
