//! redb-based storage layer for the reconciliation pipeline
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Order rows |
//! | `order_refs` | `reference` | `order_id` | Gateway reference index |
//! | `products` | `product_id` | `Product` | Stock counters |
//! | `movements` | `(product_id, seq)` | `InventoryMovement` | Append-only ledger |
//! | `payments` | `order_id` | `PaymentDetails` | Upsert-by-order-id |
//! | `shipping` | `order_id` | `Shipping` | Guide artifacts |
//! | `coupons` | `code` | `Coupon` | Usage counters |
//! | `counters` | `&str` | `u64` | Order number + movement sequence |
//!
//! # Durability & serialization
//!
//! redb commits are durable as soon as `commit()` returns and the database
//! allows a single writer at a time. Wrapping a whole status transition
//! (order row, ledger movements, coupon, financial snapshot) in one write
//! transaction therefore serializes concurrent webhooks for the same order
//! at the storage layer, with no in-process locking.

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use shared::models::{Coupon, InventoryMovement, Order, PaymentDetails, Product, Shipping};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Order rows: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Gateway reference index: key = reference code, value = order_id
const ORDER_REFS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("order_refs");

/// Product rows: key = product_id, value = JSON-serialized Product
const PRODUCTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("products");

/// Append-only ledger: key = (product_id, movement seq), value = JSON movement
const MOVEMENTS_TABLE: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("movements");

/// Payment details: key = order_id, value = JSON-serialized PaymentDetails
const PAYMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("payments");

/// Shipping rows: key = order_id, value = JSON-serialized Shipping
const SHIPPING_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("shipping");

/// Coupon rows: key = coupon code, value = JSON-serialized Coupon
const COUPONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("coupons");

/// Crash-safe counters: order number and global movement sequence
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const ORDER_NUMBER_KEY: &str = "order_number";
const MOVEMENT_SEQ_KEY: &str = "movement_seq";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

fn init_tables(db: &Database) -> StorageResult<()> {
    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(ORDERS_TABLE)?;
        let _ = write_txn.open_table(ORDER_REFS_TABLE)?;
        let _ = write_txn.open_table(PRODUCTS_TABLE)?;
        let _ = write_txn.open_table(MOVEMENTS_TABLE)?;
        let _ = write_txn.open_table(PAYMENTS_TABLE)?;
        let _ = write_txn.open_table(SHIPPING_TABLE)?;
        let _ = write_txn.open_table(COUPONS_TABLE)?;

        let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
        if counters.get(ORDER_NUMBER_KEY)?.is_none() {
            counters.insert(ORDER_NUMBER_KEY, 0u64)?;
        }
        if counters.get(MOVEMENT_SEQ_KEY)?.is_none() {
            counters.insert(MOVEMENT_SEQ_KEY, 0u64)?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

/// Pipeline storage backed by redb
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        init_tables(&db)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        init_tables(&db)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Counters ==========

    /// Get and increment the order number atomically (own transaction)
    pub fn next_order_number(&self) -> StorageResult<u64> {
        let txn = self.db.begin_write()?;
        let next = {
            let mut table = txn.open_table(COUNTERS_TABLE)?;
            let current = table.get(ORDER_NUMBER_KEY)?.map(|g| g.value()).unwrap_or(0);
            let next = current + 1;
            table.insert(ORDER_NUMBER_KEY, next)?;
            next
        };
        txn.commit()?;
        Ok(next)
    }

    /// Increment and return the global movement sequence (within transaction)
    pub fn next_movement_seq(&self, txn: &WriteTransaction) -> StorageResult<u64> {
        let mut table = txn.open_table(COUNTERS_TABLE)?;
        let current = table.get(MOVEMENT_SEQ_KEY)?.map(|g| g.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(MOVEMENT_SEQ_KEY, next)?;
        Ok(next)
    }

    // ========== Orders ==========

    /// Store an order and maintain the reference index (within transaction)
    pub fn put_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let mut table = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(order)?;
        table.insert(order.id.as_str(), value.as_slice())?;
        drop(table);

        let mut refs = txn.open_table(ORDER_REFS_TABLE)?;
        refs.insert(order.reference.as_str(), order.id.as_str())?;
        Ok(())
    }

    /// Get an order by id (read-only)
    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order by id (within transaction)
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a gateway reference to an order (within transaction)
    ///
    /// Tries the reference index first, then falls back to a direct id
    /// lookup so older gateways configured with raw order ids keep working.
    pub fn find_order_by_reference_txn(
        &self,
        txn: &WriteTransaction,
        reference: &str,
    ) -> StorageResult<Option<Order>> {
        let refs = txn.open_table(ORDER_REFS_TABLE)?;
        let order_id = refs.get(reference)?.map(|g| g.value().to_string());
        drop(refs);

        match order_id {
            Some(id) => self.get_order_txn(txn, &id),
            None => self.get_order_txn(txn, reference),
        }
    }

    /// List all orders (read-only, admin views)
    pub fn get_all_orders(&self) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        let mut orders = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            orders.push(serde_json::from_slice(value.value())?);
        }
        Ok(orders)
    }

    // ========== Products ==========

    /// Store a product (within transaction)
    pub fn put_product(&self, txn: &WriteTransaction, product: &Product) -> StorageResult<()> {
        let mut table = txn.open_table(PRODUCTS_TABLE)?;
        let value = serde_json::to_vec(product)?;
        table.insert(product.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get a product by id (read-only)
    pub fn get_product(&self, product_id: &str) -> StorageResult<Option<Product>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS_TABLE)?;
        match table.get(product_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a product by id (within transaction)
    pub fn get_product_txn(
        &self,
        txn: &WriteTransaction,
        product_id: &str,
    ) -> StorageResult<Option<Product>> {
        let table = txn.open_table(PRODUCTS_TABLE)?;
        match table.get(product_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // ========== Inventory movements (append-only) ==========

    /// Append a movement row (within transaction). There is deliberately
    /// no update or delete counterpart.
    pub fn append_movement(
        &self,
        txn: &WriteTransaction,
        movement: &InventoryMovement,
    ) -> StorageResult<()> {
        let seq = self.next_movement_seq(txn)?;
        let mut table = txn.open_table(MOVEMENTS_TABLE)?;
        let key = (movement.product_id.as_str(), seq);
        let value = serde_json::to_vec(movement)?;
        table.insert(key, value.as_slice())?;
        Ok(())
    }

    /// All movements for a product, in append order (read-only)
    pub fn get_movements(&self, product_id: &str) -> StorageResult<Vec<InventoryMovement>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MOVEMENTS_TABLE)?;

        let mut movements = Vec::new();
        let range_start = (product_id, 0u64);
        let range_end = (product_id, u64::MAX);
        for result in table.range(range_start..=range_end)? {
            let (_key, value) = result?;
            movements.push(serde_json::from_slice(value.value())?);
        }
        Ok(movements)
    }

    /// Most recent movements across all products, newest first (read-only)
    pub fn get_recent_movements(&self, limit: usize) -> StorageResult<Vec<InventoryMovement>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MOVEMENTS_TABLE)?;

        let mut movements: Vec<InventoryMovement> = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            movements.push(serde_json::from_slice(value.value())?);
        }
        movements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        movements.truncate(limit);
        Ok(movements)
    }

    // ========== Payment details ==========

    /// Upsert payment details keyed by order id (within transaction)
    pub fn put_payment(
        &self,
        txn: &WriteTransaction,
        payment: &PaymentDetails,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(PAYMENTS_TABLE)?;
        let value = serde_json::to_vec(payment)?;
        table.insert(payment.order_id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get payment details for an order (read-only)
    pub fn get_payment(&self, order_id: &str) -> StorageResult<Option<PaymentDetails>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PAYMENTS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // ========== Shipping ==========

    /// Upsert the shipping row for an order (within transaction)
    pub fn put_shipping(&self, txn: &WriteTransaction, shipping: &Shipping) -> StorageResult<()> {
        let mut table = txn.open_table(SHIPPING_TABLE)?;
        let value = serde_json::to_vec(shipping)?;
        table.insert(shipping.order_id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get the shipping row for an order (read-only)
    pub fn get_shipping(&self, order_id: &str) -> StorageResult<Option<Shipping>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHIPPING_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get the shipping row for an order (within transaction)
    pub fn get_shipping_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Shipping>> {
        let table = txn.open_table(SHIPPING_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // ========== Coupons ==========

    /// Store a coupon (within transaction)
    pub fn put_coupon(&self, txn: &WriteTransaction, coupon: &Coupon) -> StorageResult<()> {
        let mut table = txn.open_table(COUPONS_TABLE)?;
        let value = serde_json::to_vec(coupon)?;
        table.insert(coupon.code.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get a coupon by code (read-only)
    pub fn get_coupon(&self, code: &str) -> StorageResult<Option<Coupon>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COUPONS_TABLE)?;
        match table.get(code)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a coupon by code (within transaction)
    pub fn get_coupon_txn(
        &self,
        txn: &WriteTransaction,
        code: &str,
    ) -> StorageResult<Option<Coupon>> {
        let table = txn.open_table(COUPONS_TABLE)?;
        match table.get(code)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use shared::models::{CustomerSnapshot, OrderStatus};

    fn test_order(id: &str, number: u64) -> Order {
        Order {
            id: id.to_string(),
            order_number: number,
            reference: Order::reference_for(number),
            status: OrderStatus::Pending,
            customer: CustomerSnapshot::default(),
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            coupon_code: None,
            financials: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn order_number_is_monotonic() {
        let store = Store::open_in_memory().unwrap();
        let a = store.next_order_number().unwrap();
        let b = store.next_order_number().unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn order_resolvable_by_reference_and_id() {
        let store = Store::open_in_memory().unwrap();
        let order = test_order("o-1", 7);

        let txn = store.begin_write().unwrap();
        store.put_order(&txn, &order).unwrap();
        txn.commit().unwrap();

        let txn = store.begin_write().unwrap();
        let by_ref = store
            .find_order_by_reference_txn(&txn, "ORD-000007")
            .unwrap();
        assert_eq!(by_ref.unwrap().id, "o-1");
        let by_id = store.find_order_by_reference_txn(&txn, "o-1").unwrap();
        assert_eq!(by_id.unwrap().order_number, 7);
        let missing = store.find_order_by_reference_txn(&txn, "nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn committed_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backoffice.redb");

        {
            let store = Store::open(&path).unwrap();
            let txn = store.begin_write().unwrap();
            store.put_order(&txn, &test_order("o-9", 9)).unwrap();
            txn.commit().unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.get_order("o-9").unwrap().unwrap().order_number, 9);
    }

    #[test]
    fn dropped_transaction_discards_writes() {
        let store = Store::open_in_memory().unwrap();
        let order = test_order("o-2", 1);

        let txn = store.begin_write().unwrap();
        store.put_order(&txn, &order).unwrap();
        drop(txn); // no commit

        assert!(store.get_order("o-2").unwrap().is_none());
    }
}
