//! Shipping guide orchestrator
//!
//! Creates the carrier guide for a paid order, exactly once per order.
//! Idempotency is enforced on the persisted `external_order_id`: if the
//! shipping row already carries one, the call short-circuits with the
//! existing guide instead of creating a duplicate shipment. Carrier
//! failures leave the shipping row unchanged (apart from the captured
//! error) so the call can be retried later.

pub mod carrier;

pub use carrier::{
    CarrierAddress, CarrierApi, CarrierConfig, CarrierRequest, CarrierResponse, HttpCarrier,
};

use crate::packaging::{self, PackItem};
use crate::storage::{StorageError, Store};
use base64::Engine;
use shared::models::{
    Order, OrderStatus, PackageDimensions, Shipping, ShippingStatus,
};
use std::sync::Arc;
use thiserror::Error;

/// Shipping orchestration errors
#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order {0} is not paid")]
    NotPaid(String),

    #[error("Shipping for order {0} has not been quoted")]
    NotQuoted(String),

    /// Carries the existing shipping row so callers can return the guide
    #[error("Shipping guide already created for order {}", .0.order_id)]
    AlreadyCreated(Box<Shipping>),

    #[error("Carrier transport error: {0}")]
    CarrierTransport(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ShippingResult<T> = Result<T, ShippingError>;

/// Orchestrates carrier guide creation over the shared store
pub struct GuideOrchestrator {
    store: Store,
    carrier: Arc<dyn CarrierApi>,
    origin: CarrierAddress,
}

impl GuideOrchestrator {
    pub fn new(store: Store, carrier: Arc<dyn CarrierApi>, origin: CarrierAddress) -> Self {
        Self {
            store,
            carrier,
            origin,
        }
    }

    /// Create the shipping guide for an order.
    ///
    /// Package dimensions come from the admin's manual container override
    /// when present, otherwise from the package calculator over the
    /// cart's product sizes.
    pub async fn create_guide(&self, order_id: &str) -> ShippingResult<Shipping> {
        let order = self
            .store
            .get_order(order_id)?
            .ok_or_else(|| ShippingError::OrderNotFound(order_id.to_string()))?;

        // Idempotency first: the persisted external order id is the
        // marker. It must win over the status guards, because a prior
        // success already moved the order to SENT and a retry would
        // otherwise bounce off the paid-only check.
        let existing = self.store.get_shipping(order_id)?;
        if let Some(shipping) = &existing {
            if shipping.external_order_id.is_some() {
                return Err(ShippingError::AlreadyCreated(Box::new(shipping.clone())));
            }
        }

        if order.status != OrderStatus::Paid {
            return Err(ShippingError::NotPaid(order_id.to_string()));
        }
        let mut shipping =
            existing.ok_or_else(|| ShippingError::NotQuoted(order_id.to_string()))?;
        if shipping.status != ShippingStatus::Quoted {
            return Err(ShippingError::NotQuoted(order_id.to_string()));
        }

        let package = self.resolve_package(&order, &shipping)?;
        let request = CarrierRequest {
            reference: order.reference.clone(),
            package: package.clone(),
            origin: self.origin.clone(),
            destination: CarrierAddress {
                first_name: order.customer.first_name.clone(),
                last_name: order.customer.last_name.clone(),
                phone: order.customer.phone.clone(),
                address: order.customer.address.clone(),
                city: order.customer.city.clone(),
                locality_code: order.customer.locality_code.clone(),
            },
            declared_value: order.total,
        };

        let response = match self.carrier.create_guide(&request).await {
            Ok(response) => response,
            Err(reason) => {
                self.record_failure(&mut shipping, &reason)?;
                return Err(ShippingError::CarrierTransport(reason));
            }
        };

        // The guide exists on the carrier's side at this point, so a bad
        // document must not fail the call (a retry would duplicate the
        // shipment). Flag it for the admin and keep going.
        if base64::engine::general_purpose::STANDARD
            .decode(&response.guide_document)
            .is_err()
        {
            tracing::warn!(
                order_id = %order_id,
                "carrier returned a non-base64 guide document"
            );
        }

        shipping.status = ShippingStatus::GuideCreated;
        shipping.package = Some(package);
        shipping.external_order_id = Some(response.external_order_id);
        shipping.tracking_code = Some(response.tracking_code);
        shipping.guide_document = Some(response.guide_document);
        shipping.pickup_date = Some(response.pickup_date);
        shipping.last_error = None;
        shipping.updated_at = chrono::Utc::now();

        let txn = self.store.begin_write()?;
        self.store.put_shipping(&txn, &shipping)?;
        // Guide in hand means the order moves on to SENT
        if let Some(mut order) = self.store.get_order_txn(&txn, order_id)? {
            if order.status == OrderStatus::Paid {
                order.status = OrderStatus::Sent;
                order.updated_at = chrono::Utc::now();
                self.store.put_order(&txn, &order)?;
            }
        }
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            order_id = %order_id,
            tracking = ?shipping.tracking_code,
            "shipping guide persisted"
        );
        Ok(shipping)
    }

    /// Resolve package dimensions from the override or the calculator
    fn resolve_package(
        &self,
        order: &Order,
        shipping: &Shipping,
    ) -> ShippingResult<PackageDimensions> {
        if let Some(profile) = shipping.box_override {
            let mut package = packaging::calculate_package(&self.pack_items(order)?);
            package.container_type = profile.container_type;
            package.container_size = profile.container_size;
            return Ok(package);
        }
        Ok(packaging::calculate_package(&self.pack_items(order)?))
    }

    fn pack_items(&self, order: &Order) -> ShippingResult<Vec<PackItem>> {
        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let size = match item.product_id.as_deref() {
                Some(product_id) => self
                    .store
                    .get_product(product_id)?
                    .map(|p| packaging::parse_size(&p.size))
                    .unwrap_or(packaging::SizeClass::DEFAULT),
                None => packaging::SizeClass::DEFAULT,
            };
            items.push(PackItem {
                size,
                quantity: item.quantity,
            });
        }
        Ok(items)
    }

    /// Capture a carrier failure on the shipping row for admin retry
    fn record_failure(&self, shipping: &mut Shipping, reason: &str) -> ShippingResult<()> {
        shipping.last_error = Some(reason.to_string());
        shipping.updated_at = chrono::Utc::now();
        let txn = self.store.begin_write()?;
        self.store.put_shipping(&txn, shipping)?;
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use shared::models::{AbcClass, CustomerSnapshot, OrderItem, Product};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockCarrier {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockCarrier {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl CarrierApi for MockCarrier {
        async fn create_guide(&self, request: &CarrierRequest) -> Result<CarrierResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("connect timeout".to_string());
            }
            Ok(CarrierResponse {
                tracking_code: format!("TRK-{}", request.reference),
                guide_document: "JVBERi0=".to_string(),
                pickup_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
                external_order_id: "EXT-77".to_string(),
            })
        }
    }

    fn origin() -> CarrierAddress {
        CarrierAddress {
            first_name: "Warehouse".to_string(),
            last_name: "Ops".to_string(),
            phone: "3000000000".to_string(),
            address: "Calle 1 # 2-3".to_string(),
            city: "Bogota".to_string(),
            locality_code: "11001000".to_string(),
        }
    }

    fn seed(store: &Store, status: OrderStatus, shipping_status: ShippingStatus) {
        let txn = store.begin_write().unwrap();
        store
            .put_product(
                &txn,
                &Product {
                    id: "p1".to_string(),
                    name: "Shirt".to_string(),
                    sku: "SH-1".to_string(),
                    stock: 5,
                    price: Decimal::from(40_000),
                    acq_price: Decimal::from(15_000),
                    size: "S_LIGHT".to_string(),
                    classification: AbcClass::A,
                },
            )
            .unwrap();
        store
            .put_order(
                &txn,
                &Order {
                    id: "o-1".to_string(),
                    order_number: 1,
                    reference: Order::reference_for(1),
                    status,
                    customer: CustomerSnapshot::default(),
                    items: vec![OrderItem {
                        product_id: Some("p1".to_string()),
                        quantity: 2,
                        price: Decimal::from(40_000),
                        sku: Some("SH-1".to_string()),
                        name: "Shirt".to_string(),
                    }],
                    subtotal: Decimal::from(80_000),
                    discount: Decimal::ZERO,
                    total: Decimal::from(80_000),
                    coupon_code: None,
                    financials: None,
                    last_error: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
            )
            .unwrap();
        store
            .put_shipping(
                &txn,
                &Shipping {
                    order_id: "o-1".to_string(),
                    status: shipping_status,
                    carrier: "coordinadora".to_string(),
                    cost: Decimal::from(12_000),
                    box_override: None,
                    package: None,
                    external_order_id: None,
                    tracking_code: None,
                    guide_document: None,
                    pickup_date: None,
                    last_error: None,
                    updated_at: Utc::now(),
                },
            )
            .unwrap();
        txn.commit().unwrap();
    }

    fn orchestrator(store: &Store, carrier: Arc<MockCarrier>) -> GuideOrchestrator {
        GuideOrchestrator::new(store.clone(), carrier, origin())
    }

    #[tokio::test]
    async fn creates_guide_and_marks_order_sent() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, OrderStatus::Paid, ShippingStatus::Quoted);
        let carrier = Arc::new(MockCarrier::new(false));
        let orch = orchestrator(&store, carrier.clone());

        let shipping = orch.create_guide("o-1").await.unwrap();
        assert_eq!(shipping.status, ShippingStatus::GuideCreated);
        assert_eq!(shipping.external_order_id.as_deref(), Some("EXT-77"));
        assert!(shipping.tracking_code.is_some());
        assert_eq!(
            store.get_order("o-1").unwrap().unwrap().status,
            OrderStatus::Sent
        );
        assert_eq!(carrier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_call_short_circuits() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, OrderStatus::Paid, ShippingStatus::Quoted);
        let carrier = Arc::new(MockCarrier::new(false));
        let orch = orchestrator(&store, carrier.clone());

        orch.create_guide("o-1").await.unwrap();
        // the first call moved the order to SENT; the retry must still
        // resolve to the existing guide, not a paid-only rejection
        assert_eq!(
            store.get_order("o-1").unwrap().unwrap().status,
            OrderStatus::Sent
        );
        let err = orch.create_guide("o-1").await.unwrap_err();
        let ShippingError::AlreadyCreated(existing) = err else {
            panic!("expected AlreadyCreated, got {err:?}");
        };
        assert_eq!(existing.external_order_id.as_deref(), Some("EXT-77"));
        assert_eq!(existing.status, ShippingStatus::GuideCreated);
        assert!(existing.tracking_code.is_some());
        // carrier was only ever called once
        assert_eq!(carrier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unpaid_order_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, OrderStatus::Pending, ShippingStatus::Quoted);
        let orch = orchestrator(&store, Arc::new(MockCarrier::new(false)));

        let err = orch.create_guide("o-1").await.unwrap_err();
        assert!(matches!(err, ShippingError::NotPaid(_)));
    }

    #[tokio::test]
    async fn unquoted_shipping_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, OrderStatus::Paid, ShippingStatus::Pending);
        let orch = orchestrator(&store, Arc::new(MockCarrier::new(false)));

        let err = orch.create_guide("o-1").await.unwrap_err();
        assert!(matches!(err, ShippingError::NotQuoted(_)));
    }

    #[tokio::test]
    async fn carrier_failure_is_transient_and_captured() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, OrderStatus::Paid, ShippingStatus::Quoted);
        let orch = orchestrator(&store, Arc::new(MockCarrier::new(true)));

        let err = orch.create_guide("o-1").await.unwrap_err();
        assert!(matches!(err, ShippingError::CarrierTransport(_)));

        let shipping = store.get_shipping("o-1").unwrap().unwrap();
        assert_eq!(shipping.status, ShippingStatus::Quoted);
        assert!(shipping.external_order_id.is_none());
        assert!(shipping.last_error.is_some());
        // order untouched, stays retryable
        assert_eq!(
            store.get_order("o-1").unwrap().unwrap().status,
            OrderStatus::Paid
        );
    }
}
