//! Payment-event processing and status transitions
//!
//! # Transition flow
//!
//! ```text
//! apply_payment_event(event)
//!     ├─ 1. Begin write transaction (per-order serialization boundary)
//!     ├─ 2. Resolve order by gateway reference
//!     ├─ 3. Guard the transition against the persisted status
//!     ├─ 4. PAID:      atomic stock decrement + coupon + financial snapshot
//!     │    CANCELLED: symmetric restock + coupon reversal
//!     ├─ 5. Upsert payment details (keyed by order id)
//!     ├─ 6. Upsert/create shipping row
//!     ├─ 7. Commit
//!     └─ 8. Enqueue deferred tasks (guide, notification, invoice)
//! ```
//!
//! Steps 1–7 are all-or-nothing: a stock failure on any line item drops
//! the transaction and the order keeps its prior status, so the gateway
//! can redeliver safely. Step 8 is best-effort and never rolls back a
//! committed transition.

use chrono::Utc;
use redb::WriteTransaction;
use rust_decimal::Decimal;
use shared::gateway::{ExternalStatus, PaymentEvent};
use shared::models::{
    Coupon, MovementType, Order, OrderStatus, PaymentDetails, Shipping, ShippingStatus,
};
use std::collections::HashMap;
use thiserror::Error;

use super::financials;
use crate::ledger::{Ledger, LedgerError, MovementRequest};
use crate::outbound::{OutboundHandle, OutboundTask};
use crate::storage::{StorageError, Store};

/// What to do with the financial snapshot when a paid order is cancelled
///
/// The snapshot records that the sale once happened; most deployments
/// keep it. Made configurable rather than hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinancialCancelPolicy {
    /// Keep the snapshot as a historical fact (default)
    #[default]
    Retain,
    /// Clear the snapshot on cancellation
    Zero,
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Gateway reference no longer resolvable (soft ack at the webhook layer)
    #[error("Order not found for reference: {0}")]
    OrderNotFound(String),

    #[error("Invalid transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A line item's stock ran out; the whole transition was rolled back
    #[error("Insufficient stock for product: {0}")]
    StockExhausted(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<LedgerError> for PipelineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::StockExhausted { product_name, .. } => {
                PipelineError::StockExhausted(product_name)
            }
            other => PipelineError::Ledger(other),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result of applying one payment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Status changed and side effects were applied
    Transitioned {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    /// Duplicate PAID delivery; payment details refreshed, nothing else
    AlreadyPaid { order_id: String },
    /// Duplicate CANCELLED delivery
    AlreadyCancelled { order_id: String },
    /// Event carried no status change for this order
    NoChange { order_id: String },
}

/// The order state machine
pub struct OrderPipeline {
    store: Store,
    ledger: Ledger,
    cancel_policy: FinancialCancelPolicy,
    outbound: Option<OutboundHandle>,
}

impl OrderPipeline {
    pub fn new(store: Store, cancel_policy: FinancialCancelPolicy) -> Self {
        let ledger = Ledger::new(store.clone());
        Self {
            store,
            ledger,
            cancel_policy,
            outbound: None,
        }
    }

    /// Attach the outbound queue for deferred side effects
    pub fn set_outbound(&mut self, outbound: OutboundHandle) {
        self.outbound = Some(outbound);
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply a normalized payment event to its order.
    ///
    /// The whole transition runs inside one write transaction; concurrent
    /// webhooks for the same order serialize at the storage layer.
    pub fn apply_payment_event(&self, event: &PaymentEvent) -> PipelineResult<PipelineOutcome> {
        let txn = self.store.begin_write()?;
        let order = self
            .store
            .find_order_by_reference_txn(&txn, &event.order_reference)?
            .ok_or_else(|| PipelineError::OrderNotFound(event.order_reference.clone()))?;

        let outcome = match event.external_status {
            ExternalStatus::Paid => self.transition_to_paid(&txn, order, event),
            ExternalStatus::Cancelled => self.transition_to_cancelled(&txn, order, event),
            ExternalStatus::Pending => self.transition_to_pending(&txn, order, event),
        };

        match outcome {
            Ok(outcome) => {
                txn.commit().map_err(StorageError::from)?;
                self.enqueue_follow_ups(&outcome);
                Ok(outcome)
            }
            Err(err) => {
                // Nothing from this transaction may survive
                drop(txn);
                self.capture_failure(&event.order_reference, &err);
                Err(err)
            }
        }
    }

    // ========== PAID ==========

    fn transition_to_paid(
        &self,
        txn: &WriteTransaction,
        mut order: Order,
        event: &PaymentEvent,
    ) -> PipelineResult<PipelineOutcome> {
        match order.status {
            // Idempotency guard: the persisted status is read inside the
            // same transaction that mutates it, so a redelivered PAID
            // webhook can never decrement stock twice.
            OrderStatus::Paid => {
                self.upsert_payment(txn, &order, event)?;
                return Ok(PipelineOutcome::AlreadyPaid { order_id: order.id });
            }
            OrderStatus::Cancelled | OrderStatus::Sent => {
                return Err(PipelineError::InvalidTransition {
                    order_id: order.id,
                    from: order.status,
                    to: OrderStatus::Paid,
                });
            }
            OrderStatus::Created | OrderStatus::Pending => {}
        }
        let from = order.status;

        // 1. Atomic stock decrement for every resolvable line item
        let requests = self.movement_requests(txn, &order, MovementType::OrderPlaced)?;
        let applied = self.ledger.apply_batch_atomic(txn, &requests)?;

        // 2. Coupon usage
        if let Some(code) = order.coupon_code.clone() {
            self.bump_coupon(txn, &code, 1)?;
        }

        // 3. Financial snapshot, exactly once. Computed from the order's
        // own total: the gateway-reported amount is recorded in the
        // payment details but never trusted for money math.
        let reported = Decimal::new(event.amount_cents, 2);
        if reported != order.total {
            tracing::warn!(
                order_id = %order.id,
                reported = %reported,
                order_total = %order.total,
                "gateway amount differs from order total"
            );
        }
        let total_paid = order.total;
        let costs: HashMap<&str, Decimal> = applied
            .iter()
            .map(|m| (m.product_id.as_str(), m.cost))
            .collect();
        let shipping = self.store.get_shipping_txn(txn, &order.id)?;
        let shipping_cost = shipping
            .as_ref()
            .map(|s| s.cost)
            .unwrap_or(Decimal::ZERO);
        let paid_at = Utc::now();
        order.financials = Some(financials::compute_financials(
            &order.items,
            total_paid,
            event.payment_method,
            shipping_cost,
            |product_id| costs.get(product_id).copied(),
            paid_at,
        ));

        // 4. Status + payment/shipping records
        order.status = OrderStatus::Paid;
        order.last_error = None;
        order.updated_at = paid_at;
        self.store.put_order(txn, &order)?;
        self.upsert_payment(txn, &order, event)?;
        self.ensure_shipping(txn, &order, shipping)?;

        tracing::info!(
            order_id = %order.id,
            reference = %order.reference,
            transaction_id = %event.transaction_id,
            provider = %event.provider,
            "order paid"
        );
        Ok(PipelineOutcome::Transitioned {
            order_id: order.id,
            from,
            to: OrderStatus::Paid,
        })
    }

    // ========== CANCELLED ==========

    fn transition_to_cancelled(
        &self,
        txn: &WriteTransaction,
        mut order: Order,
        event: &PaymentEvent,
    ) -> PipelineResult<PipelineOutcome> {
        match order.status {
            // Terminal and idempotent
            OrderStatus::Cancelled => {
                return Ok(PipelineOutcome::AlreadyCancelled { order_id: order.id });
            }
            OrderStatus::Sent => {
                return Err(PipelineError::InvalidTransition {
                    order_id: order.id,
                    from: order.status,
                    to: OrderStatus::Cancelled,
                });
            }
            OrderStatus::Created | OrderStatus::Pending | OrderStatus::Paid => {}
        }
        let from = order.status;

        if from == OrderStatus::Paid {
            // Exactly reverse the PAID stock delta
            let requests = self.movement_requests(txn, &order, MovementType::OrderCancelled)?;
            self.ledger.apply_batch_atomic(txn, &requests)?;

            if let Some(code) = order.coupon_code.take() {
                self.bump_coupon(txn, &code, -1)?;
            }

            if self.cancel_policy == FinancialCancelPolicy::Zero {
                order.financials = None;
            }
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        self.store.put_order(txn, &order)?;
        self.upsert_payment(txn, &order, event)?;

        tracing::info!(
            order_id = %order.id,
            reference = %order.reference,
            was_paid = from == OrderStatus::Paid,
            "order cancelled"
        );
        Ok(PipelineOutcome::Transitioned {
            order_id: order.id,
            from,
            to: OrderStatus::Cancelled,
        })
    }

    // ========== PENDING ==========

    fn transition_to_pending(
        &self,
        txn: &WriteTransaction,
        mut order: Order,
        event: &PaymentEvent,
    ) -> PipelineResult<PipelineOutcome> {
        // A pending notice never downgrades a settled order
        if order.status != OrderStatus::Created {
            self.upsert_payment(txn, &order, event)?;
            return Ok(PipelineOutcome::NoChange { order_id: order.id });
        }

        order.status = OrderStatus::Pending;
        order.updated_at = Utc::now();
        self.store.put_order(txn, &order)?;
        self.upsert_payment(txn, &order, event)?;

        Ok(PipelineOutcome::Transitioned {
            order_id: order.id,
            from: OrderStatus::Created,
            to: OrderStatus::Pending,
        })
    }

    // ========== Helpers ==========

    /// Movement requests for every line item whose product still resolves.
    ///
    /// Manual line items carry no product id, and a product deleted from
    /// the catalog cannot be moved; both are skipped with a warning so a
    /// confirmed payment is never rejected over them.
    fn movement_requests(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        movement_type: MovementType,
    ) -> PipelineResult<Vec<MovementRequest>> {
        let sign = if movement_type.is_decrement() { -1 } else { 1 };
        let mut requests = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let Some(product_id) = item.product_id.as_ref() else {
                continue;
            };
            if self.store.get_product_txn(txn, product_id)?.is_none() {
                tracing::warn!(
                    order_id = %order.id,
                    product_id = %product_id,
                    "line item product no longer exists, stock untouched"
                );
                continue;
            }
            requests.push(MovementRequest {
                product_id: product_id.clone(),
                quantity: sign * item.quantity,
                movement_type,
                reference_id: order.id.clone(),
                created_by: "payment-pipeline".to_string(),
            });
        }
        Ok(requests)
    }

    /// Adjust a coupon's usage counter; the decrement saturates at zero
    fn bump_coupon(&self, txn: &WriteTransaction, code: &str, delta: i32) -> PipelineResult<()> {
        let Some(mut coupon) = self.store.get_coupon_txn(txn, code)? else {
            tracing::warn!(coupon = %code, "coupon attached to order no longer exists");
            return Ok(());
        };
        coupon.used_count = if delta >= 0 {
            coupon.used_count + delta as u32
        } else {
            let dec = (-delta) as u32;
            if coupon.used_count < dec {
                tracing::warn!(coupon = %code, "coupon usage would go negative, clamping to 0");
            }
            coupon.used_count.saturating_sub(dec)
        };
        self.store.put_coupon(txn, &coupon)?;
        Ok(())
    }

    /// Find-by-order-id then insert-or-update, inside the transaction.
    fn upsert_payment(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        event: &PaymentEvent,
    ) -> PipelineResult<()> {
        let payment = PaymentDetails {
            order_id: order.id.clone(),
            method: event.payment_method,
            transaction_id: event.transaction_id.clone(),
            details: format!(
                "{} via {}",
                event.payment_method.label(),
                event.provider
            ),
            updated_at: Utc::now(),
        };
        self.store.put_payment(txn, &payment)?;
        Ok(())
    }

    /// Create the shipping row lazily on first payment confirmation
    fn ensure_shipping(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        existing: Option<Shipping>,
    ) -> PipelineResult<()> {
        if existing.is_some() {
            return Ok(());
        }
        let shipping = Shipping {
            order_id: order.id.clone(),
            status: ShippingStatus::Pending,
            carrier: String::new(),
            cost: Decimal::ZERO,
            box_override: None,
            package: None,
            external_order_id: None,
            tracking_code: None,
            guide_document: None,
            pickup_date: None,
            last_error: None,
            updated_at: Utc::now(),
        };
        self.store.put_shipping(txn, &shipping)?;
        Ok(())
    }

    /// Schedule deferred side effects after a committed transition
    fn enqueue_follow_ups(&self, outcome: &PipelineOutcome) {
        let Some(outbound) = &self.outbound else {
            return;
        };
        if let PipelineOutcome::Transitioned { order_id, to, .. } = outcome {
            // Collaborators take the committed order snapshot
            let order = match self.store.get_order(order_id) {
                Ok(Some(order)) => order,
                Ok(None) => {
                    tracing::warn!(order_id = %order_id, "order vanished before follow-up enqueue");
                    return;
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "follow-up enqueue skipped");
                    return;
                }
            };
            outbound.enqueue(OutboundTask::OrderNotification {
                order: Box::new(order.clone()),
                status: *to,
            });
            if *to == OrderStatus::Paid {
                outbound.enqueue(OutboundTask::InvoiceIssue {
                    order: Box::new(order),
                });
                // Guide creation needs a quoted shipping record; a
                // freshly created Pending row waits for the admin quote
                let quoted = self
                    .store
                    .get_shipping(order_id)
                    .ok()
                    .flatten()
                    .is_some_and(|s| s.status == ShippingStatus::Quoted);
                if quoted {
                    outbound.enqueue(OutboundTask::ShippingGuide {
                        order_id: order_id.clone(),
                    });
                }
            }
        }
    }

    /// Best-effort capture of a failed transition on the order row, for
    /// the admin order-detail view. Runs in its own transaction after
    /// the failed one was dropped.
    fn capture_failure(&self, reference: &str, err: &PipelineError) {
        if matches!(err, PipelineError::OrderNotFound(_)) {
            return;
        }
        let result: PipelineResult<()> = (|| {
            let txn = self.store.begin_write()?;
            if let Some(mut order) = self.store.find_order_by_reference_txn(&txn, reference)? {
                order.last_error = Some(err.to_string());
                order.updated_at = Utc::now();
                self.store.put_order(&txn, &order)?;
                txn.commit().map_err(StorageError::from)?;
            }
            Ok(())
        })();
        if let Err(e) = result {
            tracing::error!(reference = %reference, error = %e, "failed to capture pipeline error");
        }
    }
}
