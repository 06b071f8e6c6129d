//! Outbound worker: deferred, best-effort side effects
//!
//! The payment transition must never block on (or be rolled back by) the
//! carrier, the notification sender or invoice issuance. Transitions
//! enqueue tasks here after their transaction commits; a single tokio
//! worker drains the queue and logs failures on its own.
//!
//! Notification and invoicing are external collaborators behind trait
//! seams, like the carrier client: the worker only knows the contract.

use async_trait::async_trait;
use shared::models::{Order, OrderStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::shipping::{GuideOrchestrator, ShippingError};

/// Max attempts for transient carrier failures
const GUIDE_MAX_RETRIES: u32 = 3;
/// Delay between guide retry attempts
const GUIDE_RETRY_DELAY_SECS: u64 = 5;

/// Customer-facing status notifications (mail, SMS)
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_status(&self, order: &Order, status: OrderStatus) -> Result<(), String>;
}

/// Out-of-band invoice issuance after payment
#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
    async fn issue(&self, order: &Order) -> Result<(), String>;
}

/// Log-backed sender, in place until the mail integration lands
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send_status(&self, order: &Order, status: OrderStatus) -> Result<(), String> {
        tracing::info!(
            order_id = %order.id,
            reference = %order.reference,
            status = %status,
            "order notification dispatched"
        );
        Ok(())
    }
}

/// Log-backed issuer, in place until the billing integration lands
pub struct LogInvoicer;

#[async_trait]
impl InvoiceIssuer for LogInvoicer {
    async fn issue(&self, order: &Order) -> Result<(), String> {
        tracing::info!(order_id = %order.id, total = %order.total, "invoice issuance requested");
        Ok(())
    }
}

/// One deferred side effect
#[derive(Debug, Clone)]
pub enum OutboundTask {
    /// Notify the customer of a status change (fire-and-forget)
    OrderNotification {
        order: Box<Order>,
        status: OrderStatus,
    },
    /// Issue the invoice after PAID (out-of-band, not on the critical path)
    InvoiceIssue { order: Box<Order> },
    /// Create the shipping guide with the carrier
    ShippingGuide { order_id: String },
}

/// Cheap cloneable handle for enqueuing tasks
#[derive(Clone)]
pub struct OutboundHandle {
    tx: mpsc::UnboundedSender<OutboundTask>,
}

impl OutboundHandle {
    /// Enqueue a task; a closed queue is logged, never an error for the caller
    pub fn enqueue(&self, task: OutboundTask) {
        if self.tx.send(task).is_err() {
            tracing::warn!("outbound queue closed, task dropped");
        }
    }
}

/// Background worker draining the outbound queue
pub struct OutboundWorker {
    rx: mpsc::UnboundedReceiver<OutboundTask>,
    orchestrator: Arc<GuideOrchestrator>,
    notifier: Arc<dyn NotificationSender>,
    invoicer: Arc<dyn InvoiceIssuer>,
    shutdown: CancellationToken,
}

impl OutboundWorker {
    pub fn new(
        orchestrator: Arc<GuideOrchestrator>,
        notifier: Arc<dyn NotificationSender>,
        invoicer: Arc<dyn InvoiceIssuer>,
        shutdown: CancellationToken,
    ) -> (Self, OutboundHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx,
                orchestrator,
                notifier,
                invoicer,
                shutdown,
            },
            OutboundHandle { tx },
        )
    }

    /// Run until shutdown; every task failure is contained here
    pub async fn run(mut self) {
        tracing::info!("outbound worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("outbound worker shutting down");
                    break;
                }
                task = self.rx.recv() => {
                    match task {
                        Some(task) => self.handle(task).await,
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle(&self, task: OutboundTask) {
        match task {
            OutboundTask::OrderNotification { order, status } => {
                if let Err(reason) = self.notifier.send_status(&order, status).await {
                    tracing::warn!(
                        order_id = %order.id,
                        error = %reason,
                        "status notification failed"
                    );
                }
            }
            OutboundTask::InvoiceIssue { order } => {
                if let Err(reason) = self.invoicer.issue(&order).await {
                    tracing::warn!(order_id = %order.id, error = %reason, "invoice issuance failed");
                }
            }
            OutboundTask::ShippingGuide { order_id } => {
                self.create_guide_with_retry(&order_id).await;
            }
        }
    }

    async fn create_guide_with_retry(&self, order_id: &str) {
        for attempt in 1..=GUIDE_MAX_RETRIES {
            match self.orchestrator.create_guide(order_id).await {
                Ok(shipping) => {
                    tracing::info!(
                        order_id = %order_id,
                        tracking = ?shipping.tracking_code,
                        "shipping guide created"
                    );
                    return;
                }
                // Transient carrier failures are worth retrying
                Err(ShippingError::CarrierTransport(reason)) => {
                    tracing::warn!(
                        order_id = %order_id,
                        attempt,
                        error = %reason,
                        "carrier call failed"
                    );
                    if attempt < GUIDE_MAX_RETRIES {
                        tokio::time::sleep(Duration::from_secs(GUIDE_RETRY_DELAY_SECS)).await;
                    }
                }
                // AlreadyCreated, NotQuoted, NotPaid: nothing to retry here,
                // the admin order view surfaces the captured error.
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "shipping guide not created");
                    return;
                }
            }
        }
        tracing::error!(
            order_id = %order_id,
            retries = GUIDE_MAX_RETRIES,
            "shipping guide creation exhausted retries, left for manual intervention"
        );
    }
}
