use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::gateway::WebhookDispatcher;
use crate::orders::OrderPipeline;
use crate::outbound::{LogInvoicer, LogNotifier, OutboundHandle, OutboundWorker};
use crate::shipping::GuideOrchestrator;
use crate::shipping::carrier::HttpCarrier;
use crate::storage::Store;

/// Shared server state, one instance per process.
///
/// Cloning is shallow; every component behind an Arc.
///
/// | Field | Description |
/// |-------|-------------|
/// | config | Immutable configuration |
/// | store | Embedded transactional store (redb) |
/// | dispatcher | Webhook signature verification and normalization |
/// | pipeline | Order state machine and ledger |
/// | orchestrator | Shipping guide creation |
/// | outbound | Fire-and-forget task queue handle |
/// | shutdown | Cancellation token shared with background tasks |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub store: Store,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub pipeline: Arc<OrderPipeline>,
    pub orchestrator: Arc<GuideOrchestrator>,
    pub outbound: OutboundHandle,
    pub shutdown: CancellationToken,
    /// Worker waiting to be spawned by [`start_background_tasks`]
    worker: Arc<Mutex<Option<OutboundWorker>>>,
}

impl ServerState {
    /// Initialize all components in dependency order.
    ///
    /// # Panics
    ///
    /// Panics when the working directory or the database cannot be
    /// created. The process cannot do anything useful without them.
    pub fn initialize(config: &Config) -> Self {
        config
            .ensure_work_dir_structure()
            .expect("Failed to create work directory structure");

        let store = Store::open(config.database_path()).expect("Failed to open database");

        let dispatcher = Arc::new(WebhookDispatcher::new(config.gateway_config()));

        let carrier =
            Arc::new(HttpCarrier::new(config.carrier_config()).expect("Failed to build HTTP client"));
        let orchestrator = Arc::new(GuideOrchestrator::new(
            store.clone(),
            carrier,
            config.origin_address(),
        ));

        let shutdown = CancellationToken::new();
        let (worker, outbound) = OutboundWorker::new(
            orchestrator.clone(),
            Arc::new(LogNotifier),
            Arc::new(LogInvoicer),
            shutdown.clone(),
        );

        let mut pipeline = OrderPipeline::new(store.clone(), config.financial_cancel_policy);
        pipeline.set_outbound(outbound.clone());

        Self {
            config: config.clone(),
            store,
            dispatcher,
            pipeline: Arc::new(pipeline),
            orchestrator,
            outbound,
            shutdown,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Spawn the outbound worker. Call once, before serving traffic.
    pub fn start_background_tasks(&self) {
        let worker = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match worker {
            Some(worker) => {
                tokio::spawn(worker.run());
            }
            None => tracing::warn!("background tasks already started"),
        }
    }
}
