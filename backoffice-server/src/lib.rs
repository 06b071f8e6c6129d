//! Backoffice Server: payment reconciliation and inventory pipeline
//!
//! # Architecture
//!
//! Payment gateways deliver webhooks; this server verifies them,
//! drives the order state machine, keeps the inventory ledger honest,
//! snapshots financials at payment time and creates shipping guides
//! with the carrier.
//!
//! # Module structure
//!
//! ```text
//! backoffice-server/src/
//! ├── core/       # Config, state, HTTP server
//! ├── api/        # HTTP routes and handlers
//! ├── gateway/    # Webhook signature verification and normalization
//! ├── orders/     # Order state machine and financial snapshots
//! ├── ledger/     # Append-only inventory movement log
//! ├── packaging/  # Package dimension calculator
//! ├── shipping/   # Carrier client and guide orchestration
//! ├── outbound/   # Fire-and-forget background task queue
//! ├── storage/    # Embedded redb store
//! └── common/     # Logging
//! ```

pub mod api;
pub mod common;
pub mod core;
pub mod gateway;
pub mod ledger;
pub mod orders;
pub mod outbound;
pub mod packaging;
pub mod shipping;
pub mod storage;

// Re-export the public surface
pub use core::{Config, Server, ServerState};
pub use gateway::WebhookDispatcher;
pub use ledger::Ledger;
pub use orders::{FinancialCancelPolicy, OrderPipeline};
pub use shipping::GuideOrchestrator;
pub use storage::Store;

// Re-export unified error types from shared
pub use shared::{ApiResponse, AppError, AppResult, ErrorCode};

// Re-export logger functions
pub use common::logger::{init_logger, init_logger_with_file};

/// Initialize logging from the config. Call once at startup.
pub fn setup_environment(config: &Config) {
    let log_dir = config.log_dir();
    let log_dir = log_dir.to_str();
    common::logger::init_logger_with_file(std::env::var("LOG_LEVEL").ok().as_deref(), log_dir);
}
