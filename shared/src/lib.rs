//! Shared types for the back-office pipeline
//!
//! Domain models, the unified error system and the normalized payment
//! event shape used across the webhook adapters and the order pipeline.

pub mod error;
pub mod gateway;
pub mod models;

// Re-exports
pub use axum::{Json, body};
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use gateway::{ExternalStatus, PaymentEvent};
