//! Unified error system for the back-office pipeline
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Webhook / gateway errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Inventory errors
//! - 7xxx: Shipping errors
//! - 9xxx: System errors

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility with admin tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 1xxx: Webhook / Gateway ====================
    /// Webhook signature verification failed
    InvalidSignature = 1001,
    /// Webhook payload could not be parsed
    MalformedPayload = 1002,
    /// Event type is not handled by the pipeline (soft ack)
    UnsupportedEvent = 1003,

    // ==================== 4xxx: Order ====================
    /// Order not found (soft ack at the webhook layer)
    OrderNotFound = 4001,
    /// Transition not allowed from the current order status
    InvalidTransition = 4002,

    // ==================== 5xxx: Payment ====================
    /// Payment details not found
    PaymentNotFound = 5001,

    // ==================== 6xxx: Inventory ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Insufficient stock for a decrementing movement
    StockExhausted = 6002,
    /// Ledger sum does not match the stored stock counter
    InvariantViolation = 6003,

    // ==================== 7xxx: Shipping ====================
    /// Shipping guide already created for this order
    GuideAlreadyCreated = 7001,
    /// Shipping has not been quoted yet
    ShippingNotQuoted = 7002,
    /// Order is not paid
    OrderNotPaid = 7003,
    /// Carrier call failed (retryable)
    CarrierTransport = 7004,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Storage layer error
    StorageError = 9002,
}

impl ErrorCode {
    /// Default human-readable message for this code
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",
            Self::InvalidSignature => "Invalid webhook signature",
            Self::MalformedPayload => "Malformed webhook payload",
            Self::UnsupportedEvent => "Unsupported event type",
            Self::OrderNotFound => "Order not found",
            Self::InvalidTransition => "Invalid order status transition",
            Self::PaymentNotFound => "Payment details not found",
            Self::ProductNotFound => "Product not found",
            Self::StockExhausted => "Insufficient stock",
            Self::InvariantViolation => "Inventory ledger invariant violated",
            Self::GuideAlreadyCreated => "Shipping guide already created",
            Self::ShippingNotQuoted => "Shipping not quoted",
            Self::OrderNotPaid => "Order is not paid",
            Self::CarrierTransport => "Carrier call failed",
            Self::InternalError => "Internal server error",
            Self::StorageError => "Storage error",
        }
    }

    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            // Soft acks: the gateway must not retry-storm on these
            Self::UnsupportedEvent | Self::OrderNotFound => StatusCode::OK,

            Self::InvalidSignature => StatusCode::UNAUTHORIZED,

            Self::MalformedPayload | Self::InvalidRequest | Self::ValidationFailed => {
                StatusCode::BAD_REQUEST
            }

            Self::NotFound | Self::PaymentNotFound | Self::ProductNotFound => {
                StatusCode::NOT_FOUND
            }

            Self::AlreadyExists | Self::GuideAlreadyCreated => StatusCode::CONFLICT,

            Self::InvalidTransition
            | Self::StockExhausted
            | Self::ShippingNotQuoted
            | Self::OrderNotPaid => StatusCode::UNPROCESSABLE_ENTITY,

            Self::CarrierTransport => StatusCode::BAD_GATEWAY,

            Self::Unknown
            | Self::InvariantViolation
            | Self::InternalError
            | Self::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code as u16
    }
}

/// Error returned when converting an unknown u16 into an [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid error code: {0}")]
pub struct InvalidErrorCode(pub u16);

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = match value {
            0 => Self::Success,
            1 => Self::Unknown,
            2 => Self::ValidationFailed,
            3 => Self::NotFound,
            4 => Self::AlreadyExists,
            5 => Self::InvalidRequest,
            1001 => Self::InvalidSignature,
            1002 => Self::MalformedPayload,
            1003 => Self::UnsupportedEvent,
            4001 => Self::OrderNotFound,
            4002 => Self::InvalidTransition,
            5001 => Self::PaymentNotFound,
            6001 => Self::ProductNotFound,
            6002 => Self::StockExhausted,
            6003 => Self::InvariantViolation,
            7001 => Self::GuideAlreadyCreated,
            7002 => Self::ShippingNotQuoted,
            7003 => Self::OrderNotPaid,
            7004 => Self::CarrierTransport,
            9001 => Self::InternalError,
            9002 => Self::StorageError,
            other => return Err(InvalidErrorCode(other)),
        };
        Ok(code)
    }
}

/// Application error with structured error code and details
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (order id, failing item, etc.)
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    // ==================== Convenience constructors ====================

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", r))
            .with_detail("resource", r)
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::StorageError, msg)
    }

    /// Create an invalid request error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, msg)
    }
}

/// Unified API response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Error code (0 for success, non-zero for errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Human-readable message
    pub message: String,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Additional error details (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            code: Some(0),
            message: "OK".to_string(),
            data: Some(data),
            details: None,
        }
    }

    /// Create an error response from an [`AppError`]
    pub fn error(err: &AppError) -> Self {
        Self {
            code: Some(err.code.into()),
            message: err.message.clone(),
            data: None,
            details: err.details.clone(),
        }
    }
}

impl ApiResponse<()> {
    /// Create a success response without data
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            message: "OK".to_string(),
            data: None,
            details: None,
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        if self.http_status().is_server_error() {
            tracing::error!(code = ?self.code, error = %self.message, "request failed");
        }
        let status = self.http_status();
        let body = axum::Json(ApiResponse::<()>::error(&self));
        (status, body).into_response()
    }
}

/// Application-level Result type used in HTTP handlers
pub type AppResult<T> = Result<T, AppError>;
