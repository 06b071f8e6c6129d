//! Data models
//!
//! Shared between the pipeline server and admin tooling (via API).
//! Money fields are `rust_decimal::Decimal` serialized as JSON numbers.

pub mod coupon;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod product;
pub mod shipping;

// Re-exports
pub use coupon::*;
pub use inventory::*;
pub use order::*;
pub use payment::*;
pub use product::*;
pub use shipping::*;
