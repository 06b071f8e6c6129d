//! Coupon model

use serde::{Deserialize, Serialize};

/// Discount coupon
///
/// `used_count` is incremented when an order using the coupon becomes
/// PAID and decremented when that order is later CANCELLED. It must never
/// go negative; the decrement saturates at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub used_count: u32,
    pub is_active: bool,
}
