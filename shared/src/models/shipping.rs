//! Shipping model and package profile types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Delivery lifecycle, independent from [`crate::models::OrderStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingStatus {
    Pending,
    Quoted,
    GuideCreated,
    InTransit,
    Delivered,
}

/// Container kind for the shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    /// Soft envelope/bag for small light carts
    Bag,
    /// Rigid box
    Box,
}

/// Physical size class of a package or product (XS..XL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DimensionClass {
    Xs,
    S,
    M,
    L,
    Xl,
}

/// Weight class of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeightClass {
    Light,
    Heavy,
}

/// Chosen shipping container and size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerProfile {
    pub container_type: ContainerType,
    pub container_size: DimensionClass,
}

/// Computed package dimensions sent to the carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDimensions {
    /// Kilograms, 2 decimals, floored at the carrier minimum
    #[serde(with = "rust_decimal::serde::float")]
    pub weight: Decimal,
    /// Centimeters
    pub width: u32,
    pub height: u32,
    pub length: u32,
    pub container_type: ContainerType,
    pub container_size: DimensionClass,
}

/// One-to-one shipping record for an order, created lazily on first
/// payment confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipping {
    pub order_id: String,
    pub status: ShippingStatus,
    pub carrier: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    /// Manually chosen container override from the admin
    pub box_override: Option<ContainerProfile>,
    pub package: Option<PackageDimensions>,
    /// Carrier's order id; presence short-circuits guide creation
    pub external_order_id: Option<String>,
    pub tracking_code: Option<String>,
    /// Guide document (base64 PDF from the carrier)
    pub guide_document: Option<String>,
    pub pickup_date: Option<NaiveDate>,
    /// Last guide-creation failure, kept for admin retry
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}
