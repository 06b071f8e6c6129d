//! Package dimension calculator
//!
//! Deterministic mapping from cart contents to a shipping container
//! profile. This is a discrete policy table, not a bin-packing solver:
//! the container kind comes from three explicit thresholds and the
//! physical size from the single largest dimension class in the cart.

use rust_decimal::Decimal;
use shared::models::{ContainerType, DimensionClass, PackageDimensions, WeightClass};

/// Soft containers only make sense for small carts
const BAG_MAX_ITEMS: i64 = 5;
/// At most one heavy item fits a bag
const BAG_MAX_HEAVY: i64 = 1;
/// Packaging weight added per container type (kg)
const BAG_PACKAGING_KG: f64 = 0.05;
const BOX_PACKAGING_KG: f64 = 0.20;
/// Carrier-mandated minimum billable weight (kg)
const MIN_WEIGHT_KG: f64 = 1.0;

/// Parsed size class of one product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass {
    pub dimension: DimensionClass,
    pub weight: WeightClass,
}

impl SizeClass {
    /// Fallback for malformed size strings
    pub const DEFAULT: SizeClass = SizeClass {
        dimension: DimensionClass::M,
        weight: WeightClass::Light,
    };
}

/// One cart line as seen by the calculator
#[derive(Debug, Clone)]
pub struct PackItem {
    pub size: SizeClass,
    pub quantity: i64,
}

/// Parse a product size string such as `"M_LIGHT"` or `"XL_HEAVY"`.
///
/// Fails soft: malformed input falls back to [`SizeClass::DEFAULT`] with a
/// logged warning, never an error. Product data is operator-entered and a
/// bad size string must not block a shipment.
pub fn parse_size(raw: &str) -> SizeClass {
    let mut parts = raw.trim().splitn(2, '_');
    let dimension = match parts.next().map(|s| s.to_ascii_uppercase()) {
        Some(ref d) if d == "XS" => Some(DimensionClass::Xs),
        Some(ref d) if d == "S" => Some(DimensionClass::S),
        Some(ref d) if d == "M" => Some(DimensionClass::M),
        Some(ref d) if d == "L" => Some(DimensionClass::L),
        Some(ref d) if d == "XL" => Some(DimensionClass::Xl),
        _ => None,
    };
    let weight = match parts.next().map(|s| s.to_ascii_uppercase()) {
        Some(ref w) if w == "LIGHT" => Some(WeightClass::Light),
        Some(ref w) if w == "HEAVY" => Some(WeightClass::Heavy),
        _ => None,
    };

    match (dimension, weight) {
        (Some(dimension), Some(weight)) => SizeClass { dimension, weight },
        _ => {
            tracing::warn!(size = %raw, "malformed product size, falling back to M/LIGHT");
            SizeClass::DEFAULT
        }
    }
}

/// Unit weight in kg per (dimension, weight) class
fn unit_weight_kg(size: SizeClass) -> f64 {
    match (size.dimension, size.weight) {
        (DimensionClass::Xs, WeightClass::Light) => 0.10,
        (DimensionClass::S, WeightClass::Light) => 0.20,
        (DimensionClass::M, WeightClass::Light) => 0.40,
        (DimensionClass::L, WeightClass::Light) => 0.70,
        (DimensionClass::Xl, WeightClass::Light) => 1.20,
        (DimensionClass::Xs, WeightClass::Heavy) => 0.50,
        (DimensionClass::S, WeightClass::Heavy) => 0.80,
        (DimensionClass::M, WeightClass::Heavy) => 1.50,
        (DimensionClass::L, WeightClass::Heavy) => 2.50,
        (DimensionClass::Xl, WeightClass::Heavy) => 4.00,
    }
}

/// Physical container dimensions in cm (width, height, length) per size class
fn container_dimensions(size: DimensionClass, container: ContainerType) -> (u32, u32, u32) {
    match (container, size) {
        (ContainerType::Bag, DimensionClass::Xs) => (20, 5, 25),
        (ContainerType::Bag, DimensionClass::S) => (25, 8, 30),
        (ContainerType::Bag, DimensionClass::M) => (30, 10, 40),
        (ContainerType::Bag, DimensionClass::L) => (40, 12, 50),
        // Bags are never chosen above L; map defensively to the largest bag
        (ContainerType::Bag, DimensionClass::Xl) => (40, 12, 50),
        (ContainerType::Box, DimensionClass::Xs) => (20, 15, 20),
        (ContainerType::Box, DimensionClass::S) => (25, 20, 25),
        (ContainerType::Box, DimensionClass::M) => (35, 25, 35),
        (ContainerType::Box, DimensionClass::L) => (45, 35, 45),
        (ContainerType::Box, DimensionClass::Xl) => (60, 45, 60),
    }
}

/// Round to 2 decimals half-up without floating point artifacts:
/// scale by 100, round, divide.
fn round_weight(kg: f64) -> Decimal {
    let scaled = (kg * 100.0).round() as i64;
    Decimal::new(scaled, 2)
}

/// Compute the container profile and billable weight for a cart.
///
/// Decision rule: a soft bag only if total item count is within
/// [1, [`BAG_MAX_ITEMS`]], heavy-item count ≤ [`BAG_MAX_HEAVY`] and the
/// largest dimension class is at most L; otherwise a rigid box. The
/// physical size follows the single largest dimension class observed,
/// not aggregate volume.
pub fn calculate_package(items: &[PackItem]) -> PackageDimensions {
    let total_items: i64 = items.iter().map(|i| i.quantity).sum();
    let heavy_items: i64 = items
        .iter()
        .filter(|i| i.size.weight == WeightClass::Heavy)
        .map(|i| i.quantity)
        .sum();
    let max_dimension = items
        .iter()
        .map(|i| i.size.dimension)
        .max()
        .unwrap_or(DimensionClass::M);

    let container_type = if (1..=BAG_MAX_ITEMS).contains(&total_items)
        && heavy_items <= BAG_MAX_HEAVY
        && max_dimension <= DimensionClass::L
    {
        ContainerType::Bag
    } else {
        ContainerType::Box
    };

    let packaging_kg = match container_type {
        ContainerType::Bag => BAG_PACKAGING_KG,
        ContainerType::Box => BOX_PACKAGING_KG,
    };
    let content_kg: f64 = items
        .iter()
        .map(|i| unit_weight_kg(i.size) * i.quantity as f64)
        .sum();
    let weight = round_weight((content_kg + packaging_kg).max(MIN_WEIGHT_KG));

    let (width, height, length) = container_dimensions(max_dimension, container_type);

    PackageDimensions {
        weight,
        width,
        height,
        length,
        container_type,
        container_size: max_dimension,
    }
}
