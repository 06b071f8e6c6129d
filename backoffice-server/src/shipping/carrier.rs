//! Carrier API client
//!
//! The orchestrator only sees the [`CarrierApi`] trait; production uses
//! the reqwest implementation with an explicit timeout, tests plug in a
//! mock. A timeout is a transient failure: guide creation stays
//! retryable and the shipping row is left untouched.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::PackageDimensions;
use std::time::Duration;

/// Address block as the carrier expects it: split names, normalized
/// phone, locality codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierAddress {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub locality_code: String,
}

/// Guide creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierRequest {
    pub reference: String,
    pub package: PackageDimensions,
    pub origin: CarrierAddress,
    pub destination: CarrierAddress,
    /// Declared content value for carrier insurance
    #[serde(with = "rust_decimal::serde::float")]
    pub declared_value: Decimal,
}

/// Guide creation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierResponse {
    pub tracking_code: String,
    /// Base64 guide document (PDF)
    pub guide_document: String,
    pub pickup_date: NaiveDate,
    /// Carrier's own order id, persisted for idempotency
    pub external_order_id: String,
}

/// Carrier transport abstraction
#[async_trait]
pub trait CarrierApi: Send + Sync {
    /// Create a shipping guide; errors are transport-level and retryable
    async fn create_guide(&self, request: &CarrierRequest) -> Result<CarrierResponse, String>;
}

/// HTTP carrier client settings
#[derive(Debug, Clone)]
pub struct CarrierConfig {
    pub base_url: String,
    pub api_key: String,
    /// Explicit call timeout; timeouts surface as transient failures
    pub timeout: Duration,
    pub origin: CarrierAddress,
}

/// reqwest-backed carrier client
pub struct HttpCarrier {
    client: reqwest::Client,
    config: CarrierConfig,
}

impl HttpCarrier {
    pub fn new(config: CarrierConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl CarrierApi for HttpCarrier {
    async fn create_guide(&self, request: &CarrierRequest) -> Result<CarrierResponse, String> {
        let url = format!("{}/api/v1/guides", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| format!("carrier request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("carrier returned {}", response.status()));
        }
        response
            .json::<CarrierResponse>()
            .await
            .map_err(|e| format!("carrier response decode failed: {e}"))
    }
}
