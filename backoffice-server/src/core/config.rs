use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::GatewayConfig;
use crate::orders::FinancialCancelPolicy;
use crate::shipping::carrier::{CarrierAddress, CarrierConfig};

/// Server configuration, every item overridable from the environment.
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | WORK_DIR | /var/lib/backoffice | Working directory (database, logs) |
/// | HTTP_PORT | 3000 | HTTP API port |
/// | ENVIRONMENT | development | development \| staging \| production |
/// | WOMPI_EVENTS_SECRET | (empty) | Checksum secret for the card gateway |
/// | PAYU_API_KEY | (empty) | Signature key for the alternate gateway |
/// | PAYU_MERCHANT_ID | (empty) | Expected merchant id on confirmations |
/// | CARRIER_BASE_URL | http://localhost:4000 | Carrier API base URL |
/// | CARRIER_API_KEY | (empty) | Carrier API bearer token |
/// | CARRIER_TIMEOUT_MS | 15000 | Carrier call timeout (milliseconds) |
/// | FINANCIAL_CANCEL_POLICY | retain | retain \| zero |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | Graceful shutdown timeout |
///
/// Empty gateway secrets are allowed so the server can boot in
/// development; every webhook will then fail signature verification,
/// which is the safe direction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory holding the database and log files
    pub work_dir: String,
    /// HTTP API port
    pub http_port: u16,
    /// Runtime environment: development | staging | production
    pub environment: String,

    // === Gateway credentials ===
    pub wompi_events_secret: String,
    pub payu_api_key: String,
    pub payu_merchant_id: String,

    // === Carrier settings ===
    pub carrier_base_url: String,
    pub carrier_api_key: String,
    pub carrier_timeout_ms: u64,

    // === Warehouse origin for shipping guides ===
    pub origin_first_name: String,
    pub origin_last_name: String,
    pub origin_phone: String,
    pub origin_address: String,
    pub origin_city: String,
    pub origin_locality_code: String,

    /// What happens to the financial snapshot when a paid order cancels
    pub financial_cancel_policy: FinancialCancelPolicy,
    /// Graceful shutdown timeout (milliseconds)
    pub shutdown_timeout_ms: u64,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/backoffice".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            wompi_events_secret: std::env::var("WOMPI_EVENTS_SECRET").unwrap_or_default(),
            payu_api_key: std::env::var("PAYU_API_KEY").unwrap_or_default(),
            payu_merchant_id: std::env::var("PAYU_MERCHANT_ID").unwrap_or_default(),

            carrier_base_url: std::env::var("CARRIER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:4000".into()),
            carrier_api_key: std::env::var("CARRIER_API_KEY").unwrap_or_default(),
            carrier_timeout_ms: std::env::var("CARRIER_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(15000),

            origin_first_name: std::env::var("ORIGIN_FIRST_NAME")
                .unwrap_or_else(|_| "Warehouse".into()),
            origin_last_name: std::env::var("ORIGIN_LAST_NAME")
                .unwrap_or_else(|_| "Dispatch".into()),
            origin_phone: std::env::var("ORIGIN_PHONE").unwrap_or_default(),
            origin_address: std::env::var("ORIGIN_ADDRESS").unwrap_or_default(),
            origin_city: std::env::var("ORIGIN_CITY").unwrap_or_default(),
            origin_locality_code: std::env::var("ORIGIN_LOCALITY_CODE").unwrap_or_default(),

            financial_cancel_policy: match std::env::var("FINANCIAL_CANCEL_POLICY").as_deref() {
                Ok("zero") => FinancialCancelPolicy::Zero,
                _ => FinancialCancelPolicy::Retain,
            },
            shutdown_timeout_ms: std::env::var("SHUTDOWN_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10000),
        }
    }

    /// Override work dir and port, mostly for tests
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Database file under the working directory
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir)
            .join("database")
            .join("backoffice.redb")
    }

    /// Log directory under the working directory
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// Create the work_dir substructure if missing
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(PathBuf::from(&self.work_dir).join("database"))?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            wompi_events_secret: self.wompi_events_secret.clone(),
            payu_api_key: self.payu_api_key.clone(),
            payu_merchant_id: self.payu_merchant_id.clone(),
        }
    }

    pub fn carrier_config(&self) -> CarrierConfig {
        CarrierConfig {
            base_url: self.carrier_base_url.clone(),
            api_key: self.carrier_api_key.clone(),
            timeout: Duration::from_millis(self.carrier_timeout_ms),
            origin: self.origin_address(),
        }
    }

    pub fn origin_address(&self) -> CarrierAddress {
        CarrierAddress {
            first_name: self.origin_first_name.clone(),
            last_name: self.origin_last_name.clone(),
            phone: self.origin_phone.clone(),
            address: self.origin_address.clone(),
            city: self.origin_city.clone(),
            locality_code: self.origin_locality_code.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
