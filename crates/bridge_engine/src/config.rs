use std::path::Path;

use bridge_core::PricingResolver;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which collaborators serve inventory, sessions and billing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Mock,
    Ocpi,
}

/// Connection settings for the upstream OCPI CPO.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcpiSettings {
    pub base_url: String,
    pub token: String,
    pub version: String,
    /// Page size used when walking paginated OCPI lists.
    pub page_size: usize,
    pub country_code: String,
    pub party_id: String,
}

impl Default for OcpiSettings {
    fn default() -> Self {
        OcpiSettings {
            base_url: "http://localhost:8080".into(),
            token: String::new(),
            version: "2.2.1".into(),
            page_size: 100,
            country_code: "IN".into(),
            party_id: "CPO".into(),
        }
    }
}

/// Bridge configuration, loaded once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub ocpi: OcpiSettings,
    /// Fetch tariffs and embed priced offers. When off, catalogs only carry
    /// the raw tariff references.
    pub tariff_decomposition_enabled: bool,
    pub default_currency: String,
    /// Beckn provider id announced in catalogs.
    pub provider_id: Option<String>,
    pub search_radius_km: f64,
    pub payment_base_url: String,
    pub cancellation_tnc_url: String,
    pub backend: BackendKind,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            ocpi: OcpiSettings::default(),
            tariff_decomposition_enabled: true,
            default_currency: "INR".into(),
            provider_id: None,
            search_radius_km: 10.0,
            payment_base_url: "https://payments.example.com/pay".into(),
            cancellation_tnc_url: "https://example.com/tnc.html".into(),
            backend: BackendKind::Mock,
        }
    }
}

impl BridgeConfig {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Apply environment overrides. `lookup` is normally `std::env::var(..).ok()`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(flag) = lookup("TARIFF_DECOMPOSITION_ENABLED") {
            self.tariff_decomposition_enabled = flag.trim().eq_ignore_ascii_case("true");
            info!(
                enabled = self.tariff_decomposition_enabled,
                "tariff decomposition set from environment"
            );
        }
        if let Some(url) = lookup("OCPI_BASE_URL") {
            self.ocpi.base_url = url;
        }
        if let Some(token) = lookup("OCPI_TOKEN") {
            self.ocpi.token = token;
        }
        if let Some(party) = lookup("MY_PARTY_ID") {
            self.provider_id = Some(party);
        }
        if let Some(url) = lookup("PAYMENT_BASE_URL") {
            self.payment_base_url = url;
        }
        if let Some(url) = lookup("CANCELLATION_TNC_URL") {
            self.cancellation_tnc_url = url;
        }
        if self.backend == BackendKind::Ocpi && self.ocpi.token.is_empty() {
            warn!("OCPI backend selected without a token");
        }
        self
    }

    pub fn pricing_resolver(&self) -> PricingResolver {
        PricingResolver::new(self.tariff_decomposition_enabled, self.default_currency.clone())
    }
}
