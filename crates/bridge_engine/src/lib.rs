//! Beckn ↔ OCPI translation: request parsing, one handler per flow step and
//! the [`Translator`] that fetches inventory and dispatches to them.

pub mod backend;
pub mod beckn;
pub mod config;
pub mod flow;
pub mod handlers;
pub mod mock;

use std::sync::Arc;

use bridge_core::{InventoryIndex, PricingResolver};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{BillingBackend, InventorySource, LinkPaymentGateway, PaymentGateway, SessionBackend};
use crate::beckn::{BecknRequest, BecknResponse};
use crate::config::BridgeConfig;
use crate::handlers::{HandlerEnv, cdr, confirm, init, search, select, status, update};
use crate::mock::{MockInventory, MockSessionBackend};

pub use crate::beckn::Action;

/// Failures of the OCPI-side collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("OCPI request failed: {0}")]
    Transport(String),
    #[error("Unexpected OCPI payload: {0}")]
    Decode(String),
    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },
    #[error("OCPI rejected the request: {0}")]
    Rejected(String),
}

/// A Beckn document the bridge cannot act on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Missing location criteria in search intent")]
    MissingLocation,
    #[error("Missing GPS coordinates in search intent")]
    MissingGps,
    #[error("Invalid GPS coordinates: {0}")]
    InvalidGps(String),
    #[error("Session ID not found in request")]
    MissingSessionId,
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Malformed request: {0}")]
    Malformed(String),
}

/// The bridge: collaborators are chosen once, here, and every request is
/// answered against a fresh snapshot of the inventory.
pub struct Translator {
    inventory: Arc<dyn InventorySource>,
    sessions: Arc<dyn SessionBackend>,
    billing: Arc<dyn BillingBackend>,
    payments: Arc<dyn PaymentGateway>,
    config: BridgeConfig,
    pricing: PricingResolver,
}

impl Translator {
    pub fn new(
        config: BridgeConfig,
        inventory: Arc<dyn InventorySource>,
        sessions: Arc<dyn SessionBackend>,
        billing: Arc<dyn BillingBackend>,
    ) -> Self {
        let payments = Arc::new(LinkPaymentGateway::new(config.payment_base_url.clone()));
        Translator {
            inventory,
            sessions,
            billing,
            payments,
            pricing: config.pricing_resolver(),
            config,
        }
    }

    /// Bridge over the in-memory Bangalore inventory and session store.
    pub fn mock(config: BridgeConfig) -> Result<Self, BackendError> {
        let inventory = Arc::new(MockInventory::bangalore()?);
        let sessions = Arc::new(MockSessionBackend::new());
        Ok(Translator::new(config, inventory, sessions.clone(), sessions))
    }

    pub fn with_payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = payments;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn env(&self) -> HandlerEnv<'_> {
        HandlerEnv {
            config: &self.config,
            pricing: &self.pricing,
            payments: self.payments.as_ref(),
            sessions: self.sessions.as_ref(),
            billing: self.billing.as_ref(),
        }
    }

    fn load_index(&self, with_tariffs: bool) -> Result<InventoryIndex, BackendError> {
        let locations = self.inventory.fetch_all_locations()?;
        let tariffs = if with_tariffs {
            self.inventory.fetch_all_tariffs()?
        } else {
            Vec::new()
        };
        debug!(locations = locations.len(), tariffs = tariffs.len(), "inventory fetched");
        Ok(InventoryIndex::build(locations, tariffs))
    }

    /// Answer one request. Failures are reported inside the response document.
    pub fn handle(&self, request: &BecknRequest) -> BecknResponse {
        let env = self.env();
        let response = match request {
            BecknRequest::Search(req) => match search::validate(req) {
                Err(err) => search::failed(req, &err.to_string()),
                Ok(_) => match self.load_index(self.pricing.decomposition_enabled()) {
                    Ok(index) => search::handle(req, &index, &env),
                    Err(err) => search::failed(req, &err.to_string()),
                },
            },
            BecknRequest::Select(req) => match self.load_index(true) {
                Ok(index) => select::handle(req, &index, &env),
                Err(err) => select::failed(req, &err.to_string(), &env),
            },
            BecknRequest::Init(req) => match self.load_index(true) {
                Ok(index) => init::handle(req, &index, &env),
                Err(err) => init::failed(req, &err.to_string(), &env),
            },
            BecknRequest::Confirm(req) => match self.load_index(false) {
                Ok(index) => confirm::handle(req, &index, &env),
                Err(err) => confirm::failed(req, &err.to_string()),
            },
            BecknRequest::Status(req) => status::handle(req, &env),
            BecknRequest::Update(req) => update::handle(req, &env),
            BecknRequest::Cdr(req) => cdr::handle(req, &env),
        };

        for warning in &response.warnings {
            warn!(action = %request.action(), warning = %warning, "request degraded");
        }
        info!(
            action = %request.action(),
            transaction_id = request.context().transaction_id.as_deref().unwrap_or_default(),
            "request handled"
        );
        response
    }

    /// Parse a raw Beckn document and answer it.
    pub fn handle_value(&self, document: Value) -> Result<BecknResponse, RequestError> {
        let request = BecknRequest::from_value(document)?;
        Ok(self.handle(&request))
    }
}
