//! Collaborator interfaces. Implementations are picked once, at construction
//! time: the in-memory ones in [`crate::mock`], the HTTP one in the API crate.

use bridge_core::{CdrRecord, ChargeLocation, PushResult, SessionRecord, Tariff};
use serde_json::{Map, Value};

use crate::BackendError;

/// Source of the OCPI inventory. Both lists are exhaustive and de-duplicated.
pub trait InventorySource: Send + Sync {
    fn fetch_all_locations(&self) -> Result<Vec<ChargeLocation>, BackendError>;
    fn fetch_all_tariffs(&self) -> Result<Vec<Tariff>, BackendError>;
}

/// Charging-session lifecycle.
pub trait SessionBackend: Send + Sync {
    fn initiate_session(
        &self,
        location_id: &str,
        evse_uid: &str,
        connector_id: &str,
        token: &str,
    ) -> Result<SessionRecord, BackendError>;

    fn confirm_session(&self, session_id: &str) -> Result<SessionRecord, BackendError>;

    fn get_session_status(&self, session_id: &str) -> Result<SessionRecord, BackendError>;

    fn update_session(
        &self,
        session_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<SessionRecord, BackendError>;
}

/// CDR generation and delivery to the billing network.
pub trait BillingBackend: Send + Sync {
    /// `hint` carries the final session values when the caller has them.
    fn generate_cdr(
        &self,
        session_id: &str,
        hint: Option<&SessionRecord>,
    ) -> Result<CdrRecord, BackendError>;

    fn push_cdr(&self, cdr: &CdrRecord) -> Result<PushResult, BackendError>;
}

/// Produces the link a buyer pays through.
pub trait PaymentGateway: Send + Sync {
    fn payment_url(&self, transaction_id: &str, amount: &str, currency: &str) -> String;
}

/// Payment links of the form `<base>?tx_id=..&amount=..&currency=..`.
#[derive(Debug, Clone)]
pub struct LinkPaymentGateway {
    base_url: String,
}

impl LinkPaymentGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        LinkPaymentGateway {
            base_url: base_url.into(),
        }
    }
}

impl PaymentGateway for LinkPaymentGateway {
    fn payment_url(&self, transaction_id: &str, amount: &str, currency: &str) -> String {
        format!(
            "{}?tx_id={}&amount={}&currency={}",
            self.base_url, transaction_id, amount, currency
        )
    }
}
