//! One handler per commerce-flow step. Handlers are pure with respect to the
//! bridge: everything they read comes in through their arguments.

pub mod cdr;
pub mod confirm;
pub mod init;
pub mod search;
pub mod select;
pub mod status;
pub mod update;

use bridge_core::wire::parse_decimal;
use bridge_core::{ConnectorRef, PricingResolver};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};

use crate::backend::{BillingBackend, PaymentGateway, SessionBackend};
use crate::beckn::Measure;
use crate::config::BridgeConfig;

/// Collaborators and settings a handler may use.
#[derive(Clone, Copy)]
pub struct HandlerEnv<'a> {
    pub config: &'a BridgeConfig,
    pub pricing: &'a PricingResolver,
    pub payments: &'a dyn PaymentGateway,
    pub sessions: &'a dyn SessionBackend,
    pub billing: &'a dyn BillingBackend,
}

pub(crate) const CATEGORY_ID: &str = "ev_charging";

pub(crate) fn category() -> Value {
    json!({
        "id": CATEGORY_ID,
        "descriptor": {
            "name": "EV Charging",
            "short_desc": "Electric Vehicle Charging Services"
        }
    })
}

/// The "Charging Point Specifications" tag group for a matched connector.
pub(crate) fn charging_point_tags(name: &str, found: Option<&ConnectorRef<'_>>) -> Value {
    let connector = found.map(|f| f.connector);
    json!([{
        "descriptor": {"name": name},
        "list": [
            {
                "descriptor": {"name": "Charger type", "code": "charger-type"},
                "value": connector.and_then(|c| c.power_type.clone())
            },
            {
                "descriptor": {"name": "Connector type", "code": "connector-type"},
                "value": connector.and_then(|c| c.standard.clone())
            },
            {
                "descriptor": {"name": "Power Rating"},
                "value": connector.map(|c| format!("{}kW", c.max_electric_power))
            },
            {
                "descriptor": {"name": "Availability"},
                "value": found.map_or("UNKNOWN", |f| f.evse.status.as_str())
            }
        ],
        "display": true
    }])
}

pub(crate) fn cancellation_terms(config: &BridgeConfig) -> Value {
    json!([{
        "fulfillment_state": {"descriptor": {"code": "charging-start"}},
        "cancellation_fee": {"percentage": "30%"},
        "external_ref": {
            "mimetype": "text/html",
            "url": config.cancellation_tnc_url
        }
    }])
}

pub(crate) fn measure(value: Option<&str>, default_value: &str, unit: Option<&str>, default_unit: &str) -> Value {
    json!({
        "value": value.unwrap_or(default_value),
        "unit": unit.unwrap_or(default_unit)
    })
}

/// Numeric value of a selected quantity, if it has one.
pub(crate) fn quantity(measure: &Measure) -> Option<Decimal> {
    measure
        .value
        .as_deref()
        .and_then(|value| parse_decimal(&Value::String(value.to_string())))
}

/// Decimal as a JSON number, for fields the wire carries as floats.
pub(crate) fn number(value: Decimal) -> Value {
    value.to_f64().map_or(Value::Null, |v| json!(v))
}
