use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wire;

/// Price component type the bridge prices on.
pub const ENERGY_COMPONENT: &str = "ENERGY";

/// An OCPI location: one physical charging site.
///
/// Only the fields the bridge reads are typed; everything else the CPO sends
/// is kept in `extra` so it survives a round-trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeLocation {
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<BusinessDetails>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub facilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_times: Option<Value>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub evses: Vec<Evse>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChargeLocation {
    pub fn operator_name(&self) -> Option<&str> {
        self.operator.as_ref().and_then(|op| op.name.as_deref())
    }
}

/// Geographic point as sent by OCPI: decimal degrees, usually as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub latitude: String,
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub longitude: String,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates {
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
        }
    }

    /// Parsed `(lat, lon)` in degrees, `None` when either side is not a number.
    pub fn degrees(&self) -> Option<(f64, f64)> {
        let lat = self.latitude.trim().parse::<f64>().ok()?;
        let lon = self.longitude.trim().parse::<f64>().ok()?;
        Some((lat, lon))
    }

    /// The Beckn `gps` string, built from the raw upstream text.
    pub fn gps(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// One physical charge point within a location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evse {
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<String>,
    #[serde(default)]
    pub status: EvseStatus,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub connectors: Vec<Connector>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvseStatus {
    Available,
    Blocked,
    Charging,
    Inoperative,
    OutOfOrder,
    Planned,
    Removed,
    Reserved,
    #[default]
    #[serde(other)]
    Unknown,
}

impl EvseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvseStatus::Available => "AVAILABLE",
            EvseStatus::Blocked => "BLOCKED",
            EvseStatus::Charging => "CHARGING",
            EvseStatus::Inoperative => "INOPERATIVE",
            EvseStatus::OutOfOrder => "OUTOFORDER",
            EvseStatus::Planned => "PLANNED",
            EvseStatus::Removed => "REMOVED",
            EvseStatus::Reserved => "RESERVED",
            EvseStatus::Unknown => "UNKNOWN",
        }
    }
}

/// A socket or cable on an EVSE. `id` is only unique within its EVSE.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Connector {
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_type: Option<String>,
    /// Maximum electric power in watts.
    #[serde(default, deserialize_with = "wire::lenient_u64")]
    pub max_electric_power: u64,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub tariff_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// OCPI tariff: an ordered list of elements, each an ordered list of price
/// components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tariff {
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub elements: Vec<TariffElement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TariffElement {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub price_components: Vec<PriceComponent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceComponent {
    #[serde(rename = "type", default)]
    pub component_type: String,
    #[serde(
        default,
        deserialize_with = "wire::lenient_decimal",
        serialize_with = "wire::decimal_as_number"
    )]
    pub price: Decimal,
    #[serde(
        default,
        deserialize_with = "wire::opt_lenient_decimal",
        serialize_with = "wire::opt_decimal_as_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub vat: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PriceComponent {
    pub fn is_energy(&self) -> bool {
        self.component_type == ENERGY_COMPONENT
    }
}

/// A charging session as reported by the session backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_datetime: Option<String>,
    #[serde(
        default,
        deserialize_with = "wire::opt_lenient_decimal",
        serialize_with = "wire::opt_decimal_as_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub kwh: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_fields: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Amount with and without VAT, as carried by CDR totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CdrPrice {
    #[serde(
        default,
        deserialize_with = "wire::lenient_decimal",
        serialize_with = "wire::decimal_as_number"
    )]
    pub excl_vat: Decimal,
    #[serde(
        default,
        deserialize_with = "wire::opt_lenient_decimal",
        serialize_with = "wire::opt_decimal_as_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub incl_vat: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdrLocation {
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Charge Detail Record: the billing record of a finished session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdrRecord {
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "wire::string_or_number")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdr_location: Option<CdrLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<CdrPrice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_energy_cost: Option<CdrPrice>,
    #[serde(
        default,
        deserialize_with = "wire::lenient_decimal",
        serialize_with = "wire::decimal_as_number"
    )]
    pub total_energy: Decimal,
    #[serde(
        default,
        deserialize_with = "wire::lenient_decimal",
        serialize_with = "wire::decimal_as_number"
    )]
    pub total_time: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// OCPI status code for a successful call.
pub const OCPI_SUCCESS: u32 = 1000;

/// Outcome of pushing a CDR to the billing network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushResult {
    #[serde(default)]
    pub status_code: u32,
    #[serde(default, alias = "message")]
    pub status_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl PushResult {
    pub fn is_success(&self) -> bool {
        self.status_code == OCPI_SUCCESS
    }
}
