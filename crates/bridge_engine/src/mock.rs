//! In-memory collaborators: a fixed Bangalore inventory and a session/billing
//! backend that keeps its state in a map.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use bridge_core::wire::parse_decimal;
use bridge_core::{
    CdrLocation, CdrPrice, CdrRecord, ChargeLocation, Coordinates, OCPI_SUCCESS, PushResult,
    SessionRecord, Tariff,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::BackendError;
use crate::backend::{BillingBackend, InventorySource, SessionBackend};
use crate::beckn::now_rfc3339;

/// Serves a fixed inventory, or fails every call when built unreachable.
#[derive(Debug, Clone)]
pub struct MockInventory {
    locations: Vec<ChargeLocation>,
    tariffs: Vec<Tariff>,
    unreachable: Option<String>,
}

impl MockInventory {
    pub fn new(locations: Vec<ChargeLocation>, tariffs: Vec<Tariff>) -> Self {
        MockInventory {
            locations,
            tariffs,
            unreachable: None,
        }
    }

    /// Three Bangalore sites (LOC001..LOC003) and tariffs TARIFF_001..004.
    pub fn bangalore() -> Result<Self, BackendError> {
        let locations = serde_json::from_value(bangalore_locations())
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let tariffs = serde_json::from_value(bangalore_tariffs())
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(Self::new(locations, tariffs))
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        MockInventory {
            locations: Vec::new(),
            tariffs: Vec::new(),
            unreachable: Some(reason.into()),
        }
    }

    fn check(&self) -> Result<(), BackendError> {
        match &self.unreachable {
            Some(reason) => Err(BackendError::Transport(reason.clone())),
            None => Ok(()),
        }
    }
}

impl InventorySource for MockInventory {
    fn fetch_all_locations(&self) -> Result<Vec<ChargeLocation>, BackendError> {
        self.check()?;
        debug!(count = self.locations.len(), "serving mock locations");
        Ok(self.locations.clone())
    }

    fn fetch_all_tariffs(&self) -> Result<Vec<Tariff>, BackendError> {
        self.check()?;
        Ok(self.tariffs.clone())
    }
}

fn bangalore_locations() -> Value {
    fn connector(id: &str, standard: &str, format: &str, power_type: &str, power: u64, tariff: &str) -> Value {
        json!({
            "id": id,
            "standard": standard,
            "format": format,
            "power_type": power_type,
            "max_electric_power": power,
            "tariff_ids": [tariff],
            "last_updated": "2023-12-15T10:30:00Z"
        })
    }

    json!([
        {
            "country_code": "IN",
            "party_id": "CPO",
            "id": "LOC001",
            "publish": true,
            "name": "Central Mall Charging Hub",
            "address": "123 MG Road, Bangalore",
            "city": "Bangalore",
            "postal_code": "560001",
            "state": "Karnataka",
            "country": "IND",
            "coordinates": {"latitude": "12.9716", "longitude": "77.5946"},
            "time_zone": "Asia/Kolkata",
            "operator": {"name": "Green Energy Solutions", "website": "https://greenenergy.com"},
            "facilities": ["PARKING", "RESTAURANT", "SHOPPING"],
            "evses": [{
                "uid": "EVSE001",
                "evse_id": "IN*CPO*E001",
                "status": "AVAILABLE",
                "connectors": [connector("1", "CCS_2", "CABLE", "DC", 50000, "TARIFF_001")]
            }],
            "last_updated": "2023-12-15T10:30:00Z"
        },
        {
            "country_code": "IN",
            "party_id": "CPO",
            "id": "LOC002",
            "publish": true,
            "name": "Tech Park Fast Charging",
            "address": "45 Electronic City, Bangalore",
            "city": "Bangalore",
            "postal_code": "560100",
            "state": "Karnataka",
            "country": "IND",
            "coordinates": {"latitude": "12.8456", "longitude": "77.6621"},
            "time_zone": "Asia/Kolkata",
            "operator": {"name": "Power Grid Charging", "website": "https://powergrid.com"},
            "facilities": ["PARKING", "WIFI"],
            "evses": [{
                "uid": "EVSE002",
                "evse_id": "IN*CPO*E002",
                "status": "AVAILABLE",
                "connectors": [
                    connector("1", "CHADEMO", "CABLE", "DC", 50000, "TARIFF_002"),
                    connector("2", "TYPE_2", "SOCKET", "AC_3_PHASE", 22000, "TARIFF_003")
                ]
            }],
            "last_updated": "2023-12-15T10:30:00Z"
        },
        {
            "country_code": "IN",
            "party_id": "CPO",
            "id": "LOC003",
            "publish": true,
            "name": "Airport Express Charging",
            "address": "Terminal 1, Kempegowda International Airport",
            "city": "Bangalore",
            "postal_code": "560300",
            "state": "Karnataka",
            "country": "IND",
            "coordinates": {"latitude": "13.1986", "longitude": "77.7066"},
            "time_zone": "Asia/Kolkata",
            "operator": {"name": "Airport Charging Network", "website": "https://airportcharging.com"},
            "facilities": ["PARKING", "RESTAURANT", "HOTEL"],
            "evses": [{
                "uid": "EVSE003",
                "evse_id": "IN*CPO*E003",
                "status": "CHARGING",
                "connectors": [connector("1", "CCS_2", "CABLE", "DC", 150000, "TARIFF_004")]
            }],
            "last_updated": "2023-12-15T10:30:00Z"
        }
    ])
}

fn bangalore_tariffs() -> Value {
    let tariffs = [
        ("TARIFF_001", 10.0, "Fast DC charging"),
        ("TARIFF_002", 8.0, "CHAdeMO charging"),
        ("TARIFF_003", 5.0, "Type 2 AC charging"),
        ("TARIFF_004", 15.0, "Ultra-fast DC charging"),
    ];
    Value::Array(
        tariffs
            .iter()
            .map(|(id, price, text)| {
                json!({
                    "country_code": "IN",
                    "party_id": "CPO",
                    "id": id,
                    "currency": "INR",
                    "type": "REGULAR",
                    "tariff_alt_text": [{"language": "en", "text": text}],
                    "elements": [{
                        "price_components": [
                            {"type": "ENERGY", "price": price, "vat": 18.0, "step_size": 1}
                        ]
                    }],
                    "last_updated": "2023-12-15T10:30:00Z"
                })
            })
            .collect(),
    )
}

/// Energy rate of generated CDRs, INR per kWh.
const CDR_RATE_PER_KWH: i64 = 10;
/// Energy reported for sessions the backend has never seen.
const SYNTHETIC_SESSION_KWH: (i64, u32) = (52, 1);
/// Energy assumed by a CDR for a session without any data.
const DEFAULT_CDR_KWH: (i64, u32) = (255, 1);

fn short_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", id[..8].to_ascii_uppercase())
}

/// Sessions and CDRs kept in memory.
///
/// Initiated sessions start `PENDING` and become `ACTIVE` once confirmed.
/// A status read for an id it has never seen answers a synthetic `ACTIVE`
/// session without storing it; only an update stores one.
#[derive(Debug, Default)]
pub struct MockSessionBackend {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    pushed: Mutex<Vec<CdrRecord>>,
}

impl MockSessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions().get(session_id).cloned()
    }

    /// CDRs pushed so far, oldest first.
    pub fn pushed_cdrs(&self) -> Vec<CdrRecord> {
        self.pushed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn synthetic_session(session_id: &str) -> SessionRecord {
        let now = now_rfc3339();
        SessionRecord {
            id: session_id.to_string(),
            status: Some("ACTIVE".into()),
            start_datetime: Some(now.clone()),
            kwh: Some(Decimal::new(SYNTHETIC_SESSION_KWH.0, SYNTHETIC_SESSION_KWH.1)),
            auth_method: Some("AUTH_REQUEST".into()),
            authorization_reference: Some("AUTHREF123".into()),
            last_updated: Some(now),
            ..Default::default()
        }
    }
}

impl SessionBackend for MockSessionBackend {
    fn initiate_session(
        &self,
        location_id: &str,
        evse_uid: &str,
        connector_id: &str,
        token: &str,
    ) -> Result<SessionRecord, BackendError> {
        let now = now_rfc3339();
        let session = SessionRecord {
            id: short_id("SESSION"),
            status: Some("PENDING".into()),
            location_id: Some(location_id.to_string()),
            evse_uid: Some(evse_uid.to_string()),
            connector_id: Some(connector_id.to_string()),
            token: Some(token.to_string()),
            start_datetime: Some(now.clone()),
            kwh: Some(Decimal::ZERO),
            auth_method: Some("AUTH_REQUEST".into()),
            authorization_reference: Some(short_id("AUTHREF")),
            last_updated: Some(now),
            ..Default::default()
        };
        info!(session_id = %session.id, location_id, evse_uid, connector_id, "mock session initiated");
        self.sessions().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn confirm_session(&self, session_id: &str) -> Result<SessionRecord, BackendError> {
        let mut sessions = self.sessions();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| BackendError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        let now = now_rfc3339();
        session.status = Some("ACTIVE".into());
        session.confirmation_time = Some(now.clone());
        session.last_updated = Some(now);
        session.message = Some("Session confirmed successfully".into());
        Ok(session.clone())
    }

    fn get_session_status(&self, session_id: &str) -> Result<SessionRecord, BackendError> {
        Ok(self
            .session(session_id)
            .unwrap_or_else(|| Self::synthetic_session(session_id)))
    }

    fn update_session(
        &self,
        session_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<SessionRecord, BackendError> {
        let mut sessions = self.sessions();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Self::synthetic_session(session_id));

        session.status = Some(
            fields
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("UPDATED")
                .to_string(),
        );
        if let Some(kwh) = fields
            .get("final_kwh")
            .or_else(|| fields.get("kwh"))
            .and_then(parse_decimal)
        {
            session.kwh = Some(kwh);
        }
        if let Some(end) = fields.get("end_datetime").and_then(Value::as_str) {
            session.end_datetime = Some(end.to_string());
        }
        session.updated_fields = Some(Value::Object(fields.clone()));
        session.last_updated = Some(now_rfc3339());
        session.message = Some("Session updated successfully".into());
        Ok(session.clone())
    }
}

/// Hours between two RFC 3339 timestamps, rounded to 2 decimals.
fn hours_between(start: &str, end: &str) -> Option<Decimal> {
    let start = DateTime::parse_from_rfc3339(start).ok()?;
    let end = DateTime::parse_from_rfc3339(end).ok()?;
    let seconds = (end - start).num_seconds().max(0);
    Some((Decimal::from(seconds) / Decimal::from(3600)).round_dp(2))
}

impl BillingBackend for MockSessionBackend {
    fn generate_cdr(
        &self,
        session_id: &str,
        hint: Option<&SessionRecord>,
    ) -> Result<CdrRecord, BackendError> {
        let session = match hint {
            Some(hint) => hint.clone(),
            None => self.session(session_id).unwrap_or_else(|| {
                let now = Utc::now();
                SessionRecord {
                    id: session_id.to_string(),
                    location_id: Some("LOC001".into()),
                    evse_uid: Some("EVSE001".into()),
                    connector_id: Some("1".into()),
                    status: Some("COMPLETED".into()),
                    start_datetime: Some((now - Duration::hours(2)).to_rfc3339()),
                    end_datetime: Some(now.to_rfc3339()),
                    kwh: Some(Decimal::new(DEFAULT_CDR_KWH.0, DEFAULT_CDR_KWH.1)),
                    auth_method: Some("AUTH_REQUEST".into()),
                    authorization_reference: Some("AUTHREF123".into()),
                    ..Default::default()
                }
            }),
        };

        let now = now_rfc3339();
        let start = session.start_datetime.clone().unwrap_or_else(|| now.clone());
        let end = session.end_datetime.clone().unwrap_or_else(|| now.clone());
        let energy = session
            .kwh
            .unwrap_or_else(|| Decimal::new(DEFAULT_CDR_KWH.0, DEFAULT_CDR_KWH.1));
        let excl_vat = energy
            .checked_mul(Decimal::from(CDR_RATE_PER_KWH))
            .ok_or_else(|| BackendError::Decode(format!("CDR cost for {energy} kWh overflows")))?;
        let incl_vat = excl_vat
            .checked_mul(Decimal::new(118, 2))
            .ok_or_else(|| BackendError::Decode(format!("CDR cost for {energy} kWh overflows")))?
            .round_dp(2);
        let cost = CdrPrice {
            excl_vat,
            incl_vat: Some(incl_vat),
        };

        let mut location_extra = Map::new();
        location_extra.insert(
            "evse_uid".into(),
            json!(session.evse_uid.as_deref().unwrap_or("EVSE001")),
        );
        location_extra.insert(
            "connector_id".into(),
            json!(session.connector_id.as_deref().unwrap_or("1")),
        );

        let cdr = CdrRecord {
            id: short_id("CDR"),
            session_id: session_id.to_string(),
            total_time: hours_between(&start, &end).unwrap_or(Decimal::TWO),
            start_date_time: Some(start),
            end_date_time: Some(end),
            auth_method: session.auth_method.clone().or(Some("AUTH_REQUEST".into())),
            authorization_reference: session.authorization_reference.clone(),
            invoice_reference_id: Some(short_id("INV")),
            currency: Some("INR".into()),
            cdr_location: Some(CdrLocation {
                id: session.location_id.clone().unwrap_or_else(|| "LOC001".into()),
                name: Some("Central Mall Charging Hub".into()),
                address: Some("123 MG Road, Bangalore".into()),
                coordinates: Some(Coordinates {
                    latitude: "12.9716".into(),
                    longitude: "77.5946".into(),
                }),
                extra: location_extra,
            }),
            total_cost: Some(cost.clone()),
            total_energy_cost: Some(cost),
            total_energy: energy,
            last_updated: Some(now),
            extra: Map::new(),
        };
        info!(cdr_id = %cdr.id, session_id, energy = %energy, "mock CDR generated");
        Ok(cdr)
    }

    fn push_cdr(&self, cdr: &CdrRecord) -> Result<PushResult, BackendError> {
        info!(cdr_id = %cdr.id, "mock CDR push");
        self.pushed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(cdr.clone());
        Ok(PushResult {
            status_code: OCPI_SUCCESS,
            status_message: "CDR pushed successfully".into(),
            data: Some(json!({
                "cdr_id": cdr.id,
                "session_id": cdr.session_id,
                "total_cost": cdr.total_cost,
                "invoice_reference_id": cdr.invoice_reference_id,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_bangalore_inventory() {
        let inventory = MockInventory::bangalore().unwrap();
        let locations = inventory.fetch_all_locations().unwrap();
        let tariffs = inventory.fetch_all_tariffs().unwrap();
        assert_eq!(locations.len(), 3);
        assert_eq!(locations[1].evses[0].connectors.len(), 2);
        assert_eq!(tariffs.len(), 4);
        assert_eq!(tariffs[1].elements[0].price_components[0].price, Decimal::from(8));
    }

    #[test]
    fn test_unreachable_inventory() {
        let inventory = MockInventory::unreachable("connection refused");
        assert_eq!(
            inventory.fetch_all_locations().unwrap_err(),
            BackendError::Transport("connection refused".into())
        );
    }

    #[test]
    fn test_session_lifecycle() {
        let backend = MockSessionBackend::new();
        let session = backend
            .initiate_session("LOC001", "EVSE001", "1", "TOKEN")
            .unwrap();
        assert_eq!(session.status.as_deref(), Some("PENDING"));

        let confirmed = backend.confirm_session(&session.id).unwrap();
        assert_eq!(confirmed.status.as_deref(), Some("ACTIVE"));
        assert!(confirmed.confirmation_time.is_some());

        let mut fields = Map::new();
        fields.insert("status".into(), json!("STOPPED"));
        fields.insert("final_kwh".into(), json!(25.5));
        let stopped = backend.update_session(&session.id, &fields).unwrap();
        assert_eq!(stopped.status.as_deref(), Some("STOPPED"));
        assert_eq!(stopped.kwh, Some(Decimal::from_str("25.5").unwrap()));
        assert_eq!(stopped.location_id.as_deref(), Some("LOC001"));
    }

    #[test]
    fn test_confirm_unknown_session() {
        let backend = MockSessionBackend::new();
        assert!(matches!(
            backend.confirm_session("NOPE"),
            Err(BackendError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_session_status_is_not_stored() {
        let backend = MockSessionBackend::new();
        let status = backend.get_session_status("SESSION123").unwrap();
        assert_eq!(status.status.as_deref(), Some("ACTIVE"));
        assert_eq!(status.kwh, Some(Decimal::new(52, 1)));
        assert!(backend.session("SESSION123").is_none());

        backend.get_session_status("SESSION456").unwrap();
        assert!(backend.sessions().is_empty());
    }

    #[test]
    fn test_update_stores_unknown_session() {
        let backend = MockSessionBackend::new();
        let mut fields = Map::new();
        fields.insert("status".into(), json!("CHARGING"));
        backend.update_session("SESSION123", &fields).unwrap();
        assert_eq!(
            backend.session("SESSION123").unwrap().status.as_deref(),
            Some("CHARGING")
        );
    }

    #[test]
    fn test_cdr_cost_overflow_is_an_error() {
        let backend = MockSessionBackend::new();
        let hint = SessionRecord {
            id: "S1".into(),
            kwh: Some(Decimal::MAX),
            ..Default::default()
        };
        assert!(matches!(
            backend.generate_cdr("S1", Some(&hint)),
            Err(BackendError::Decode(_))
        ));
        assert!(backend.pushed_cdrs().is_empty());
    }

    #[test]
    fn test_cdr_pricing() {
        let backend = MockSessionBackend::new();
        let hint = SessionRecord {
            id: "S1".into(),
            kwh: Some(Decimal::from_str("25.5").unwrap()),
            start_datetime: Some("2024-06-01T10:00:00Z".into()),
            end_datetime: Some("2024-06-01T11:30:00Z".into()),
            ..Default::default()
        };
        let cdr = backend.generate_cdr("S1", Some(&hint)).unwrap();
        let total = cdr.total_cost.clone().unwrap();
        assert_eq!(total.excl_vat, Decimal::from(255));
        assert_eq!(total.incl_vat, Some(Decimal::from_str("300.90").unwrap()));
        assert_eq!(cdr.total_time, Decimal::from_str("1.5").unwrap());
        assert!(cdr.id.starts_with("CDR_"));

        let pushed = backend.push_cdr(&cdr).unwrap();
        assert!(pushed.is_success());
        assert_eq!(backend.pushed_cdrs().len(), 1);
    }
}
