//! Blocking OCPI client. Handlers reach it through the engine's collaborator
//! traits, always from `spawn_blocking`.

use std::collections::HashSet;

use bridge_core::{CdrRecord, ChargeLocation, OCPI_SUCCESS, PushResult, SessionRecord, Tariff};
use bridge_engine::BackendError;
use bridge_engine::backend::{BillingBackend, InventorySource, SessionBackend};
use bridge_engine::config::OcpiSettings;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{info, warn};
use ureq::RequestBuilder;

/// Upper bound on pages walked for one list.
const MAX_PAGES: usize = 1000;

pub struct OcpiClient {
    settings: OcpiSettings,
    agent: ureq::Agent,
}

/// Strip an OCPI `{data, status_code, status_message}` envelope. Bare payloads
/// pass through.
pub fn unwrap_envelope(body: Value) -> Result<Value, BackendError> {
    let mut envelope = match body {
        Value::Object(envelope) => envelope,
        other => return Ok(other),
    };
    if !envelope.contains_key("data") {
        return Ok(Value::Object(envelope));
    }
    if let Some(code) = envelope.get("status_code").and_then(Value::as_u64) {
        if code != u64::from(OCPI_SUCCESS) {
            let message = envelope
                .get("status_message")
                .and_then(Value::as_str)
                .unwrap_or("no status message");
            return Err(BackendError::Rejected(format!("{code}: {message}")));
        }
    }
    Ok(envelope.remove("data").unwrap_or(Value::Null))
}

/// Keep the first entry for every id.
pub fn dedup_by_id<T>(entries: Vec<T>, id: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(id(entry).to_string()))
        .collect()
}

/// Identity of a raw list entry: its `id`, or the whole entry when it has none.
fn entry_key(raw: &Value) -> String {
    raw.get("id").unwrap_or(raw).to_string()
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
}

fn transport(err: ureq::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

impl OcpiClient {
    pub fn new(settings: OcpiSettings) -> Self {
        OcpiClient {
            settings,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    fn base(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    /// CPO inventory module url, e.g. `<base>/ocpi/cpo/2.2.1/locations`.
    pub fn inventory_url(&self, module: &str) -> String {
        format!("{}/ocpi/cpo/{}/{module}", self.base(), self.settings.version)
    }

    /// Session and CDR url, e.g. `<base>/2.2.1/sessions/S1/confirm`.
    pub fn session_url(&self, path: &str) -> String {
        format!("{}/{}/{path}", self.base(), self.settings.version)
    }

    /// Url of one session, with the id encoded as a single path segment.
    pub fn session_resource_url(&self, session_id: &str, suffix: &str) -> String {
        self.session_url(&format!("sessions/{}{suffix}", urlencoding::encode(session_id)))
    }

    fn authorize<B>(&self, request: RequestBuilder<B>) -> RequestBuilder<B> {
        request
            .header("Authorization", &format!("Token {}", self.settings.token))
            .header("OCPI-from-country-code", &self.settings.country_code)
            .header("OCPI-from-party-id", "BEC")
            .header("OCPI-to-country-code", &self.settings.country_code)
            .header("OCPI-to-party-id", &self.settings.party_id)
    }

    fn read(&self, response: ureq::http::Response<ureq::Body>) -> Result<Value, BackendError> {
        let body: Value = response
            .into_body()
            .read_json()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        unwrap_envelope(body)
    }

    fn get(&self, url: &str) -> Result<Value, BackendError> {
        let response = self.authorize(self.agent.get(url)).call().map_err(transport)?;
        self.read(response)
    }

    fn post_empty(&self, url: &str) -> Result<Value, BackendError> {
        let response = self
            .authorize(self.agent.post(url))
            .send_empty()
            .map_err(transport)?;
        self.read(response)
    }

    fn send(&self, method: &str, url: &str, body: &Value) -> Result<Value, BackendError> {
        let response = match method {
            "PUT" => self.authorize(self.agent.put(url)).send_json(body),
            _ => self.authorize(self.agent.post(url)).send_json(body),
        }
        .map_err(transport)?;
        self.read(response)
    }

    /// Walk a paginated list until an empty or short page, or a page that
    /// brings no entry not already seen.
    fn fetch_pages(&self, module: &str) -> Result<Vec<Value>, BackendError> {
        let url = self.inventory_url(module);
        let limit = self.settings.page_size.max(1);
        let mut offset = 0;
        let mut all = Vec::new();
        let mut seen = HashSet::new();

        for _ in 0..MAX_PAGES {
            info!(module, offset, limit, "fetching OCPI page");
            let response = self
                .authorize(self.agent.get(&url))
                .query("limit", limit.to_string())
                .query("offset", offset.to_string())
                .call()
                .map_err(transport)?;
            let page = match self.read(response)? {
                Value::Array(page) => page,
                other => return Err(BackendError::Decode(format!("expected a list of {module}, got {other}"))),
            };
            let fetched = page.len();
            let fresh = page.iter().filter(|raw| seen.insert(entry_key(raw))).count();
            all.extend(page);
            if fetched < limit {
                info!(module, total = all.len(), "OCPI list fetched");
                return Ok(all);
            }
            if fresh == 0 {
                warn!(module, offset, "OCPI page repeats earlier entries, stopping");
                return Ok(all);
            }
            offset += limit;
        }
        warn!(module, pages = MAX_PAGES, total = all.len(), "OCPI list truncated at page cap");
        Ok(all)
    }

    fn fetch_list<T: DeserializeOwned>(&self, module: &str) -> Result<Vec<T>, BackendError> {
        let mut entries = Vec::new();
        for raw in self.fetch_pages(module)? {
            match serde_json::from_value(raw) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(module, error = %err, "skipping undecodable OCPI entry"),
            }
        }
        Ok(entries)
    }
}

impl InventorySource for OcpiClient {
    fn fetch_all_locations(&self) -> Result<Vec<ChargeLocation>, BackendError> {
        let locations = self.fetch_list::<ChargeLocation>("locations")?;
        Ok(dedup_by_id(locations, |l| l.id.as_str()))
    }

    fn fetch_all_tariffs(&self) -> Result<Vec<Tariff>, BackendError> {
        let tariffs = self.fetch_list::<Tariff>("tariffs")?;
        Ok(dedup_by_id(tariffs, |t| t.id.as_str()))
    }
}

impl SessionBackend for OcpiClient {
    fn initiate_session(
        &self,
        location_id: &str,
        evse_uid: &str,
        connector_id: &str,
        token: &str,
    ) -> Result<SessionRecord, BackendError> {
        let payload = json!({
            "location_id": location_id,
            "evse_uid": evse_uid,
            "connector_id": connector_id,
            "token": token
        });
        decode(self.send("POST", &self.session_url("sessions"), &payload)?)
    }

    fn confirm_session(&self, session_id: &str) -> Result<SessionRecord, BackendError> {
        decode(self.post_empty(&self.session_resource_url(session_id, "/confirm"))?)
    }

    fn get_session_status(&self, session_id: &str) -> Result<SessionRecord, BackendError> {
        decode(self.get(&self.session_resource_url(session_id, ""))?)
    }

    fn update_session(
        &self,
        session_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<SessionRecord, BackendError> {
        let url = self.session_resource_url(session_id, "");
        decode(self.send("PUT", &url, &Value::Object(fields.clone()))?)
    }
}

impl BillingBackend for OcpiClient {
    fn generate_cdr(
        &self,
        session_id: &str,
        hint: Option<&SessionRecord>,
    ) -> Result<CdrRecord, BackendError> {
        let url = self.session_resource_url(session_id, "/cdr");
        let body = match hint {
            Some(hint) => {
                let hint = serde_json::to_value(hint).map_err(|e| BackendError::Decode(e.to_string()))?;
                self.send("POST", &url, &hint)?
            }
            None => self.post_empty(&url)?,
        };
        decode(body)
    }

    /// The push answer is itself the OCPI status envelope.
    fn push_cdr(&self, cdr: &CdrRecord) -> Result<PushResult, BackendError> {
        let payload = serde_json::to_value(cdr).map_err(|e| BackendError::Decode(e.to_string()))?;
        let response = self
            .authorize(self.agent.post(&self.session_url("cdrs")))
            .send_json(&payload)
            .map_err(transport)?;
        response
            .into_body()
            .read_json::<PushResult>()
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Offsets = Arc<Mutex<Vec<usize>>>;

    fn client() -> OcpiClient {
        OcpiClient::new(OcpiSettings {
            base_url: "https://cpo.example.com/".into(),
            ..Default::default()
        })
    }

    fn client_for(base_url: String, page_size: usize) -> OcpiClient {
        OcpiClient::new(OcpiSettings {
            base_url,
            page_size,
            ..Default::default()
        })
    }

    /// Serve `router` on an ephemeral local port and return its base url.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn location(id: &str) -> Value {
        json!({"id": id, "coordinates": {"latitude": "12.9716", "longitude": "77.5946"}})
    }

    fn requested_offset(offsets: &Offsets, params: &HashMap<String, String>) -> usize {
        let offset = params.get("offset").and_then(|o| o.parse().ok()).unwrap_or(0);
        offsets.lock().unwrap().push(offset);
        offset
    }

    async fn paged_locations(
        State(offsets): State<Offsets>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let page = match requested_offset(&offsets, &params) {
            0 => vec![location("L1"), location("L2")],
            2 => vec![location("L3"), location("L1")],
            4 => vec![location("L4")],
            _ => Vec::new(),
        };
        Json(json!({"data": page, "status_code": 1000, "status_message": "Success"}))
    }

    async fn offset_blind_locations(
        State(offsets): State<Offsets>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        requested_offset(&offsets, &params);
        Json(json!({"data": [location("L1"), location("L2")], "status_code": 1000}))
    }

    async fn session(Path(id): Path<String>) -> Json<Value> {
        if id == "GONE" {
            return Json(json!({"data": null, "status_code": 2003, "status_message": "Unknown session"}));
        }
        Json(json!({"data": {"id": id, "status": "ACTIVE"}, "status_code": 1000}))
    }

    async fn cdrs(Json(cdr): Json<Value>) -> Json<Value> {
        if cdr["id"] == "CDR_REJECTED" {
            return Json(json!({"status_code": 2001, "status_message": "Invalid CDR"}));
        }
        Json(json!({"status_code": 1000, "status_message": "Success", "data": {"cdr_id": cdr["id"]}}))
    }

    #[tokio::test]
    async fn test_fetch_walks_pages_until_short_page() {
        let offsets = Offsets::default();
        let router = Router::new()
            .route("/ocpi/cpo/2.2.1/locations", get(paged_locations))
            .with_state(offsets.clone());
        let client = client_for(serve(router).await, 2);

        let locations = tokio::task::spawn_blocking(move || client.fetch_all_locations())
            .await
            .unwrap()
            .unwrap();

        let ids: Vec<&str> = locations.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["L1", "L2", "L3", "L4"]);
        assert_eq!(*offsets.lock().unwrap(), vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_fetch_stops_when_offset_is_ignored() {
        let offsets = Offsets::default();
        let router = Router::new()
            .route("/ocpi/cpo/2.2.1/locations", get(offset_blind_locations))
            .with_state(offsets.clone());
        let client = client_for(serve(router).await, 2);

        let locations = tokio::task::spawn_blocking(move || client.fetch_all_locations())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(locations.len(), 2);
        assert_eq!(*offsets.lock().unwrap(), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_session_reads_and_rejections() {
        let router = Router::new().route("/2.2.1/sessions/{id}", get(session));
        let client = client_for(serve(router).await, 100);

        let (found, gone) = tokio::task::spawn_blocking(move || {
            (client.get_session_status("A/B?x"), client.get_session_status("GONE"))
        })
        .await
        .unwrap();

        let found = found.unwrap();
        assert_eq!(found.id, "A/B?x");
        assert_eq!(found.status.as_deref(), Some("ACTIVE"));
        assert_eq!(gone.unwrap_err(), BackendError::Rejected("2003: Unknown session".into()));
    }

    #[tokio::test]
    async fn test_push_cdr_reports_status_code() {
        let router = Router::new().route("/2.2.1/cdrs", post(cdrs));
        let client = client_for(serve(router).await, 100);
        let cdr = |id: &str| CdrRecord {
            id: id.into(),
            session_id: "S1".into(),
            ..Default::default()
        };
        let (accepted, rejected) = (cdr("CDR_1"), cdr("CDR_REJECTED"));

        let (accepted, rejected) = tokio::task::spawn_blocking(move || {
            (client.push_cdr(&accepted), client.push_cdr(&rejected))
        })
        .await
        .unwrap();

        let accepted = accepted.unwrap();
        assert!(accepted.is_success());
        assert_eq!(accepted.data.unwrap()["cdr_id"], "CDR_1");
        let rejected = rejected.unwrap();
        assert_eq!(rejected.status_code, 2001);
        assert!(!rejected.is_success());
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.inventory_url("locations"),
            "https://cpo.example.com/ocpi/cpo/2.2.1/locations"
        );
        assert_eq!(
            client.session_url("sessions/S1/confirm"),
            "https://cpo.example.com/2.2.1/sessions/S1/confirm"
        );
        assert_eq!(
            client.session_resource_url("A/B?x", "/cdr"),
            "https://cpo.example.com/2.2.1/sessions/A%2FB%3Fx/cdr"
        );
    }

    #[test]
    fn test_unwrap_envelope() {
        let data = unwrap_envelope(json!({"data": [{"id": "LOC1"}], "status_code": 1000})).unwrap();
        assert_eq!(data, json!([{"id": "LOC1"}]));

        let bare = unwrap_envelope(json!({"id": "S1", "status": "ACTIVE"})).unwrap();
        assert_eq!(bare["id"], "S1");

        let rejected = unwrap_envelope(json!({
            "data": null,
            "status_code": 2003,
            "status_message": "Unknown location"
        }));
        assert_eq!(
            rejected,
            Err(BackendError::Rejected("2003: Unknown location".into()))
        );
    }

    #[test]
    fn test_dedup_keeps_first() {
        let entries = vec![("A", 1), ("B", 2), ("A", 3)];
        let kept = dedup_by_id(entries, |e| e.0);
        assert_eq!(kept, vec![("A", 1), ("B", 2)]);
    }
}
