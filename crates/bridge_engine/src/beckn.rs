//! Beckn documents: the context envelope and the request variants the bridge
//! answers.

use std::fmt;

use bridge_core::wire;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::RequestError;

/// Current UTC time in RFC 3339.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Search,
    Select,
    Init,
    Confirm,
    Status,
    Update,
    Cdr,
}

impl Action {
    pub fn parse(action: &str) -> Option<Action> {
        match action {
            "search" => Some(Action::Search),
            "select" => Some(Action::Select),
            "init" => Some(Action::Init),
            "confirm" => Some(Action::Confirm),
            "status" => Some(Action::Status),
            "update" => Some(Action::Update),
            "cdr" => Some(Action::Cdr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::Select => "select",
            Action::Init => "init",
            Action::Confirm => "confirm",
            Action::Status => "status",
            Action::Update => "update",
            Action::Cdr => "cdr",
        }
    }

    /// The `on_*` action answering this one.
    pub fn response(&self) -> &'static str {
        match self {
            Action::Search => "on_search",
            Action::Select => "on_select",
            Action::Init => "on_init",
            Action::Confirm => "on_confirm",
            Action::Status => "on_status",
            Action::Update => "on_update",
            Action::Cdr => "on_cdr",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The Beckn `context` envelope. Unknown keys are carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bap_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bap_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpp_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Context {
    /// A copy of this context for the reply: new action, fresh message id and
    /// timestamp. The request context is left as is.
    pub fn reply(&self, action: &str) -> Context {
        Context {
            action: action.to_string(),
            message_id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp: Some(now_rfc3339()),
            ..self.clone()
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// A `{value, unit}` measure. Values are kept as text, as sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    #[serde(default, deserialize_with = "wire::opt_string_or_number")]
    pub value: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectedQuantity {
    #[serde(default)]
    pub measure: Option<Measure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemQuantity {
    #[serde(default)]
    pub selected: Option<SelectedQuantity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(default, deserialize_with = "wire::opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub quantity: Option<ItemQuantity>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub add_ons: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderItem {
    pub fn selected_measure(&self) -> Measure {
        self.quantity
            .as_ref()
            .and_then(|q| q.selected.as_ref())
            .and_then(|s| s.measure.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillmentRef {
    #[serde(default, deserialize_with = "wire::opt_string_or_number")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRef {
    #[serde(default, deserialize_with = "wire::opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub descriptor: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Billing {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `message.order` body shared by every post-search step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    #[serde(default, deserialize_with = "wire::opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderRef>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub items: Vec<OrderItem>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub fulfillments: Vec<FulfillmentRef>,
    #[serde(default)]
    pub billing: Option<Billing>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub payments: Vec<Value>,
    #[serde(default)]
    pub payment: Option<Value>,
    #[serde(default)]
    pub quote: Option<Value>,
    #[serde(default)]
    pub update: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderMessage {
    #[serde(default)]
    pub order: Order,
}

/// Request body for select, init, confirm, status, update and cdr.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRequest {
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub message: OrderMessage,
}

impl OrderRequest {
    pub fn order(&self) -> &Order {
        &self.message.order
    }

    pub fn first_item(&self) -> Option<&OrderItem> {
        self.order().items.first()
    }

    pub fn item_id(&self) -> &str {
        self.first_item()
            .and_then(|item| item.id.as_deref())
            .unwrap_or_default()
    }

    pub fn selected_measure(&self) -> Measure {
        self.first_item()
            .map(OrderItem::selected_measure)
            .unwrap_or_default()
    }

    pub fn fulfillment_id(&self) -> &str {
        self.order()
            .fulfillments
            .first()
            .and_then(|f| f.id.as_deref())
            .unwrap_or_default()
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.order().provider.as_ref().and_then(|p| p.id.as_deref())
    }

    pub fn billing(&self) -> Billing {
        self.order().billing.clone().unwrap_or_default()
    }

    /// Session ids travel as the order id.
    pub fn session_id(&self) -> Result<&str, RequestError> {
        self.order()
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(RequestError::MissingSessionId)
    }

    pub fn update_fields(&self) -> Map<String, Value> {
        self.order().update.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circle {
    #[serde(default)]
    pub radius: Option<Measure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchLocation {
    #[serde(default)]
    pub gps: Option<String>,
    #[serde(default)]
    pub circle: Option<Circle>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchStop {
    #[serde(default)]
    pub location: Option<SearchLocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentFulfillment {
    #[serde(default)]
    pub start: Option<SearchStop>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub fulfillment: Option<IntentFulfillment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMessage {
    #[serde(default)]
    pub intent: Option<Intent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub message: SearchMessage,
}

impl SearchRequest {
    /// `message.intent.fulfillment.start.location`
    pub fn location_criteria(&self) -> Result<&SearchLocation, RequestError> {
        self.message
            .intent
            .as_ref()
            .and_then(|i| i.fulfillment.as_ref())
            .and_then(|f| f.start.as_ref())
            .and_then(|s| s.location.as_ref())
            .ok_or(RequestError::MissingLocation)
    }

    /// The search point, parsed from a `"lat,lon"` string.
    pub fn target(&self) -> Result<(f64, f64), RequestError> {
        let gps = self
            .location_criteria()?
            .gps
            .as_deref()
            .filter(|gps| !gps.trim().is_empty())
            .ok_or(RequestError::MissingGps)?;
        parse_gps(gps)
    }

    /// Radius from `location.circle.radius`, when the buyer sent one in km.
    pub fn radius_km(&self) -> Option<f64> {
        let radius = self.location_criteria().ok()?.circle.as_ref()?.radius.as_ref()?;
        let value = radius.value.as_deref()?.trim().parse::<f64>().ok()?;
        let km = match radius.unit.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("km") | Some("kilometer") | Some("kilometers") => value,
            Some("m") | Some("meter") | Some("meters") => value / 1000.0,
            Some(_) => return None,
        };
        (km.is_finite() && km > 0.0).then_some(km)
    }
}

pub fn parse_gps(gps: &str) -> Result<(f64, f64), RequestError> {
    let invalid = || RequestError::InvalidGps(gps.to_string());
    let (lat, lon) = gps.split_once(',').ok_or_else(invalid)?;
    let lat = lat.trim().parse::<f64>().map_err(|_| invalid())?;
    let lon = lon.trim().parse::<f64>().map_err(|_| invalid())?;
    if !lat.is_finite() || !lon.is_finite() {
        return Err(invalid());
    }
    Ok((lat, lon))
}

/// A Beckn request, tagged by its `context.action`.
#[derive(Debug, Clone)]
pub enum BecknRequest {
    Search(SearchRequest),
    Select(OrderRequest),
    Init(OrderRequest),
    Confirm(OrderRequest),
    Status(OrderRequest),
    Update(OrderRequest),
    Cdr(OrderRequest),
}

impl BecknRequest {
    pub fn from_value(value: Value) -> Result<Self, RequestError> {
        let action = value
            .pointer("/context/action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let action =
            Action::parse(&action).ok_or_else(|| RequestError::UnknownAction(action.clone()))?;
        Self::parse_as(action, value)
    }

    /// Parse `value` as a request for `action`, whatever its context says.
    pub fn parse_as(action: Action, value: Value) -> Result<Self, RequestError> {
        let malformed = |e: serde_json::Error| RequestError::Malformed(e.to_string());
        let order = |value: Value| serde_json::from_value::<OrderRequest>(value).map_err(malformed);
        Ok(match action {
            Action::Search => {
                BecknRequest::Search(serde_json::from_value(value).map_err(malformed)?)
            }
            Action::Select => BecknRequest::Select(order(value)?),
            Action::Init => BecknRequest::Init(order(value)?),
            Action::Confirm => BecknRequest::Confirm(order(value)?),
            Action::Status => BecknRequest::Status(order(value)?),
            Action::Update => BecknRequest::Update(order(value)?),
            Action::Cdr => BecknRequest::Cdr(order(value)?),
        })
    }

    pub fn action(&self) -> Action {
        match self {
            BecknRequest::Search(_) => Action::Search,
            BecknRequest::Select(_) => Action::Select,
            BecknRequest::Init(_) => Action::Init,
            BecknRequest::Confirm(_) => Action::Confirm,
            BecknRequest::Status(_) => Action::Status,
            BecknRequest::Update(_) => Action::Update,
            BecknRequest::Cdr(_) => Action::Cdr,
        }
    }

    pub fn context(&self) -> &Context {
        match self {
            BecknRequest::Search(r) => &r.context,
            BecknRequest::Select(r)
            | BecknRequest::Init(r)
            | BecknRequest::Confirm(r)
            | BecknRequest::Status(r)
            | BecknRequest::Update(r)
            | BecknRequest::Cdr(r) => &r.context,
        }
    }
}

/// A response document plus the warnings raised while building it.
///
/// Warnings stay in-process; only `body` goes on the wire.
#[derive(Debug, Clone)]
pub struct BecknResponse {
    pub body: Value,
    pub warnings: Vec<String>,
}

impl BecknResponse {
    pub fn new(body: Value) -> Self {
        BecknResponse {
            body,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(body: Value, warnings: Vec<String>) -> Self {
        BecknResponse { body, warnings }
    }

    pub fn action(&self) -> &str {
        self.body
            .pointer("/context/action")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn order(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.body.pointer("/message/order").unwrap_or(&NULL)
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_on_action() {
        let request = BecknRequest::from_value(json!({
            "context": {"action": "status", "transaction_id": "txn-1"},
            "message": {"order": {"id": "SESSION123"}}
        }))
        .unwrap();
        assert_eq!(request.action(), Action::Status);
        assert_eq!(request.context().transaction_id.as_deref(), Some("txn-1"));
        match request {
            BecknRequest::Status(r) => assert_eq!(r.session_id(), Ok("SESSION123")),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action() {
        let err = BecknRequest::from_value(json!({"context": {"action": "refund"}})).unwrap_err();
        assert_eq!(err, RequestError::UnknownAction("refund".into()));
    }

    #[test]
    fn test_malformed_order() {
        let err = BecknRequest::from_value(json!({
            "context": {"action": "select"},
            "message": {"order": {"items": "not a list"}}
        }))
        .unwrap_err();
        assert!(matches!(err, RequestError::Malformed(_)));
    }

    #[test]
    fn test_reply_context_copies_and_overrides() {
        let context: Context = serde_json::from_value(json!({
            "domain": "ev-charging",
            "action": "search",
            "transaction_id": "txn-1",
            "message_id": "msg-1",
            "ttl": "PT30S"
        }))
        .unwrap();

        let reply = context.reply("on_search");
        assert_eq!(reply.action, "on_search");
        assert_eq!(reply.transaction_id.as_deref(), Some("txn-1"));
        assert_ne!(reply.message_id.as_deref(), Some("msg-1"));
        assert_eq!(reply.extra["ttl"], "PT30S");
        assert_eq!(context.action, "search");
        assert_eq!(context.message_id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn test_search_criteria() {
        let request: SearchRequest = serde_json::from_value(json!({
            "context": {"action": "search"},
            "message": {"intent": {"fulfillment": {"start": {"location": {
                "gps": "12.9716, 77.5946",
                "circle": {"radius": {"value": "5000", "unit": "m"}}
            }}}}}
        }))
        .unwrap();
        assert_eq!(request.target(), Ok((12.9716, 77.5946)));
        assert_eq!(request.radius_km(), Some(5.0));
    }

    #[test]
    fn test_search_criteria_errors() {
        let missing: SearchRequest = serde_json::from_value(json!({"message": {"intent": {}}})).unwrap();
        assert_eq!(missing.target(), Err(RequestError::MissingLocation));

        let no_gps: SearchRequest = serde_json::from_value(json!({
            "message": {"intent": {"fulfillment": {"start": {"location": {}}}}}
        }))
        .unwrap();
        assert_eq!(no_gps.target(), Err(RequestError::MissingGps));

        assert_eq!(parse_gps("north,east"), Err(RequestError::InvalidGps("north,east".into())));
        assert_eq!(parse_gps("12.5"), Err(RequestError::InvalidGps("12.5".into())));
    }

    #[test]
    fn test_order_accessors() {
        let request: OrderRequest = serde_json::from_value(json!({
            "context": {"action": "init"},
            "message": {"order": {
                "provider": {"id": "CPO"},
                "items": [{"id": "TARIFF_001_50000", "quantity": {"selected": {"measure": {"value": 25, "unit": "kWh"}}}}],
                "fulfillments": [{"id": "EVSE001_1"}],
                "billing": {"name": "Asha", "email": "asha@example.com"}
            }}
        }))
        .unwrap();
        assert_eq!(request.item_id(), "TARIFF_001_50000");
        assert_eq!(request.fulfillment_id(), "EVSE001_1");
        assert_eq!(request.provider_id(), Some("CPO"));
        assert_eq!(
            request.selected_measure(),
            Measure {
                value: Some("25".into()),
                unit: Some("kWh".into())
            }
        );
        assert_eq!(request.billing().name.as_deref(), Some("Asha"));
        assert_eq!(request.session_id(), Err(RequestError::MissingSessionId));
    }
}
