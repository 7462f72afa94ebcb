use bridge_core::money::format_total;
use bridge_core::wire::parse_decimal;
use bridge_core::{ConnectorRef, InventoryIndex};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{HandlerEnv, cancellation_terms, charging_point_tags, measure, quantity};
use crate::beckn::{BecknResponse, OrderRequest};

const ACTION: &str = "on_confirm";
/// Order ids are the transaction id cut to this many characters.
const ORDER_ID_LEN: usize = 24;

/// Confirm the order: payments are marked paid and the connector looked up
/// again to describe the charging point.
pub fn handle(request: &OrderRequest, index: &InventoryIndex, env: &HandlerEnv<'_>) -> BecknResponse {
    let mut warnings = Vec::new();
    let fulfillment_id = request.fulfillment_id();
    let selected = request.selected_measure();

    let found = index.find_by_fulfillment_id(fulfillment_id);
    if found.is_none() {
        warn!(fulfillment_id, "confirming an order for an unknown connector");
        warnings.push(format!("no connector found for fulfillment id {fulfillment_id}"));
    }

    let order = request.order();
    let quote = order.quote.clone().unwrap_or_else(|| json!({}));
    let quote_price = &quote["price"];
    let currency = quote_price["currency"]
        .as_str()
        .unwrap_or(env.pricing.default_currency())
        .to_string();

    let unit_price = match (parse_decimal(&quote_price["value"]), quantity(&selected)) {
        (Some(total), Some(qty)) if !qty.is_zero() => total.checked_div(qty).map(format_total),
        _ => None,
    };
    let unit_price = unit_price.unwrap_or_else(|| match &quote_price["value"] {
        Value::String(value) => value.clone(),
        Value::Number(value) => value.to_string(),
        _ => "0".to_string(),
    });

    let transaction_id = request
        .context
        .transaction_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let order_id: String = transaction_id.chars().take(ORDER_ID_LEN).collect();

    let payments: Vec<Value> = order
        .payments
        .iter()
        .cloned()
        .map(|mut payment| {
            if let Some(object) = payment.as_object_mut() {
                object.insert("status".into(), json!("PAID"));
            }
            payment
        })
        .collect();

    let billing = request.billing();
    info!(order_id = %order_id, fulfillment_id, "order confirmed");

    let body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {
                "id": order_id,
                "provider": {
                    "id": request.provider_id(),
                    "descriptor": provider_descriptor(request, found.as_ref())
                },
                "items": [{
                    "id": request.first_item().and_then(|item| item.id.clone()),
                    "descriptor": {"code": "energy"},
                    "price": {"value": unit_price, "currency": format!("{currency}/kWh")},
                    "quantity": {
                        "available": {
                            "measure": {
                                "value": found.map_or_else(
                                    || "0".to_string(),
                                    |f| f.connector.max_electric_power.to_string()
                                ),
                                "unit": "kW"
                            }
                        },
                        "selected": {
                            "measure": measure(selected.value.as_deref(), "0", selected.unit.as_deref(), "kWh")
                        }
                    }
                }],
                "fulfillments": [{
                    "id": fulfillment_id,
                    "customer": {
                        "person": {"name": billing.name.clone().unwrap_or_default()},
                        "contact": {"phone": billing.phone.clone().unwrap_or_default()}
                    },
                    "type": "CHARGING",
                    "state": {"descriptor": {"code": "payment-completed"}},
                    "stops": stops(found.as_ref()),
                    "tags": charging_point_tags("Charging Point", found.as_ref())
                }],
                "billing": {"email": billing.email, "phone": billing.phone},
                "quote": quote,
                "payments": payments,
                "cancellation_terms": cancellation_terms(env.config)
            }
        }
    });
    BecknResponse::with_warnings(body, warnings)
}

fn provider_descriptor(request: &OrderRequest, found: Option<&ConnectorRef<'_>>) -> Value {
    let operator = found.and_then(|f| f.location.operator_name());
    let images = request
        .order()
        .provider
        .as_ref()
        .and_then(|p| p.descriptor.as_ref())
        .and_then(|d| d.get("images"))
        .cloned()
        .unwrap_or_else(|| json!([]));
    json!({
        "name": operator.or(request.provider_id()).unwrap_or("EV Charging Network"),
        "short_desc": operator.unwrap_or("EV Charging Services"),
        "images": images
    })
}

fn stops(found: Option<&ConnectorRef<'_>>) -> Value {
    let now = Utc::now();
    let at = |minutes: i64| (now + Duration::minutes(minutes)).to_rfc3339();

    let mut start = json!({
        "type": "start",
        "time": {
            "timestamp": at(0),
            "range": {"start": at(0), "end": at(10)}
        },
        "instructions": {
            "name": "Charging instructions",
            "short_desc": "To start your charging, go to the allocated charger and press 'start' in your app"
        }
    });
    if let Some(gps) = found.and_then(|f| f.location.coordinates.as_ref()).map(|c| c.gps()) {
        start["location"] = json!({"gps": gps});
    }

    json!([
        start,
        {
            "type": "end",
            "time": {
                "timestamp": at(30),
                "range": {"start": at(30), "end": at(40)}
            }
        }
    ])
}

/// `on_confirm` with an empty order.
pub fn failed(request: &OrderRequest, reason: &str) -> BecknResponse {
    warn!(reason, "confirm failed");
    let body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {"id": null, "items": [], "fulfillments": [], "quote": {}, "payments": []}
        }
    });
    BecknResponse::with_warnings(body, vec![reason.to_string()])
}
