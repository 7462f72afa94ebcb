use bridge_core::money::{format_price, format_total, line_total};
use bridge_core::{ConnectorRef, InventoryIndex, ResolveError};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{HandlerEnv, charging_point_tags, quantity};
use crate::beckn::{BecknResponse, OrderRequest};

const ACTION: &str = "on_select";

/// Price the buyer's chosen connector for the requested quantity.
///
/// A fulfillment id that no longer resolves still gets a full `on_select`
/// document, with zero prices and a recorded warning.
pub fn handle(request: &OrderRequest, index: &InventoryIndex, env: &HandlerEnv<'_>) -> BecknResponse {
    let item_id = request.item_id();
    let fulfillment_id = request.fulfillment_id();
    let selected = request.selected_measure();
    let mut warnings = Vec::new();

    let found = match index.require(fulfillment_id) {
        Ok(found) => {
            info!(fulfillment_id, location_id = %found.location.id, "matched connector");
            Some(found)
        }
        Err(err) => {
            warn!(fulfillment_id, "no matching connector for selection");
            warnings.push(err.to_string());
            None
        }
    };

    let mut unit_price: Option<Decimal> = None;
    let mut currency = env.pricing.default_currency().to_string();
    if let Some(found) = &found {
        if env.pricing.decomposition_enabled() {
            match env.pricing.resolve(found.connector, index.tariff_lookup()) {
                Ok(unit) => {
                    unit_price = Some(unit.price);
                    currency = unit.currency;
                }
                Err(err @ ResolveError::TariffNotFound { .. }) => {
                    warn!(fulfillment_id, error = %err, "selected connector has no usable tariff");
                    warnings.push(err.to_string());
                }
                Err(err) => warnings.push(err.to_string()),
            }
        }
    }

    let total = match (unit_price, quantity(&selected)) {
        (Some(unit), Some(qty)) => line_total(unit, qty),
        (Some(_), None) => {
            warnings.push(format!(
                "selected quantity {:?} is not a number",
                selected.value.as_deref().unwrap_or_default()
            ));
            None
        }
        _ => None,
    };
    let total_text = total.map_or_else(|| "0".to_string(), format_total);

    let mut item_price = json!({
        "value": unit_price.map_or_else(|| "0".to_string(), format_price),
        "currency": format!("{currency}/kWh")
    });
    if !env.pricing.decomposition_enabled() {
        if let Some(found) = &found {
            item_price["tariff_ids"] = json!(found.connector.tariff_ids);
        }
    }

    let selected_json = json!({"measure": {"value": selected.value, "unit": selected.unit}});
    let mut items = vec![json!({
        "id": item_id,
        "descriptor": {"code": "energy"},
        "price": item_price,
        "quantity": {
            "available": {
                "measure": {
                    "value": found.map_or_else(
                        || "0".to_string(),
                        |f| f.connector.max_electric_power.to_string()
                    ),
                    "unit": "Wh"
                }
            },
            "selected": selected_json
        }
    })];

    let mut breakup = vec![json!({
        "item": {
            "id": item_id,
            "descriptor": {"name": "Estimated units consumed"},
            "quantity": {"selected": selected_json}
        },
        "price": {"value": total_text, "currency": currency}
    })];

    if request.first_item().is_some_and(|item| !item.add_ons.is_empty()) {
        let add_on_id = format!("{item_id}-addon-1");
        items.push(json!({
            "id": add_on_id,
            "descriptor": {"code": "add-on-item", "name": "Free car wash"},
            "price": {"value": "0", "currency": currency}
        }));
        breakup.push(json!({
            "item": {
                "add_ons": [{"id": add_on_id}],
                "descriptor": {"name": "Free car wash"}
            },
            "price": {"value": "0", "currency": currency}
        }));
    }

    let now = Utc::now();
    let body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {
                "provider": {
                    "id": request.provider_id().map(str::to_string).or_else(|| env.config.provider_id.clone()),
                    "descriptor": provider_descriptor(found.as_ref())
                },
                "items": items,
                "fulfillments": [{
                    "id": fulfillment_id,
                    "type": "CHARGING",
                    "stops": [
                        {"type": "start", "time": {"timestamp": now.to_rfc3339()}},
                        {"type": "end", "time": {"timestamp": (now + Duration::hours(1)).to_rfc3339()}}
                    ],
                    "tags": charging_point_tags("Charging Point Specifications", found.as_ref())
                }],
                "quote": {
                    "price": {"value": total_text, "currency": currency},
                    "breakup": breakup
                }
            }
        }
    });
    BecknResponse::with_warnings(body, warnings)
}

fn provider_descriptor(found: Option<&ConnectorRef<'_>>) -> Value {
    let name = found
        .and_then(|f| f.location.party_id.clone().or_else(|| f.location.operator_name().map(str::to_string)))
        .unwrap_or_else(|| "EV Charging Network".to_string());
    json!({
        "name": name,
        "short_desc": "Electric Vehicle Charging Services",
        "images": [{"url": "https://example.com/images/ev-charging-logo.png"}]
    })
}

/// `on_select` for a request that could not be processed at all.
pub fn failed(request: &OrderRequest, reason: &str, env: &HandlerEnv<'_>) -> BecknResponse {
    warn!(reason, "select failed");
    let body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {
                "provider": {
                    "id": env.config.provider_id,
                    "descriptor": {
                        "name": "Error Processing Request",
                        "short_desc": "Failed to process select request"
                    }
                },
                "items": [],
                "fulfillments": [],
                "quote": {
                    "price": {"value": "0", "currency": env.pricing.default_currency()},
                    "breakup": []
                }
            }
        }
    });
    BecknResponse::with_warnings(body, vec![reason.to_string()])
}
