use bridge_core::money::{format_price, format_total, line_total};
use bridge_core::{InventoryIndex, ItemId, ResolveError};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{HandlerEnv, cancellation_terms, charging_point_tags, measure, quantity};
use crate::beckn::{BecknResponse, OrderRequest};

const ACTION: &str = "on_init";
/// How long a payment link stays valid.
const PAYMENT_WINDOW_MINUTES: i64 = 30;

/// Re-check the offer the buyer selected and produce a payable quote.
///
/// Tariff decomposition is always applied here: a quote without a price
/// cannot be paid.
pub fn handle(request: &OrderRequest, index: &InventoryIndex, env: &HandlerEnv<'_>) -> BecknResponse {
    let mut warnings = Vec::new();
    match build(request, index, env, &mut warnings) {
        Ok(body) => BecknResponse::with_warnings(body, warnings),
        Err(err) => failed(request, &err.to_string(), env),
    }
}

fn build(
    request: &OrderRequest,
    index: &InventoryIndex,
    env: &HandlerEnv<'_>,
    warnings: &mut Vec<String>,
) -> Result<Value, ResolveError> {
    let item_id = request.item_id();
    let fulfillment_id = request.fulfillment_id();
    let selected = request.selected_measure();

    let found = index.require(fulfillment_id)?;
    let requested = ItemId::from(item_id);
    let requested_tariff = requested.tariff_id().filter(|tariff| {
        !requested.is_untariffed() || found.connector.tariff_ids.iter().any(|id| id == tariff)
    });
    let tariff_id = env.pricing.applicable_tariff(found.connector, requested_tariff)?;
    if let Some(requested_tariff) = requested_tariff.filter(|t| *t != tariff_id) {
        warn!(requested_tariff, tariff_id, "requested tariff not offered, falling back");
        warnings.push(format!(
            "tariff {requested_tariff} is no longer offered on {fulfillment_id}, using {tariff_id}"
        ));
    }
    let unit = env.pricing.resolve_tariff(tariff_id, index.tariff_lookup())?;

    let consumption = quantity(&selected).unwrap_or(Decimal::ZERO);
    let total = line_total(unit.price, consumption).unwrap_or_else(|| {
        warnings.push(format!("total for {consumption} units overflows"));
        Decimal::ZERO
    });
    let total_text = format_total(total);
    let currency = unit.currency.clone();

    let transaction_id = request
        .context
        .transaction_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let payment_url = env
        .payments
        .payment_url(&transaction_id, &total_text, &currency);
    info!(fulfillment_id, tariff_id, total = %total_text, "init quote computed");

    let mut context = request.context.reply(ACTION);
    if let Some(party) = &found.location.party_id {
        context.bpp_id = Some(party.clone());
    }

    let operator = found.location.operator_name();
    let billing = request.billing();
    let selected_json = measure(selected.value.as_deref(), "0", selected.unit.as_deref(), "kWh");
    let now = Utc::now();

    Ok(json!({
        "context": context.to_value(),
        "message": {
            "order": {
                "provider": {
                    "id": request.provider_id().map(str::to_string).or_else(|| found.location.party_id.clone()),
                    "descriptor": {
                        "name": operator.or(request.provider_id()).unwrap_or("EV Charging Network"),
                        "short_desc": operator.unwrap_or("EV Charging Services")
                    }
                },
                "items": [{
                    "id": if item_id.is_empty() { tariff_id } else { item_id },
                    "descriptor": {"code": "energy"},
                    "price": {
                        "value": format_price(unit.price),
                        "currency": format!("{currency}/kWh")
                    },
                    "quantity": {
                        "available": {
                            "measure": {
                                "value": found.connector.max_electric_power.to_string(),
                                "unit": "kW"
                            }
                        },
                        "selected": {"measure": selected_json}
                    }
                }],
                "fulfillments": [{
                    "id": fulfillment_id,
                    "type": "CHARGING",
                    "state": {"descriptor": {"code": "order-initiated"}},
                    "stops": [
                        {"type": "start", "time": {"timestamp": now.to_rfc3339()}},
                        {"type": "end", "time": {"timestamp": now.to_rfc3339()}}
                    ],
                    "tags": charging_point_tags("Charging Point Specifications", Some(&found))
                }],
                "billing": {"email": billing.email, "phone": billing.phone},
                "quote": {
                    "price": {"value": total_text, "currency": currency},
                    "breakup": [{
                        "item": {
                            "descriptor": {"name": "Estimated units consumed"},
                            "quantity": {"selected": {"measure": selected_json}}
                        },
                        "price": {"value": total_text, "currency": currency}
                    }]
                },
                "payments": [{
                    "url": payment_url,
                    "type": "PRE-ORDER",
                    "status": "NOT-PAID",
                    "params": {"amount": total_text, "currency": currency},
                    "time": {
                        "range": {
                            "start": now.to_rfc3339(),
                            "end": (now + Duration::minutes(PAYMENT_WINDOW_MINUTES)).to_rfc3339()
                        }
                    }
                }],
                "cancellation_terms": cancellation_terms(env.config)
            }
        }
    }))
}

/// Minimal `on_init`: zero quote, empty arrays.
pub fn failed(request: &OrderRequest, reason: &str, env: &HandlerEnv<'_>) -> BecknResponse {
    warn!(reason, "init failed");
    let body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {
                "provider": {"descriptor": {"name": "Error Processing Init"}},
                "items": [],
                "fulfillments": [],
                "billing": {},
                "quote": {
                    "price": {"value": "0", "currency": env.pricing.default_currency()},
                    "breakup": []
                },
                "payments": []
            }
        }
    });
    BecknResponse::with_warnings(body, vec![reason.to_string()])
}
