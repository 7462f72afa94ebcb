use std::collections::{BTreeSet, HashMap, HashSet};

use bridge_core::geo::format_distance;
use bridge_core::money::format_price;
use bridge_core::{
    ChargeLocation, Connector, Evse, FulfillmentId, InventoryIndex, ItemId, OfferPrice,
    filter_by_proximity,
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{CATEGORY_ID, HandlerEnv, category};
use crate::beckn::{BecknResponse, SearchRequest, now_rfc3339};
use crate::RequestError;

const ACTION: &str = "on_search";

/// Radius to search with: the buyer's circle if given, else the configured one.
pub fn radius_km(request: &SearchRequest, env: &HandlerEnv<'_>) -> f64 {
    request
        .radius_km()
        .unwrap_or(env.config.search_radius_km)
}

/// Build the catalog of every connector within the search radius.
///
/// Connectors are grouped into items by [`ItemId`]; each connector also gets
/// its own fulfillment, keyed by [`FulfillmentId`].
pub fn handle(request: &SearchRequest, index: &InventoryIndex, env: &HandlerEnv<'_>) -> BecknResponse {
    let (lat, lon) = match request.target() {
        Ok(target) => target,
        Err(err) => return failed(request, &err.to_string()),
    };
    let radius = radius_km(request, env);
    info!(lat, lon, radius_km = radius, "processing search");

    if index.locations().is_empty() {
        warn!("no OCPI locations available");
        return empty(request);
    }

    let nearby = filter_by_proximity(index.locations().to_vec(), lat, lon, radius);
    if nearby.is_empty() {
        warn!(radius_km = radius, "no locations within search radius");
        return empty(request);
    }

    let mut warnings = Vec::new();
    let mut locations = Vec::with_capacity(nearby.len());
    let mut fulfillments = Vec::new();
    let mut items: Vec<Value> = Vec::new();
    let mut item_slots: HashMap<ItemId, usize> = HashMap::new();
    let mut emitted: HashSet<FulfillmentId> = HashSet::new();
    let mut operators = BTreeSet::new();
    let mut site_names = BTreeSet::new();

    for near in &nearby {
        let site = &near.location;
        if let Some(name) = site.operator_name() {
            operators.insert(name.to_string());
        }
        site_names.insert(site.name.clone().unwrap_or_else(|| "Charging Location".into()));

        let mut beckn_location = location_document(site);
        beckn_location["distance"] = json!(format_distance(near.distance_km));

        for evse in &site.evses {
            for connector in &evse.connectors {
                let fulfillment_id = FulfillmentId::new(evse, connector);
                if !index.is_owner(&fulfillment_id, &site.id) || !emitted.insert(fulfillment_id.clone()) {
                    warnings.push(format!(
                        "fulfillment id {fulfillment_id} at location {} shadowed by an earlier connector",
                        site.id
                    ));
                    continue;
                }
                fulfillments.push(fulfillment_document(
                    &fulfillment_id,
                    site,
                    evse,
                    connector,
                    &beckn_location,
                ));

                let offer = env.pricing.offer(evse, connector, index.tariff_lookup());
                if env.pricing.decomposition_enabled()
                    && !connector.tariff_ids.is_empty()
                    && matches!(offer.price, OfferPrice::Unpriced)
                {
                    warnings.push(format!(
                        "tariff {} for {fulfillment_id} not found, offered at zero price",
                        connector.tariff_ids[0]
                    ));
                }

                match item_slots.get(&offer.item_id) {
                    Some(&slot) => merge_item(&mut items[slot], &site.id, &fulfillment_id),
                    None => {
                        item_slots.insert(offer.item_id.clone(), items.len());
                        items.push(item_document(
                            &offer.item_id,
                            &offer.price,
                            connector,
                            &site.id,
                            &fulfillment_id,
                            env,
                        ));
                    }
                }
            }
        }
        locations.push(beckn_location);
    }

    let mut context = request.context.reply(ACTION);
    if let Some(party) = nearby.first().and_then(|n| n.location.party_id.clone()) {
        context.bpp_id = Some(party);
    }

    info!(
        locations = locations.len(),
        items = items.len(),
        fulfillments = fulfillments.len(),
        "search catalog built"
    );

    let body = json!({
        "context": context.to_value(),
        "message": {
            "catalog": {
                "providers": [{
                    "id": env.config.provider_id,
                    "descriptor": {
                        "name": provider_name(&operators, &site_names),
                        "short_desc": "Electric Vehicle Charging Stations",
                        "long_desc": "Network of EV charging stations via OCPI integration"
                    },
                    "locations": locations,
                    "items": items,
                    "fulfillments": fulfillments,
                    "categories": [category()]
                }]
            }
        }
    });
    BecknResponse::with_warnings(body, warnings)
}

fn provider_name(operators: &BTreeSet<String>, site_names: &BTreeSet<String>) -> String {
    match operators.len() {
        1 => operators.iter().next().cloned().unwrap_or_default(),
        0 if site_names.is_empty() => "EV Charging Network".to_string(),
        0 => format!(
            "EV Charging Network ({})",
            site_names.iter().cloned().collect::<Vec<_>>().join(", ")
        ),
        _ => format!(
            "Multi-Operator EV Network ({})",
            operators.iter().cloned().collect::<Vec<_>>().join(", ")
        ),
    }
}

fn location_document(site: &ChargeLocation) -> Value {
    let address = site.address.clone().unwrap_or_default();
    json!({
        "id": site.id,
        "descriptor": {
            "name": site.name.as_deref().unwrap_or("Charging Location"),
            "short_desc": format!(
                "Charging station at {}",
                site.address.as_deref().unwrap_or("Unknown address")
            ),
            "long_desc": format!(
                "EV charging location operated by {}",
                site.operator_name().unwrap_or("Unknown operator")
            )
        },
        "gps": site.coordinates.as_ref().map(|c| c.gps()).unwrap_or_default(),
        "address": {
            "full": address,
            "city": site.city.clone().unwrap_or_default(),
            "state": site.state.clone().unwrap_or_default(),
            "country": site.country.clone().unwrap_or_default(),
            "area_code": site.postal_code.clone().unwrap_or_default()
        }
    })
}

fn end_of_day() -> String {
    Utc::now()
        .date_naive()
        .and_hms_opt(23, 59, 59)
        .map(|end| end.and_utc().to_rfc3339())
        .unwrap_or_else(now_rfc3339)
}

fn fulfillment_document(
    id: &FulfillmentId,
    site: &ChargeLocation,
    evse: &Evse,
    connector: &Connector,
    beckn_location: &Value,
) -> Value {
    json!({
        "id": id,
        "type": "charging",
        "stops": {
            "location": beckn_location,
            "time": {
                "label": "available",
                "range": {"start": now_rfc3339(), "end": end_of_day()}
            }
        },
        "tags": {
            "evse_uid": evse.uid,
            "connector_type": connector.standard.as_deref().unwrap_or("Unknown"),
            "power_type": connector.power_type.as_deref().unwrap_or("Unknown"),
            "max_power": connector.max_electric_power.to_string(),
            "connector_format": connector.format.as_deref().unwrap_or("Unknown"),
            "availability": evse.status.as_str(),
            "facilities": site.facilities,
            "opening_times": site.opening_times.clone().unwrap_or_else(|| json!({})),
            "operator": site.operator_name().unwrap_or("Unknown")
        }
    })
}

fn item_document(
    item_id: &ItemId,
    price: &OfferPrice,
    connector: &Connector,
    location_id: &str,
    fulfillment_id: &FulfillmentId,
    env: &HandlerEnv<'_>,
) -> Value {
    let per_kwh = format!("{}/kWh", env.pricing.default_currency());
    let price = match price {
        OfferPrice::Priced { unit, tariff } => json!({
            "currency": unit.currency,
            "value": format_price(unit.price),
            "description": format!("Tariff ID: {}", tariff.id),
            "tariff_data": tariff
        }),
        OfferPrice::TariffRefs(ids) => json!({
            "currency": per_kwh,
            "value": "0",
            "description": format!("Tariff IDs: {}", ids.join(", ")),
            "tariff_ids": ids
        }),
        OfferPrice::Unpriced => json!({"currency": per_kwh, "value": "0"}),
    };
    json!({
        "id": item_id,
        "descriptor": {"code": "energy"},
        "price": price,
        "quantity": {
            "available": {
                "measure": {"unit": "Wh", "value": connector.max_electric_power.to_string()}
            }
        },
        "category_ids": [CATEGORY_ID],
        "location_ids": [location_id],
        "fulfillment_ids": [fulfillment_id]
    })
}

/// Add a connector to an existing price-tier item.
fn merge_item(item: &mut Value, location_id: &str, fulfillment_id: &FulfillmentId) {
    push_unique(&mut item["location_ids"], json!(location_id));
    push_unique(&mut item["fulfillment_ids"], json!(fulfillment_id));
}

fn push_unique(list: &mut Value, value: Value) {
    if let Some(list) = list.as_array_mut() {
        if !list.contains(&value) {
            list.push(value);
        }
    }
}

fn no_results_catalog(request: &SearchRequest, short_desc: &str, long_desc: String) -> Value {
    json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "catalog": {
                "descriptor": {
                    "name": "EV Charging Network",
                    "short_desc": short_desc,
                    "long_desc": long_desc
                },
                "locations": [],
                "items": [],
                "fulfillments": [],
                "categories": [category()]
            }
        }
    })
}

/// Valid catalog with nothing in it.
pub fn empty(request: &SearchRequest) -> BecknResponse {
    BecknResponse::new(no_results_catalog(
        request,
        "No charging stations found in the specified area",
        "No EV charging stations available within the search radius".to_string(),
    ))
}

/// Empty catalog explaining why the search failed.
pub fn failed(request: &SearchRequest, reason: &str) -> BecknResponse {
    warn!(reason, "search failed");
    BecknResponse::with_warnings(
        no_results_catalog(
            request,
            "Error occurred during search",
            format!("Search failed: {reason}"),
        ),
        vec![reason.to_string()],
    )
}

/// Reject a search before touching the inventory.
pub fn validate(request: &SearchRequest) -> Result<(f64, f64), RequestError> {
    request.target()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::handlers::fixtures::{TestBed, bangalore_index, context, single_site_index};

    fn search_at(gps: &str) -> SearchRequest {
        serde_json::from_value(json!({
            "context": context("search"),
            "message": {"intent": {"fulfillment": {"start": {"location": {"gps": gps}}}}}
        }))
        .unwrap()
    }

    fn provider(response: &BecknResponse) -> &Value {
        &response.body["message"]["catalog"]["providers"][0]
    }

    #[test]
    fn test_single_priced_item() {
        let bed = TestBed::default();
        let response = handle(&search_at("12.9716,77.5946"), &single_site_index(&["T1"]), &bed.env());

        assert_eq!(response.action(), "on_search");
        let items = provider(&response)["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "T1_50000");
        assert_eq!(items[0]["price"]["value"], "10.0");
        assert_eq!(items[0]["price"]["currency"], "INR");
        assert_eq!(items[0]["location_ids"], json!(["LOC_A"]));
        assert_eq!(items[0]["fulfillment_ids"], json!(["EVSE_A_1"]));
        assert_eq!(items[0]["quantity"]["available"]["measure"]["value"], "50000");
        assert_eq!(provider(&response)["locations"][0]["distance"], "0.0 km");
        assert_eq!(response.body["context"]["bpp_id"], "CPO");
        assert!(response.warnings.is_empty());
    }

    #[test]
    fn test_far_away_search_is_empty_but_valid() {
        let bed = TestBed::default();
        // Hyderabad is roughly 500 km from Bangalore.
        let response = handle(&search_at("17.3850,78.4867"), &single_site_index(&["T1"]), &bed.env());

        assert_eq!(response.action(), "on_search");
        let catalog = &response.body["message"]["catalog"];
        assert_eq!(catalog["locations"], json!([]));
        assert_eq!(catalog["items"], json!([]));
        assert_eq!(catalog["fulfillments"], json!([]));
        assert_eq!(
            response.body["context"]["transaction_id"],
            "6743e9e2-4fb5-487c-92b7-13ba8018f176"
        );
        assert_ne!(response.body["context"]["message_id"], "msg-1");
    }

    #[test]
    fn test_bangalore_catalog() {
        let bed = TestBed::default();
        let response = handle(&search_at("12.9716,77.5946"), &bangalore_index(), &bed.env());

        let provider = provider(&response);
        // The airport is about 26 km out, beyond the default 10 km.
        let location_ids: Vec<&str> = provider["locations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["id"].as_str().unwrap())
            .collect();
        assert_eq!(location_ids, vec!["LOC001"]);

        let wide: SearchRequest = serde_json::from_value(json!({
            "context": context("search"),
            "message": {"intent": {"fulfillment": {"start": {"location": {
                "gps": "12.9716,77.5946",
                "circle": {"radius": {"value": "50", "unit": "km"}}
            }}}}}
        }))
        .unwrap();
        let response = handle(&wide, &bangalore_index(), &bed.env());
        let provider = &response.body["message"]["catalog"]["providers"][0];
        assert_eq!(provider["locations"].as_array().unwrap().len(), 3);
        assert_eq!(provider["fulfillments"].as_array().unwrap().len(), 4);
        assert_eq!(provider["items"].as_array().unwrap().len(), 4);
        assert!(
            provider["descriptor"]["name"]
                .as_str()
                .unwrap()
                .starts_with("Multi-Operator EV Network (Airport Charging Network, ")
        );
    }

    #[test]
    fn test_shared_price_tier_merges_into_one_item() {
        let index = {
            let locations = serde_json::from_value(json!([
                {
                    "id": "L1", "coordinates": {"latitude": "12.97", "longitude": "77.59"},
                    "evses": [{"uid": "E1", "connectors": [{"id": "1", "max_electric_power": 22000, "tariff_ids": ["T1"]}]}]
                },
                {
                    "id": "L2", "coordinates": {"latitude": "12.98", "longitude": "77.60"},
                    "evses": [{"uid": "E2", "connectors": [{"id": "1", "max_electric_power": 22000, "tariff_ids": ["T1"]}]}]
                }
            ]))
            .unwrap();
            let tariffs = serde_json::from_value(json!([
                {"id": "T1", "currency": "INR", "elements": [{"price_components": [{"type": "ENERGY", "price": 9}]}]}
            ]))
            .unwrap();
            InventoryIndex::build(locations, tariffs)
        };
        let bed = TestBed::default();
        let response = handle(&search_at("12.97,77.59"), &index, &bed.env());
        let provider = provider(&response);

        let items = provider["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["location_ids"], json!(["L1", "L2"]));
        assert_eq!(items[0]["fulfillment_ids"], json!(["E1_1", "E2_1"]));
        assert_eq!(provider["fulfillments"].as_array().unwrap().len(), 2);
        assert_eq!(provider["descriptor"]["name"], "EV Charging Network (Charging Location)");
    }

    #[test]
    fn test_colliding_fulfillment_is_listed_once() {
        let locations = serde_json::from_value(json!([
            {
                "id": "L1", "operator": {"name": "Op"}, "coordinates": {"latitude": "12.97", "longitude": "77.59"},
                "evses": [{"uid": "E1", "connectors": [{"id": "1", "tariff_ids": []}]}]
            },
            {
                "id": "L2", "operator": {"name": "Op"}, "coordinates": {"latitude": "12.971", "longitude": "77.591"},
                "evses": [{"uid": "E1", "connectors": [{"id": "1", "tariff_ids": []}]}]
            }
        ]))
        .unwrap();
        let index = InventoryIndex::build(locations, Vec::new());
        let bed = TestBed::default();
        let response = handle(&search_at("12.97,77.59"), &index, &bed.env());

        let provider = provider(&response);
        let fulfillments = provider["fulfillments"].as_array().unwrap();
        assert_eq!(fulfillments.len(), 1);
        assert_eq!(fulfillments[0]["stops"]["location"]["id"], "L1");
        assert_eq!(provider["items"][0]["id"], "item_E1_1_0");
        assert_eq!(response.warnings.len(), 1);
        assert_eq!(provider["descriptor"]["name"], "Op");
    }

    #[test]
    fn test_decomposition_disabled_surfaces_tariff_ids() {
        let bed = TestBed::new(BridgeConfig {
            tariff_decomposition_enabled: false,
            ..Default::default()
        });
        let response = handle(&search_at("12.9716,77.5946"), &single_site_index(&["T1", "T2"]), &bed.env());

        let item = &provider(&response)["items"][0];
        assert_eq!(item["id"], "T1_50000");
        assert_eq!(item["price"]["value"], "0");
        assert_eq!(item["price"]["currency"], "INR/kWh");
        assert_eq!(item["price"]["tariff_ids"], json!(["T1", "T2"]));
        assert!(item["price"].get("tariff_data").is_none());
    }

    #[test]
    fn test_missing_tariff_degrades_to_zero_price() {
        let bed = TestBed::default();
        let response = handle(&search_at("12.9716,77.5946"), &single_site_index(&["GONE"]), &bed.env());

        let item = &provider(&response)["items"][0];
        assert_eq!(item["id"], "item_EVSE_A_1_50000");
        assert_eq!(item["price"]["value"], "0");
        assert_eq!(response.warnings.len(), 1);
    }

    #[test]
    fn test_invalid_gps_returns_error_catalog() {
        let bed = TestBed::default();
        let response = handle(&search_at("somewhere"), &single_site_index(&["T1"]), &bed.env());

        assert_eq!(response.action(), "on_search");
        let catalog = &response.body["message"]["catalog"];
        assert_eq!(catalog["descriptor"]["short_desc"], "Error occurred during search");
        assert_eq!(catalog["items"], json!([]));
        assert_eq!(response.warnings.len(), 1);
    }

    #[test]
    fn test_empty_inventory() {
        let bed = TestBed::default();
        let index = InventoryIndex::build(Vec::new(), Vec::new());
        let response = handle(&search_at("12.9716,77.5946"), &index, &bed.env());
        assert_eq!(
            response.body["message"]["catalog"]["descriptor"]["short_desc"],
            "No charging stations found in the specified area"
        );
    }
}
