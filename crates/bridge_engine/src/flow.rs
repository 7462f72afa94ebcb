//! Buyer-side request builders: each turns one response of the commerce
//! flow into the request for the next step.

use rust_decimal::Decimal;
use serde_json::{Map, Value, json};

use crate::RequestError;
use crate::beckn::{Action, Billing, Context};

fn next_context(previous: &Value, action: Action) -> Result<Value, RequestError> {
    let context: Context = serde_json::from_value(previous["context"].clone())
        .map_err(|err| RequestError::Malformed(format!("context: {err}")))?;
    Ok(context.reply(action.as_str()).to_value())
}

fn order(response: &Value) -> Result<&Map<String, Value>, RequestError> {
    response
        .pointer("/message/order")
        .and_then(Value::as_object)
        .ok_or_else(|| RequestError::Malformed("response carries no order".into()))
}

fn array<'a>(object: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Item reduced to its id and selected quantity.
fn selected_item(item: &Value) -> Value {
    let measure = item.pointer("/quantity/selected/measure");
    json!({
        "id": item["id"],
        "quantity": {
            "selected": {
                "measure": {
                    "value": measure.and_then(|m| m.get("value")).cloned().unwrap_or(Value::Null),
                    "unit": measure.and_then(|m| m.get("unit")).cloned().unwrap_or(Value::Null)
                }
            }
        }
    })
}

/// Select the first offer of an `on_search` catalog, for `quantity_kwh`.
///
/// The fulfillment is one the chosen item lists, so the pair always names a
/// connector that carries the offer.
pub fn select_request_from_on_search(on_search: &Value, quantity_kwh: Decimal) -> Result<Value, RequestError> {
    let catalog = on_search
        .pointer("/message/catalog")
        .ok_or_else(|| RequestError::Malformed("response carries no catalog".into()))?;
    let provider = catalog
        .pointer("/providers/0")
        .unwrap_or(catalog);

    let item = provider
        .pointer("/items/0")
        .ok_or_else(|| RequestError::Malformed("catalog has no items".into()))?;
    let fulfillment_id = item
        .pointer("/fulfillment_ids/0")
        .or_else(|| provider.pointer("/fulfillments/0/id"))
        .ok_or_else(|| RequestError::Malformed("catalog has no fulfillments".into()))?;

    Ok(json!({
        "context": next_context(on_search, Action::Select)?,
        "message": {
            "order": {
                "provider": {"id": provider["id"]},
                "items": [{
                    "id": item["id"],
                    "quantity": {
                        "selected": {
                            "measure": {"value": quantity_kwh.to_string(), "unit": "kWh"}
                        }
                    },
                    "location_ids": item["location_ids"],
                    "category_ids": item["category_ids"]
                }],
                "fulfillments": [{"id": fulfillment_id}]
            }
        }
    }))
}

/// Carry an `on_select` order into `init` with the buyer's billing details.
pub fn init_request_from_on_select(on_select: &Value, billing: &Billing) -> Result<Value, RequestError> {
    let order = order(on_select)?;
    let items: Vec<Value> = array(order, "items")
        .iter()
        .filter(|item| item.pointer("/quantity/selected").is_some())
        .map(selected_item)
        .collect();
    if items.is_empty() {
        return Err(RequestError::Malformed("order has no selected items".into()));
    }
    let fulfillments: Vec<Value> = array(order, "fulfillments")
        .iter()
        .map(|f| json!({"id": f["id"]}))
        .collect();

    Ok(json!({
        "context": next_context(on_select, Action::Init)?,
        "message": {
            "order": {
                "provider": {"id": order.get("provider").map(|p| p["id"].clone())},
                "items": items,
                "fulfillments": fulfillments,
                "billing": billing,
                "quote": order.get("quote").cloned().unwrap_or_else(|| json!({}))
            }
        }
    }))
}

/// Confirm an `on_init` order.
///
/// Item ids and selected quantities are copied exactly; every payment is
/// marked `PAID` against the transaction id.
pub fn confirm_request_from_on_init(on_init: &Value) -> Result<Value, RequestError> {
    let order = order(on_init)?;
    let transaction_id = on_init.pointer("/context/transaction_id").cloned().unwrap_or(Value::Null);

    let billing = order.get("billing").cloned().unwrap_or_else(|| json!({}));
    let name = billing.get("name").cloned().unwrap_or(Value::Null);
    let phone = billing.get("phone").cloned().unwrap_or(Value::Null);

    let items: Vec<Value> = array(order, "items").iter().map(selected_item).collect();
    let fulfillments: Vec<Value> = array(order, "fulfillments")
        .iter()
        .map(|f| {
            json!({
                "id": f["id"],
                "customer": {
                    "person": {"name": name},
                    "contact": {"phone": phone}
                }
            })
        })
        .collect();
    let payments: Vec<Value> = array(order, "payments")
        .iter()
        .map(|p| {
            json!({
                "collected_by": "BPP",
                "params": {
                    "amount": p.pointer("/params/amount"),
                    "currency": p.pointer("/params/currency"),
                    "transaction_id": transaction_id
                },
                "status": "PAID",
                "type": p.get("type").and_then(Value::as_str).unwrap_or("PRE-ORDER")
            })
        })
        .collect();

    let quote = order.get("quote").cloned().unwrap_or_else(|| json!({}));
    Ok(json!({
        "context": next_context(on_init, Action::Confirm)?,
        "message": {
            "order": {
                "provider": {"id": order.get("provider").map(|p| p["id"].clone())},
                "items": items,
                "billing": {
                    "name": name,
                    "email": billing.get("email"),
                    "phone": phone
                },
                "fulfillments": fulfillments,
                "payments": payments,
                "quote": {
                    "price": {
                        "value": quote.pointer("/price/value"),
                        "currency": quote.pointer("/price/currency")
                    },
                    "breakup": quote.get("breakup").cloned().unwrap_or_else(|| json!([]))
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beckn::{OrderRequest, SearchRequest};
    use crate::handlers::fixtures::{TestBed, bangalore_index, context};
    use crate::handlers::{confirm, init, search, select};

    fn on_search(bed: &TestBed) -> Value {
        let request: SearchRequest = serde_json::from_value(json!({
            "context": context("search"),
            "message": {"intent": {"fulfillment": {"start": {"location": {"gps": "12.9716,77.5946"}}}}}
        }))
        .unwrap();
        search::handle(&request, &bangalore_index(), &bed.env()).into_body()
    }

    fn billing() -> Billing {
        Billing {
            name: Some("Asha".into()),
            email: Some("asha@example.com".into()),
            phone: Some("+91-9876543210".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_full_flow_keeps_item_and_quantity() {
        let bed = TestBed::default();
        let index = bangalore_index();

        let catalog = on_search(&bed);
        let select_doc = select_request_from_on_search(&catalog, Decimal::new(255, 1)).unwrap();
        let first_item = catalog.pointer("/message/catalog/providers/0/items/0").unwrap();
        assert_eq!(select_doc["message"]["order"]["items"][0]["id"], first_item["id"]);
        assert_eq!(select_doc["context"]["action"], "select");
        assert_ne!(select_doc["context"]["message_id"], catalog["context"]["message_id"]);

        let select_req: OrderRequest = serde_json::from_value(select_doc).unwrap();
        let on_select = select::handle(&select_req, &index, &bed.env());
        assert!(on_select.warnings.is_empty());

        let init_doc = init_request_from_on_select(&on_select.body, &billing()).unwrap();
        let init_req: OrderRequest = serde_json::from_value(init_doc).unwrap();
        let on_init = init::handle(&init_req, &index, &bed.env());
        assert!(on_init.warnings.is_empty(), "{:?}", on_init.warnings);

        let confirm_doc = confirm_request_from_on_init(&on_init.body).unwrap();
        let order = &confirm_doc["message"]["order"];
        assert_eq!(confirm_doc["context"]["action"], "confirm");
        assert_eq!(confirm_doc["context"]["transaction_id"], "6743e9e2-4fb5-487c-92b7-13ba8018f176");
        assert_eq!(order["items"][0]["id"], on_init.order()["items"][0]["id"]);
        assert_eq!(order["items"][0]["quantity"]["selected"]["measure"]["value"], "25.5");
        assert_eq!(order["payments"][0]["status"], "PAID");
        assert_eq!(order["payments"][0]["params"]["transaction_id"], "6743e9e2-4fb5-487c-92b7-13ba8018f176");
        assert_eq!(order["payments"][0]["params"]["amount"], on_init.order()["quote"]["price"]["value"]);
        assert_eq!(order["fulfillments"][0]["customer"]["person"]["name"], "Asha");
        assert_eq!(order["billing"]["email"], "asha@example.com");

        let confirm_req: OrderRequest = serde_json::from_value(confirm_doc).unwrap();
        let on_confirm = confirm::handle(&confirm_req, &index, &bed.env());
        assert_eq!(on_confirm.order()["payments"][0]["status"], "PAID");
        assert!(on_confirm.warnings.is_empty());
    }

    #[test]
    fn test_empty_catalog_cannot_be_selected() {
        let catalog = json!({
            "context": context("on_search"),
            "message": {"catalog": {"items": [], "fulfillments": []}}
        });
        assert!(matches!(
            select_request_from_on_search(&catalog, Decimal::ONE),
            Err(RequestError::Malformed(_))
        ));
    }

    #[test]
    fn test_confirm_requires_an_order() {
        let on_init = json!({"context": context("on_init"), "message": {}});
        assert!(confirm_request_from_on_init(&on_init).is_err());
    }
}
