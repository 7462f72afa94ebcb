use bridge_core::{CdrPrice, CdrRecord, PushResult};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::update::bill;
use super::{HandlerEnv, number};
use crate::BackendError;
use crate::beckn::{BecknResponse, OrderRequest};

const ACTION: &str = "on_cdr";
/// VAT percentage assumed when a CDR total carries no VAT-inclusive amount.
const VAT_PERCENT: i64 = 18;

/// Bill a session: generate its CDR, push it to the network and describe
/// the result to the buyer.
pub fn handle(request: &OrderRequest, env: &HandlerEnv<'_>) -> BecknResponse {
    let session_id = match request.session_id() {
        Ok(id) => id,
        Err(err) => return failed(request, &err.to_string()),
    };

    let billed = bill(env, session_id, None)
        .and_then(|(cdr, pushed)| Ok((billed_order(&cdr, &pushed)?, cdr, pushed)));
    match billed {
        Ok((order, cdr, pushed)) => {
            info!(session_id, cdr_id = %cdr.id, status_code = pushed.status_code, "CDR delivered");
            BecknResponse::new(json!({
                "context": request.context.reply(ACTION).to_value(),
                "message": {"order": order}
            }))
        }
        Err(err) => failed(request, &err.to_string()),
    }
}

/// VAT share of a CDR total, from its VAT-inclusive amount when present.
fn tax_amount(total: &CdrPrice) -> Result<Decimal, BackendError> {
    let tax = match total.incl_vat {
        Some(incl) => incl.checked_sub(total.excl_vat),
        None => total
            .excl_vat
            .checked_mul(Decimal::new(VAT_PERCENT, 2))
            .map(|tax| tax.round_dp(2)),
    };
    tax.ok_or_else(|| BackendError::Decode(format!("tax on {} overflows", total.excl_vat)))
}

fn billed_order(cdr: &CdrRecord, pushed: &PushResult) -> Result<Value, BackendError> {
    let location = cdr.cdr_location.clone().unwrap_or_default();
    let gps = location
        .coordinates
        .as_ref()
        .map(|c| c.gps())
        .unwrap_or_else(|| ",".to_string());
    let total = cdr.total_cost.clone().unwrap_or_default();
    let energy_cost = cdr.total_energy_cost.clone().unwrap_or_default();
    let tax = tax_amount(&total)?;

    Ok(json!({
        "id": cdr.session_id,
        "state": "COMPLETED",
        "cdr": {
            "id": cdr.id,
            "session_id": cdr.session_id,
            "start_time": cdr.start_date_time,
            "end_time": cdr.end_date_time,
            "location": {
                "id": location.id,
                "name": location.name,
                "address": location.address,
                "gps": gps
            },
            "energy": {"consumed": number(cdr.total_energy), "unit": "kWh"},
            "duration": {"total_time": number(cdr.total_time), "unit": "hours"},
            "cost": {
                "currency": cdr.currency.as_deref().unwrap_or("INR"),
                "total_amount": number(gross(&total)),
                "energy_cost": number(gross(&energy_cost)),
                "breakdown": {
                    "base_amount": number(total.excl_vat),
                    "tax_amount": number(tax),
                    "tax_rate": VAT_PERCENT as f64
                }
            },
            "payment": {
                "method": cdr.auth_method.as_deref().unwrap_or("Unknown"),
                "reference": cdr.authorization_reference,
                "invoice_id": cdr.invoice_reference_id
            }
        },
        "billing_status": if pushed.is_success() { "COMPLETED" } else { "PENDING" },
        "last_updated": cdr.last_updated
    }))
}

fn gross(price: &CdrPrice) -> Decimal {
    price.incl_vat.unwrap_or(price.excl_vat)
}

pub fn failed(request: &OrderRequest, reason: &str) -> BecknResponse {
    warn!(reason, "cdr failed");
    let body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {
                "id": request.order().id,
                "state": null,
                "billing_status": "FAILED"
            }
        },
        "error": {"code": "CDR_FAILED", "message": reason}
    });
    BecknResponse::with_warnings(body, vec![reason.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::{TestBed, context};
    use std::str::FromStr;

    fn cdr_request(order: Value) -> OrderRequest {
        serde_json::from_value(json!({
            "context": context("cdr"),
            "message": {"order": order}
        }))
        .unwrap()
    }

    #[test]
    fn test_cdr_for_unknown_session_uses_default_reading() {
        let bed = TestBed::default();
        let request = cdr_request(json!({
            "id": "SESSION123",
            "billing": {"email": "user@example.com"},
            "payment": {"method": "UPI", "reference": "UPI_REF_123"}
        }));
        let response = handle(&request, &bed.env());

        assert_eq!(response.action(), "on_cdr");
        let order = response.order();
        assert_eq!(order["id"], "SESSION123");
        assert_eq!(order["state"], "COMPLETED");
        assert_eq!(order["billing_status"], "COMPLETED");
        let cdr = &order["cdr"];
        assert_eq!(cdr["energy"]["consumed"], json!(25.5));
        assert_eq!(cdr["cost"]["currency"], "INR");
        assert_eq!(cdr["cost"]["total_amount"], json!(300.9));
        assert_eq!(cdr["cost"]["breakdown"]["base_amount"], json!(255.0));
        assert_eq!(cdr["cost"]["breakdown"]["tax_amount"], json!(45.9));
        assert_eq!(cdr["location"]["gps"], "12.9716,77.5946");
        assert_eq!(cdr["duration"]["total_time"], json!(2.0));
        assert_eq!(bed.sessions.pushed_cdrs().len(), 1);
    }

    #[test]
    fn test_tax_falls_back_to_fixed_rate() {
        let cdr = CdrRecord {
            id: "CDR_1".into(),
            session_id: "S1".into(),
            total_cost: Some(CdrPrice {
                excl_vat: Decimal::from(100),
                incl_vat: None,
            }),
            total_energy: Decimal::from_str("10").unwrap(),
            ..Default::default()
        };
        let pushed = PushResult {
            status_code: 2001,
            ..Default::default()
        };
        let order = billed_order(&cdr, &pushed).unwrap();
        assert_eq!(order["cdr"]["cost"]["total_amount"], json!(100.0));
        assert_eq!(order["cdr"]["cost"]["breakdown"]["tax_amount"], json!(18.0));
        assert_eq!(order["cdr"]["payment"]["method"], "Unknown");
        assert_eq!(order["billing_status"], "PENDING");
    }

    #[test]
    fn test_tax_overflow_is_an_error() {
        let overflowing = CdrPrice {
            excl_vat: Decimal::MAX,
            incl_vat: Some(Decimal::MIN),
        };
        assert!(matches!(tax_amount(&overflowing), Err(BackendError::Decode(_))));

        let fine = CdrPrice {
            excl_vat: Decimal::from(255),
            incl_vat: Some(Decimal::from_str("300.90").unwrap()),
        };
        assert_eq!(tax_amount(&fine).unwrap(), Decimal::from_str("45.90").unwrap());
    }

    #[test]
    fn test_missing_session_id() {
        let bed = TestBed::default();
        let response = handle(&cdr_request(json!({})), &bed.env());
        assert_eq!(response.body["error"]["code"], "CDR_FAILED");
        assert!(bed.sessions.pushed_cdrs().is_empty());
    }
}
