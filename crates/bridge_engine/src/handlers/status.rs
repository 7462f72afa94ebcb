use bridge_core::SessionRecord;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{HandlerEnv, number};
use crate::beckn::{BecknResponse, OrderRequest};

const ACTION: &str = "on_status";

/// Report the charging session named by the order id.
pub fn handle(request: &OrderRequest, env: &HandlerEnv<'_>) -> BecknResponse {
    let session_id = match request.session_id() {
        Ok(id) => id,
        Err(err) => return failed(request, &err.to_string()),
    };

    match env.sessions.get_session_status(session_id) {
        Ok(session) => {
            info!(session_id, status = ?session.status, "session status read");
            BecknResponse::new(json!({
                "context": request.context.reply(ACTION).to_value(),
                "message": {"order": session_order(&session)}
            }))
        }
        Err(err) => failed(request, &err.to_string()),
    }
}

fn session_order(session: &SessionRecord) -> Value {
    json!({
        "id": session.id,
        "state": session.status,
        "fulfillments": [{
            "id": session.id,
            "start": {"time": {"timestamp": session.start_datetime}}
        }],
        "authorization": {
            "method": session.auth_method,
            "reference": session.authorization_reference
        },
        "last_updated": session.last_updated,
        "kwh": session.kwh.map(number)
    })
}

/// `on_status` carrying the request's order id and an `error` block.
pub fn failed(request: &OrderRequest, reason: &str) -> BecknResponse {
    warn!(reason, "status failed");
    let body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {
                "id": request.order().id,
                "state": null,
                "fulfillments": []
            }
        },
        "error": {"code": "SESSION_STATUS_FAILED", "message": reason}
    });
    BecknResponse::with_warnings(body, vec![reason.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SessionBackend;
    use crate::handlers::fixtures::{TestBed, context};

    fn status(order: Value) -> OrderRequest {
        serde_json::from_value(json!({
            "context": context("status"),
            "message": {"order": order}
        }))
        .unwrap()
    }

    #[test]
    fn test_status_passes_session_through() {
        let bed = TestBed::default();
        let session = bed
            .sessions
            .initiate_session("LOC001", "EVSE001", "1", "token-1")
            .unwrap();
        bed.sessions.confirm_session(&session.id).unwrap();

        let response = handle(&status(json!({"id": session.id})), &bed.env());
        assert_eq!(response.action(), "on_status");
        let order = response.order();
        assert_eq!(order["id"], session.id.as_str());
        assert_eq!(order["state"], "ACTIVE");
        assert_eq!(order["fulfillments"][0]["id"], session.id.as_str());
        assert_eq!(order["authorization"]["method"], "AUTH_REQUEST");
        assert_eq!(order["kwh"], json!(0.0));
    }

    #[test]
    fn test_unknown_session_is_synthesized_by_mock() {
        let bed = TestBed::default();
        let response = handle(&status(json!({"id": "SESSION123"})), &bed.env());
        assert_eq!(response.order()["state"], "ACTIVE");
        assert_eq!(response.order()["kwh"], json!(5.2));
        assert_eq!(response.order()["authorization"]["reference"], "AUTHREF123");
    }

    #[test]
    fn test_missing_session_id() {
        let bed = TestBed::default();
        let response = handle(&status(json!({})), &bed.env());
        assert_eq!(response.action(), "on_status");
        assert_eq!(response.body["error"]["code"], "SESSION_STATUS_FAILED");
        assert_eq!(response.warnings.len(), 1);
    }
}
