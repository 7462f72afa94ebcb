use bridge_core::wire::parse_decimal;
use bridge_core::{CdrRecord, PushResult, SessionRecord};
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use super::{HandlerEnv, number};
use crate::BackendError;
use crate::beckn::{BecknResponse, OrderRequest};

const ACTION: &str = "on_update";
const STOP_STATUSES: [&str; 3] = ["STOPPED", "STOP", "ENDED"];
/// Session states after which a CDR is due.
const TERMINAL_STATES: [&str; 2] = ["STOPPED", "COMPLETED"];

fn is_stop_request(fields: &Map<String, Value>) -> bool {
    fields
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| STOP_STATUSES.contains(&status.to_ascii_uppercase().as_str()))
}

/// Apply an update to a charging session.
///
/// A stop request also bills the session: a CDR is generated from the final
/// session values and pushed, and its summary attached to the order. Billing
/// failures are reported in the `cdr` block; the update itself stands.
pub fn handle(request: &OrderRequest, env: &HandlerEnv<'_>) -> BecknResponse {
    let session_id = match request.session_id() {
        Ok(id) => id,
        Err(err) => return failed(request, &err.to_string()),
    };

    let mut fields = request.update_fields();
    let stopping = is_stop_request(&fields);
    let mut warnings = Vec::new();

    let mut final_values = None;
    if stopping {
        fields.insert("status".into(), json!("STOPPED"));
        match env.sessions.get_session_status(session_id) {
            Ok(session) => final_values = Some(stopped_session(session, &fields)),
            Err(err) => {
                warn!(session_id, error = %err, "could not read session before stopping");
                warnings.push(format!("session {session_id} could not be read for billing: {err}"));
            }
        }
    }

    let updated = match env.sessions.update_session(session_id, &fields) {
        Ok(updated) => updated,
        Err(err) => return failed(request, &err.to_string()),
    };
    info!(session_id, status = ?updated.status, stopping, "session updated");

    let mut body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {
                "id": updated.id,
                "state": updated.status,
                "updated_fields": updated.updated_fields,
                "last_updated": updated.last_updated,
                "message": updated.message
            }
        }
    });

    let terminal = updated
        .status
        .as_deref()
        .is_some_and(|status| TERMINAL_STATES.contains(&status));
    if stopping && terminal {
        let summary = match bill(env, session_id, final_values.as_ref()) {
            Ok((cdr, pushed)) => {
                info!(session_id, cdr_id = %cdr.id, pushed = pushed.is_success(), "session billed");
                cdr_summary(&cdr, &pushed)
            }
            Err(err) => {
                error!(session_id, error = %err, "failed to generate or push CDR");
                warnings.push(err.to_string());
                json!({"status": "FAILED", "error": err.to_string()})
            }
        };
        body["message"]["order"]["cdr"] = summary;
    }

    BecknResponse::with_warnings(body, warnings)
}

/// The session as it stands once stopped: completed, with the end time and
/// final reading from the update when it has them.
fn stopped_session(mut session: SessionRecord, fields: &Map<String, Value>) -> SessionRecord {
    session.status = Some("COMPLETED".into());
    session.end_datetime = fields
        .get("end_datetime")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| session.last_updated.clone());
    if let Some(kwh) = fields.get("final_kwh").and_then(parse_decimal) {
        session.kwh = Some(kwh);
    }
    session
}

pub(crate) fn bill(
    env: &HandlerEnv<'_>,
    session_id: &str,
    hint: Option<&SessionRecord>,
) -> Result<(CdrRecord, PushResult), BackendError> {
    let cdr = env.billing.generate_cdr(session_id, hint)?;
    let pushed = env.billing.push_cdr(&cdr)?;
    Ok((cdr, pushed))
}

fn cdr_summary(cdr: &CdrRecord, pushed: &PushResult) -> Value {
    json!({
        "id": cdr.id,
        "status": "GENERATED",
        "push_status": if pushed.is_success() { "SUCCESS" } else { "FAILED" },
        "total_cost": serde_json::to_value(&cdr.total_cost).unwrap_or_default(),
        "total_energy": number(cdr.total_energy),
        "invoice_reference": cdr.invoice_reference_id
    })
}

/// `on_update` carrying the request's order id and an `error` block.
pub fn failed(request: &OrderRequest, reason: &str) -> BecknResponse {
    warn!(reason, "update failed");
    let body = json!({
        "context": request.context.reply(ACTION).to_value(),
        "message": {
            "order": {
                "id": request.order().id,
                "state": null
            }
        },
        "error": {"code": "SESSION_UPDATE_FAILED", "message": reason}
    });
    BecknResponse::with_warnings(body, vec![reason.to_string()])
}
