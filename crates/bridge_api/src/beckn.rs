use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bridge_engine::Action;
use bridge_engine::beckn::BecknRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::app_state::AppState;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(message: String) -> Response {
    warn!(%message, "rejecting Beckn request");
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
}

/// Parse `body` as a request for `action` and answer it on the blocking pool.
async fn answer(state: AppState, action: Action, body: Bytes) -> Response {
    let document: Value = match serde_json::from_slice(&body) {
        Ok(document) => document,
        Err(err) => return bad_request(format!("Invalid JSON body: {err}")),
    };

    let declared = document
        .pointer("/context/action")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !declared.is_empty() && declared != action.as_str() {
        return bad_request(format!(
            "context.action '{declared}' does not match endpoint '{action}'"
        ));
    }

    let request = match BecknRequest::parse_as(action, document) {
        Ok(request) => request,
        Err(err) => return bad_request(err.to_string()),
    };

    let translator = state.translator();
    match tokio::task::spawn_blocking(move || translator.handle(&request)).await {
        Ok(response) => (StatusCode::OK, Json(response.into_body())).into_response(),
        Err(err) => {
            error!(%action, error = %err, "translator task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Internal error while handling {action}"),
                }),
            )
                .into_response()
        }
    }
}

pub async fn search(State(state): State<AppState>, body: Bytes) -> Response {
    answer(state, Action::Search, body).await
}

pub async fn select(State(state): State<AppState>, body: Bytes) -> Response {
    answer(state, Action::Select, body).await
}

pub async fn init(State(state): State<AppState>, body: Bytes) -> Response {
    answer(state, Action::Init, body).await
}

pub async fn confirm(State(state): State<AppState>, body: Bytes) -> Response {
    answer(state, Action::Confirm, body).await
}

pub async fn status(State(state): State<AppState>, body: Bytes) -> Response {
    answer(state, Action::Status, body).await
}

pub async fn update(State(state): State<AppState>, body: Bytes) -> Response {
    answer(state, Action::Update, body).await
}

pub async fn cdr(State(state): State<AppState>, body: Bytes) -> Response {
    answer(state, Action::Cdr, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::post};
    use bridge_engine::Translator;
    use bridge_engine::config::BridgeConfig;
    use tower::util::ServiceExt;

    fn test_app() -> Router {
        let state = AppState::new(Translator::mock(BridgeConfig::default()).unwrap());
        Router::new()
            .route("/search", post(search))
            .route("/status", post(status))
            .with_state(state)
    }

    fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let response = test_app()
            .oneshot(post_json("/search", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.error.starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn test_action_must_match_endpoint() {
        let document = serde_json::json!({
            "context": {"action": "status", "transaction_id": "t-1"},
            "message": {"order": {"id": "S1"}}
        });
        let response = test_app()
            .oneshot(post_json("/search", document.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_action_uses_endpoint() {
        let document = serde_json::json!({
            "context": {"transaction_id": "t-1"},
            "message": {"order": {"id": "S1"}}
        });
        let response = test_app()
            .oneshot(post_json("/status", document.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let on_status: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(on_status["context"]["action"], "on_status");
        assert_eq!(on_status["message"]["order"]["id"], "S1");
    }
}
