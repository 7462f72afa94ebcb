//! Beckn–OCPI bridge HTTP API
//!
//! One POST endpoint per Beckn action. Each takes the Beckn request document
//! and answers with the matching `on_<action>` document.

mod app_state;
mod beckn;
pub mod ocpi;

pub use crate::app_state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Create the application router with all endpoints
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/search", post(beckn::search))
        .route("/select", post(beckn::select))
        .route("/init", post(beckn::init))
        .route("/confirm", post(beckn::confirm))
        .route("/status", post(beckn::status))
        .route("/update", post(beckn::update))
        .route("/cdr", post(beckn::cdr))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
