use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

pub fn app_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Inbound email webhook - the whole reporting pipeline hangs off this
        .route("/webhook", post(handlers::api::handle_webhook))
        // System status
        .route("/status", get(handlers::api::system_status))
}
