mod dto;
pub mod handlers;

use crate::state::AppState;
use axum::Router;

/// Twilio webhook at the root, health and dev routes under `/api/v1`.
pub fn router(state: &AppState) -> Router<AppState> {
    let mut api = Router::new().merge(handlers::health_routes());
    if state.config.dev_endpoints {
        api = api.merge(handlers::dev_routes());
    }
    Router::new()
        .merge(handlers::webhook_routes())
        .nest("/api/v1", api)
}
