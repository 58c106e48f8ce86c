//! Application router.

use crate::handlers::{gate, health_handler, tickets};
use crate::state::ApiState;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use portico_core::Origin;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// Ticket requests are tiny.
pub const MAX_REQUEST_BODY_SIZE: usize = 16 * 1024;

/// Build the router. `host_origin` is the only origin allowed to call the
/// ticket endpoint from a browser.
pub fn create_router(state: ApiState, host_origin: &Origin) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    if let Ok(origin) = HeaderValue::from_str(host_origin.as_str()) {
        cors = cors.allow_origin(origin);
    }

    let api = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/plugins/tickets", post(tickets::issue_ticket_handler))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_SIZE))
        .layer(cors);

    let plugins = Router::new()
        .route("/plugins/:plugin_id/", get(gate::plugin_index_handler))
        .route("/plugins/:plugin_id/*path", get(gate::plugin_asset_handler));

    api.merge(plugins).with_state(state)
}
