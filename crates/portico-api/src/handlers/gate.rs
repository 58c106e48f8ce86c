//! Ticket gate in front of plugin asset directories.
//!
//! An entry load carries `?ticket=…`; the ticket is validated (and consumed)
//! and handed back as an HttpOnly cookie scoped to the plugin's path, so the
//! page's own scripts and styles load without a ticket of their own.

use crate::state::{ApiState, PluginGate};
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use portico_core::config::defaults;
use portico_tickets::TicketClaims;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, error};
use url::Url;

pub const TICKET_COOKIE: &str = "portico_ticket";

/// GET /plugins/:plugin_id/
pub async fn plugin_index_handler(
    State(state): State<ApiState>,
    Path(plugin_id): Path<String>,
    request: Request,
) -> Response {
    serve_gated(&state, &plugin_id, "", request).await
}

/// GET /plugins/:plugin_id/*path
pub async fn plugin_asset_handler(
    State(state): State<ApiState>,
    Path((plugin_id, path)): Path<(String, String)>,
    request: Request,
) -> Response {
    serve_gated(&state, &plugin_id, &path, request).await
}

enum Admission {
    /// Fresh ticket from the query string.
    Entry { ticket: String, claims: TicketClaims },
    /// Ticket from the scoped cookie.
    Continuation,
}

async fn serve_gated(state: &ApiState, plugin_id: &str, path: &str, request: Request) -> Response {
    let Some(gate) = state.gate(plugin_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let admission = match admit(gate, request.uri(), request.headers()) {
        Some(admission) => admission,
        None => return StatusCode::FORBIDDEN.into_response(),
    };

    let mut response = match serve_file(gate, path, request).await {
        Ok(response) => response,
        Err(status) => return status.into_response(),
    };

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Admission::Entry { ticket, claims } = admission {
        // Lives exactly as long as validate_continuation would accept it.
        let deadline = claims.expires_at + gate.validator.clock_skew_secs();
        let max_age = (deadline - state.clock.now_secs()).max(0);
        let cookie = format!(
            "{}={}; Path=/plugins/{}/; Max-Age={}; HttpOnly; Secure; SameSite=None",
            TICKET_COOKIE, ticket, plugin_id, max_age
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.insert(header::SET_COOKIE, value);
            }
            Err(e) => error!(category = "api", error = %e, "Could not encode ticket cookie"),
        }
    }
    response
}

fn admit(gate: &PluginGate, uri: &Uri, headers: &HeaderMap) -> Option<Admission> {
    if let Some(ticket) = query_ticket(uri) {
        return gate
            .validator
            .validate(Some(&ticket))
            .ok()
            .map(|claims| Admission::Entry { ticket, claims });
    }

    match cookie_ticket(headers) {
        Some(ticket) => match gate.validator.validate_continuation(Some(&ticket)) {
            Ok(_) => Some(Admission::Continuation),
            Err(e) => {
                debug!(category = "api", reason = %e, "Continuation ticket refused");
                None
            }
        },
        None => {
            // Logged like every other denial.
            let _ = gate.validator.validate(None);
            None
        }
    }
}

async fn serve_file(gate: &PluginGate, path: &str, request: Request) -> Result<Response, StatusCode> {
    let uri = asset_uri(path).ok_or(StatusCode::BAD_REQUEST)?;
    let (mut parts, body) = request.into_parts();
    parts.uri = uri;
    let request = Request::from_parts(parts, body);

    match ServeDir::new(&gate.asset_dir).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(e) => {
            error!(category = "api", error = %e, "Failed to serve plugin asset");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Re-encode the already decoded wildcard path for `ServeDir`.
fn asset_uri(path: &str) -> Option<Uri> {
    let mut url = Url::parse("http://assets.invalid/").ok()?;
    url.path_segments_mut().ok()?.clear().extend(path.split('/'));
    url.path().parse().ok()
}

fn query_ticket(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == defaults::TICKET_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

fn cookie_ticket(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TICKET_COOKIE)
        .map(|(_, value)| value.to_string())
}
