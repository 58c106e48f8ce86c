//! Ticket issuance endpoint.

use crate::error::ApiError;
use crate::state::ApiState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTicketRequest {
    #[serde(default)]
    pub plugin_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueTicketResponse {
    pub ticket: String,
}

/// `Authorization: Bearer <credential>` → credential.
pub(crate) fn bearer_credential(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Issue a ticket for the caller.
///
/// POST /api/plugins/tickets
pub async fn issue_ticket_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<IssueTicketRequest>, JsonRejection>,
) -> Result<Json<IssueTicketResponse>, ApiError> {
    // An unreadable body counts as an empty plugin id, so a missing
    // credential is still reported first.
    let plugin_id = match body {
        Ok(Json(request)) => request.plugin_id,
        Err(rejection) => {
            debug!(category = "api", error = %rejection, "Unreadable ticket request body");
            String::new()
        }
    };

    let ticket = state
        .issuer
        .issue_encoded(bearer_credential(&headers), &plugin_id)
        .await?;
    Ok(Json(IssueTicketResponse { ticket }))
}
