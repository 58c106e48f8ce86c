//! Where the frame host gets its access tickets from.

use crate::error::{FrameError, Result};
use async_trait::async_trait;
use portico_core::ErrorKind;
use portico_tickets::TicketIssuer;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Obtains a ticket authorizing the bearer's user to load one plugin.
#[async_trait]
pub trait TicketSource: Send + Sync {
    async fn request_ticket(&self, plugin_id: &str, bearer: Option<&str>) -> Result<String>;
}

/// In-process issuance, for hosts that run the issuer themselves.
#[async_trait]
impl TicketSource for TicketIssuer {
    async fn request_ticket(&self, plugin_id: &str, bearer: Option<&str>) -> Result<String> {
        Ok(self.issue_encoded(bearer, plugin_id).await?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketRequestBody<'a> {
    plugin_id: &'a str,
}

#[derive(Deserialize)]
struct TicketResponseBody {
    ticket: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<ErrorKind>,
}

/// Client for the `POST /api/plugins/tickets` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTicketSource {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTicketSource {
    pub const TICKETS_PATH: &'static str = "/api/plugins/tickets";

    /// `base` is the issuing server, e.g. `https://app.example.com`.
    pub fn new(base: &Url) -> Result<Self> {
        let endpoint = base.join(Self::TICKETS_PATH)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FrameError::TicketService {
                kind: ErrorKind::Internal,
                message: e.to_string(),
            })?;
        Ok(Self { client, endpoint })
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TicketSource for HttpTicketSource {
    async fn request_ticket(&self, plugin_id: &str, bearer: Option<&str>) -> Result<String> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&TicketRequestBody { plugin_id });
        if let Some(bearer) = bearer {
            request = request.bearer_auth(bearer);
        }

        let response = request.send().await.map_err(|e| FrameError::TicketService {
            kind: ErrorKind::Internal,
            message: e.to_string(),
        })?;
        let status = response.status();

        if status.is_success() {
            let body: TicketResponseBody =
                response.json().await.map_err(|e| FrameError::TicketService {
                    kind: ErrorKind::Internal,
                    message: format!("Invalid ticket response: {}", e),
                })?;
            debug!(category = "frame", plugin_id = plugin_id, "Ticket received from service");
            return Ok(body.ticket);
        }

        let (kind, message) = match response.json::<ErrorBody>().await {
            Ok(body) => (body.code.unwrap_or_else(|| kind_for_status(status)), body.error),
            Err(_) => (kind_for_status(status), status.to_string()),
        };
        warn!(
            category = "frame",
            plugin_id = plugin_id,
            status = status.as_u16(),
            kind = %kind,
            "Ticket service refused request"
        );
        Err(FrameError::TicketService { kind, message })
    }
}

fn kind_for_status(status: reqwest::StatusCode) -> ErrorKind {
    match status.as_u16() {
        400 => ErrorKind::InvalidArgument,
        401 => ErrorKind::Unauthenticated,
        403 => ErrorKind::PermissionDenied,
        404 => ErrorKind::NotFound,
        _ => ErrorKind::Internal,
    }
}
