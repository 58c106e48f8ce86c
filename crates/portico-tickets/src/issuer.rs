//! Ticket issuance.

use crate::error::{Result, TicketError};
use crate::identity::{CredentialVerifier, EntitlementStore};
use crate::signing::TicketSigner;
use crate::ticket::{AccessTicket, TicketClaims};
use portico_core::config::{defaults, TicketSettings};
use portico_core::SharedClock;
use std::sync::Arc;
use tracing::{info, warn};

/// Issues short-lived tickets to authenticated, entitled callers.
///
/// Issued tickets are not stored anywhere; the validator's replay guard is
/// what makes them single-use.
#[derive(Clone)]
pub struct TicketIssuer {
    signer: Arc<TicketSigner>,
    clock: SharedClock,
    ttl_secs: i64,
    credentials: Arc<dyn CredentialVerifier>,
    entitlements: Arc<dyn EntitlementStore>,
}

impl TicketIssuer {
    pub fn new(
        signer: Arc<TicketSigner>,
        clock: SharedClock,
        credentials: Arc<dyn CredentialVerifier>,
        entitlements: Arc<dyn EntitlementStore>,
    ) -> Self {
        Self {
            signer,
            clock,
            ttl_secs: defaults::TICKET_TTL_SECS,
            credentials,
            entitlements,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_settings(self, settings: &TicketSettings) -> Self {
        self.with_ttl_secs(settings.ttl_secs)
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a ticket authorizing the credential's owner to load `plugin_id`.
    ///
    /// Checks run in order: credential, argument, entitlement.
    pub async fn issue(&self, credential: Option<&str>, plugin_id: &str) -> Result<AccessTicket> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(TicketError::MissingCredential)?;
        let caller = self.credentials.verify(credential).await?;

        let plugin_id = plugin_id.trim();
        if plugin_id.is_empty() {
            return Err(TicketError::InvalidArgument(
                "pluginId must not be empty".into(),
            ));
        }

        let entitled = self.entitlements.entitlements(&caller.uid).await?;
        if !entitled.contains(plugin_id) {
            warn!(
                category = "tickets",
                uid = %caller.uid,
                plugin_id = plugin_id,
                "Ticket refused: not entitled"
            );
            return Err(TicketError::NotEntitled {
                uid: caller.uid,
                plugin_id: plugin_id.to_string(),
            });
        }

        let now = self.clock.now_secs();
        let claims = TicketClaims {
            ticket_id: uuid::Uuid::new_v4().to_string(),
            subject_user_id: caller.uid,
            plugin_id: plugin_id.to_string(),
            issued_at: now,
            expires_at: now + self.ttl_secs,
        };
        let ticket = AccessTicket::seal(claims, &self.signer)?;

        info!(
            category = "tickets",
            ticket_id = %ticket.ticket_id(),
            uid = %ticket.subject_user_id(),
            plugin_id = plugin_id,
            expires_at = ticket.expires_at(),
            "Ticket issued"
        );
        Ok(ticket)
    }

    /// [`issue`](Self::issue), returning only the wire form.
    pub async fn issue_encoded(&self, credential: Option<&str>, plugin_id: &str) -> Result<String> {
        self.issue(credential, plugin_id)
            .await
            .map(AccessTicket::into_string)
    }
}
