//! Ticket validation in front of a plugin's asset origin.

use crate::error::{Result, TicketError};
use crate::replay::ReplayGuard;
use crate::signing::TicketSigner;
use crate::ticket::{AccessTicket, TicketClaims};
use portico_core::config::{defaults, TicketSettings};
use portico_core::SharedClock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Verifies signature, expiry and single use of tickets.
///
/// A ticket issued at `t0` with TTL `ttl` is accepted while
/// `now < t0 + ttl + skew` and denied from that instant on.
#[derive(Clone)]
pub struct TicketValidator {
    signer: Arc<TicketSigner>,
    clock: SharedClock,
    clock_skew_secs: i64,
    replay: Option<Arc<ReplayGuard>>,
    plugin_id: Option<String>,
}

impl TicketValidator {
    /// A validator with default skew (none) and single-use enforcement.
    pub fn new(signer: Arc<TicketSigner>, clock: SharedClock) -> Self {
        Self {
            signer,
            clock,
            clock_skew_secs: defaults::CLOCK_SKEW_SECS,
            replay: Some(Arc::new(ReplayGuard::new(defaults::REPLAY_CAPACITY))),
            plugin_id: None,
        }
    }

    pub fn from_settings(
        signer: Arc<TicketSigner>,
        clock: SharedClock,
        settings: &TicketSettings,
    ) -> Self {
        let replay = settings
            .single_use
            .then(|| Arc::new(ReplayGuard::new(settings.replay_capacity)));
        Self {
            signer,
            clock,
            clock_skew_secs: settings.clock_skew_secs.max(0),
            replay,
            plugin_id: None,
        }
    }

    /// Only accept tickets issued for `plugin_id`.
    pub fn for_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    pub fn with_clock_skew(mut self, secs: i64) -> Self {
        self.clock_skew_secs = secs.max(0);
        self
    }

    /// Share one replay guard between several validators.
    pub fn with_replay_guard(mut self, guard: Arc<ReplayGuard>) -> Self {
        self.replay = Some(guard);
        self
    }

    pub fn without_replay_protection(mut self) -> Self {
        self.replay = None;
        self
    }

    pub fn plugin_id(&self) -> Option<&str> {
        self.plugin_id.as_deref()
    }

    /// Seconds past `exp` a ticket is still accepted.
    pub fn clock_skew_secs(&self) -> i64 {
        self.clock_skew_secs
    }

    pub fn replay_guard(&self) -> Option<&Arc<ReplayGuard>> {
        self.replay.as_ref()
    }

    /// Check a ticket without consuming it.
    pub fn verify(&self, ticket: Option<&str>) -> Result<TicketClaims> {
        let ticket = ticket
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(TicketError::MissingTicket)?;

        let claims = AccessTicket::open(ticket, &self.signer)?;
        let now = self.clock.now_secs();

        if now >= claims.expires_at + self.clock_skew_secs {
            return Err(TicketError::Expired);
        }
        if claims.issued_at > now + self.clock_skew_secs {
            return Err(TicketError::NotYetValid);
        }
        if let Some(expected) = &self.plugin_id {
            if &claims.plugin_id != expected {
                return Err(TicketError::PluginMismatch);
            }
        }
        Ok(claims)
    }

    /// Check a ticket and mark it used.
    ///
    /// This is the gate for a fresh plugin load; every failure means the
    /// protected content must not be served.
    pub fn validate(&self, ticket: Option<&str>) -> Result<TicketClaims> {
        let result = self.verify(ticket).and_then(|claims| {
            if let Some(replay) = &self.replay {
                replay.consume(
                    &claims.ticket_id,
                    claims.expires_at + self.clock_skew_secs,
                    self.clock.now_secs(),
                )?;
            }
            Ok(claims)
        });

        match &result {
            Ok(claims) => debug!(
                category = "tickets",
                ticket_id = %claims.ticket_id,
                plugin_id = %claims.plugin_id,
                "Ticket accepted"
            ),
            Err(e) => warn!(
                category = "tickets",
                plugin_id = self.plugin_id.as_deref().unwrap_or("*"),
                reason = %e,
                "Ticket denied"
            ),
        }
        result
    }

    /// Accept a ticket that already passed [`validate`](Self::validate) and
    /// is still live, for further requests belonging to the same load.
    ///
    /// Without replay protection this is the same as [`verify`](Self::verify).
    pub fn validate_continuation(&self, ticket: Option<&str>) -> Result<TicketClaims> {
        let claims = self.verify(ticket)?;
        match &self.replay {
            Some(replay) if !replay.is_consumed(&claims.ticket_id, self.clock.now_secs()) => {
                warn!(
                    category = "tickets",
                    ticket_id = %claims.ticket_id,
                    "Continuation presented for a ticket that was never accepted"
                );
                Err(TicketError::MissingTicket)
            }
            _ => Ok(claims),
        }
    }
}

impl std::fmt::Debug for TicketValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketValidator")
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("single_use", &self.replay.is_some())
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::ManualClock;

    const T0: i64 = 1_700_000_000;

    fn setup() -> (Arc<TicketSigner>, Arc<ManualClock>, TicketValidator) {
        let signer = Arc::new(TicketSigner::new(b"validator-test-secret-validator-test").unwrap());
        let clock = Arc::new(ManualClock::at_secs(T0));
        let validator = TicketValidator::new(signer.clone(), clock.clone());
        (signer, clock, validator)
    }

    fn ticket(signer: &TicketSigner, id: &str, plugin: &str) -> AccessTicket {
        AccessTicket::seal(
            TicketClaims {
                ticket_id: id.into(),
                subject_user_id: "u1".into(),
                plugin_id: plugin.into(),
                issued_at: T0,
                expires_at: T0 + 60,
            },
            signer,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_ticket_denied() {
        let (_, _, validator) = setup();
        assert_eq!(validator.validate(None), Err(TicketError::MissingTicket));
        assert_eq!(validator.validate(Some("  ")), Err(TicketError::MissingTicket));
    }

    #[test]
    fn test_expiry_boundary() {
        let (signer, clock, validator) = setup();
        let validator = validator.without_replay_protection();
        let t = ticket(&signer, "t", "crm");

        clock.advance_secs(59);
        assert!(validator.validate(Some(t.as_str())).is_ok());
        clock.advance_secs(1);
        assert_eq!(validator.validate(Some(t.as_str())), Err(TicketError::Expired));
    }

    #[test]
    fn test_clock_skew_tolerance() {
        let (signer, clock, validator) = setup();
        let validator = validator.without_replay_protection().with_clock_skew(5);
        let t = ticket(&signer, "t", "crm");

        clock.set(chrono::DateTime::from_timestamp(T0 - 3, 0).unwrap());
        assert!(validator.verify(Some(t.as_str())).is_ok());

        clock.set(chrono::DateTime::from_timestamp(T0 + 64, 0).unwrap());
        assert!(validator.verify(Some(t.as_str())).is_ok());
        clock.advance_secs(1);
        assert_eq!(validator.verify(Some(t.as_str())), Err(TicketError::Expired));
    }

    #[test]
    fn test_future_ticket_rejected_without_skew() {
        let (signer, clock, validator) = setup();
        let t = ticket(&signer, "t", "crm");
        clock.set(chrono::DateTime::from_timestamp(T0 - 1, 0).unwrap());
        assert_eq!(validator.verify(Some(t.as_str())), Err(TicketError::NotYetValid));
    }

    #[test]
    fn test_plugin_binding() {
        let (signer, _, validator) = setup();
        let validator = validator.for_plugin("crm");
        let wrong = ticket(&signer, "t1", "billing");
        assert_eq!(validator.validate(Some(wrong.as_str())), Err(TicketError::PluginMismatch));
        let right = ticket(&signer, "t2", "crm");
        assert_eq!(validator.validate(Some(right.as_str())).unwrap().plugin_id, "crm");
    }

    #[test]
    fn test_single_use_and_continuation() {
        let (signer, clock, validator) = setup();
        let t = ticket(&signer, "t", "crm");

        assert_eq!(
            validator.validate_continuation(Some(t.as_str())),
            Err(TicketError::MissingTicket)
        );
        assert!(validator.validate(Some(t.as_str())).is_ok());
        assert_eq!(validator.validate(Some(t.as_str())), Err(TicketError::Replayed));
        assert!(validator.validate_continuation(Some(t.as_str())).is_ok());

        clock.advance_secs(60);
        assert_eq!(
            validator.validate_continuation(Some(t.as_str())),
            Err(TicketError::Expired)
        );
    }

    #[test]
    fn test_verify_does_not_consume() {
        let (signer, _, validator) = setup();
        let t = ticket(&signer, "t", "crm");
        assert!(validator.verify(Some(t.as_str())).is_ok());
        assert!(validator.verify(Some(t.as_str())).is_ok());
        assert!(validator.validate(Some(t.as_str())).is_ok());
    }
}
