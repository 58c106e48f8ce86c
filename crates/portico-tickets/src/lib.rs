//! Plugin access tickets.
//!
//! A ticket is a short-lived signed capability authorizing one user to load
//! one plugin. The [`TicketIssuer`] mints tickets for authenticated,
//! entitled callers; the [`TicketValidator`] sits in front of a plugin's
//! asset origin and refuses to serve anything without a valid one.
//!
//! # Usage
//!
//! ```rust,ignore
//! let signer = Arc::new(TicketSigner::new(secret)?);
//! let issuer = TicketIssuer::new(signer.clone(), clock.clone(), credentials, entitlements);
//! let validator = TicketValidator::new(signer, clock).for_plugin("crm");
//!
//! let ticket = issuer.issue(Some(bearer), "crm").await?;
//! let claims = validator.validate(Some(ticket.as_str()))?;
//! ```

pub mod error;
pub mod identity;
pub mod issuer;
pub mod replay;
pub mod signing;
pub mod ticket;
pub mod validator;

pub use error::{Result, TicketError};
pub use identity::{
    CallerIdentity, CredentialVerifier, EntitlementStore, StaticCredentials, StaticEntitlements,
};
pub use issuer::TicketIssuer;
pub use replay::ReplayGuard;
pub use signing::TicketSigner;
pub use ticket::{AccessTicket, TicketClaims};
pub use validator::TicketValidator;
