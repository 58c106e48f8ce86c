//! Ticket claims and wire encoding.
//!
//! Wire form: `base64url(header).base64url(claims).base64url(hmac)`, all
//! without padding. The signature covers the first two segments exactly as
//! transmitted.

use crate::error::{Result, TicketError};
use crate::signing::TicketSigner;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

const ALG: &str = "HS256";
const TYP: &str = "PTK";

/// Signed contents of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClaims {
    /// Unique ticket id, used for replay protection.
    #[serde(rename = "jti")]
    pub ticket_id: String,
    #[serde(rename = "sub")]
    pub subject_user_id: String,
    #[serde(rename = "plg")]
    pub plugin_id: String,
    /// Seconds since the Unix epoch.
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Seconds since the Unix epoch; the ticket is invalid from this instant on.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl TicketClaims {
    pub fn issued_at_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.issued_at, 0)
    }

    pub fn expires_at_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }
}

/// An issued ticket: its claims, signature and encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTicket {
    claims: TicketClaims,
    signature: String,
    encoded: String,
}

impl AccessTicket {
    pub fn claims(&self) -> &TicketClaims {
        &self.claims
    }

    pub fn ticket_id(&self) -> &str {
        &self.claims.ticket_id
    }

    pub fn subject_user_id(&self) -> &str {
        &self.claims.subject_user_id
    }

    pub fn plugin_id(&self) -> &str {
        &self.claims.plugin_id
    }

    pub fn issued_at(&self) -> i64 {
        self.claims.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.claims.expires_at
    }

    /// base64url signature segment.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The wire form to place in `?ticket=`.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn into_string(self) -> String {
        self.encoded
    }

    /// Sign `claims` into a ticket.
    pub fn seal(claims: TicketClaims, signer: &TicketSigner) -> Result<Self> {
        let header = BASE64_URL_SAFE_NO_PAD.encode(json!({"alg": ALG, "typ": TYP}).to_string());
        let body = serde_json::to_string(&claims)
            .map_err(|e| TicketError::Internal(format!("failed to encode claims: {}", e)))?;
        let body = BASE64_URL_SAFE_NO_PAD.encode(body);

        let signing_input = format!("{}.{}", header, body);
        let signature = BASE64_URL_SAFE_NO_PAD.encode(signer.sign(signing_input.as_bytes())?);
        let encoded = format!("{}.{}", signing_input, signature);

        Ok(Self {
            claims,
            signature,
            encoded,
        })
    }

    /// Check structure and signature of an encoded ticket and return its claims.
    ///
    /// Time checks are the validator's job.
    pub fn open(encoded: &str, signer: &TicketSigner) -> Result<TicketClaims> {
        let mut parts = encoded.split('.');
        let (header, body, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(b), Some(s), None) if !h.is_empty() && !b.is_empty() && !s.is_empty() => {
                (h, b, s)
            }
            _ => return Err(TicketError::Malformed("expected three segments".into())),
        };

        let signature = BASE64_URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TicketError::Malformed("invalid signature encoding".into()))?;
        let signing_input = &encoded[..header.len() + 1 + body.len()];
        signer.verify(signing_input.as_bytes(), &signature)?;

        let header: serde_json::Value = decode_segment(header, "header")?;
        if header["alg"] != ALG || header["typ"] != TYP {
            return Err(TicketError::Malformed("unsupported ticket header".into()));
        }

        let claims: TicketClaims = decode_segment(body, "claims")?;
        if claims.expires_at <= claims.issued_at {
            return Err(TicketError::Malformed("expiry precedes issuance".into()));
        }
        Ok(claims)
    }
}

impl std::fmt::Display for AccessTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> Result<T> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TicketError::Malformed(format!("invalid {} encoding", what)))?;
    serde_json::from_slice(&bytes).map_err(|_| TicketError::Malformed(format!("invalid {}", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TicketSigner {
        TicketSigner::new(b"ticket-test-secret-ticket-test-secret").unwrap()
    }

    fn claims() -> TicketClaims {
        TicketClaims {
            ticket_id: "t-1".into(),
            subject_user_id: "u1".into(),
            plugin_id: "crm".into(),
            issued_at: 1_700_000_000,
            expires_at: 1_700_000_060,
        }
    }

    #[test]
    fn test_seal_then_open() {
        let signer = signer();
        let ticket = AccessTicket::seal(claims(), &signer).unwrap();
        assert_eq!(ticket.as_str().split('.').count(), 3);
        assert!(ticket.as_str().ends_with(ticket.signature()));
        assert_eq!(AccessTicket::open(ticket.as_str(), &signer).unwrap(), claims());
    }

    #[test]
    fn test_claims_use_short_names() {
        let value = serde_json::to_value(claims()).unwrap();
        assert_eq!(value["sub"], "u1");
        assert_eq!(value["plg"], "crm");
        assert_eq!(value["exp"], 1_700_000_060);
    }

    #[test]
    fn test_structure_errors() {
        let signer = signer();
        for bad in ["", "a.b", "a.b.c.d", "..", "a..c"] {
            assert!(
                matches!(AccessTicket::open(bad, &signer), Err(TicketError::Malformed(_))),
                "{:?} should be malformed",
                bad
            );
        }
    }

    #[test]
    fn test_resigned_with_other_key_rejected() {
        let ticket = AccessTicket::seal(claims(), &TicketSigner::generate_random()).unwrap();
        assert_eq!(
            AccessTicket::open(ticket.as_str(), &signer()),
            Err(TicketError::BadSignature)
        );
    }

    #[test]
    fn test_forged_claims_rejected() {
        let signer = signer();
        let ticket = AccessTicket::seal(claims(), &signer).unwrap();
        let parts: Vec<&str> = ticket.as_str().split('.').collect();

        let mut forged = claims();
        forged.plugin_id = "billing".into();
        let forged_body = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(&forged).unwrap());
        let forged_ticket = format!("{}.{}.{}", parts[0], forged_body, parts[2]);

        assert_eq!(
            AccessTicket::open(&forged_ticket, &signer),
            Err(TicketError::BadSignature)
        );
    }
}
