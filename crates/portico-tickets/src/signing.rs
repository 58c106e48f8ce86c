//! HMAC-SHA256 signing for tickets.
//!
//! Issuer and validator must share one secret. The secret comes from
//! `PORTICO_TICKET_SECRET`; without it a random secret is generated, which
//! only works while issuer and validator live in the same process.

use crate::error::{Result, TicketError};
use hmac::{Hmac, Mac};
use portico_core::config::env_vars;
use rand::RngCore;
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Signs and verifies ticket bytes with a server-held secret.
#[derive(Clone)]
pub struct TicketSigner {
    key: Vec<u8>,
}

impl TicketSigner {
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TicketError::Internal(format!(
                "ticket secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self {
            key: secret.to_vec(),
        })
    }

    /// Read the secret from the environment, or generate a random one.
    pub fn from_env_or_generate() -> Self {
        match env_vars::ticket_secret() {
            Some(secret) => Self::new(secret.as_bytes()).unwrap_or_else(|_| {
                warn!(
                    category = "tickets",
                    "{} is shorter than {} bytes, using random secret",
                    env_vars::TICKET_SECRET,
                    MIN_SECRET_LEN
                );
                Self::generate_random()
            }),
            None => {
                warn!(
                    category = "tickets",
                    "No {} set, using random secret (tickets are invalid across restarts)",
                    env_vars::TICKET_SECRET
                );
                Self::generate_random()
            }
        }
    }

    pub fn generate_random() -> Self {
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|_| TicketError::Internal("invalid signing key length".to_string()))
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time signature check.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let mut mac = self.mac()?;
        mac.update(data);
        mac.verify_slice(signature)
            .map_err(|_| TicketError::BadSignature)
    }
}

impl std::fmt::Debug for TicketSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_sign_and_verify() {
        let signer = TicketSigner::new(SECRET).unwrap();
        let sig = signer.sign(b"payload").unwrap();
        assert_eq!(sig.len(), 32);
        assert!(signer.verify(b"payload", &sig).is_ok());
        assert_eq!(signer.verify(b"payloaD", &sig), Err(TicketError::BadSignature));
    }

    #[test]
    fn test_different_secrets_disagree() {
        let a = TicketSigner::new(SECRET).unwrap();
        let b = TicketSigner::generate_random();
        let sig = a.sign(b"payload").unwrap();
        assert!(b.verify(b"payload", &sig).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TicketSigner::new(b"short").is_err());
    }
}
