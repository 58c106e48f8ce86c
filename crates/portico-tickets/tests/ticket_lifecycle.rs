//! Issue-then-validate behaviour across the ticket lifetime.

use portico_core::ManualClock;
use portico_tickets::{
    StaticCredentials, StaticEntitlements, TicketError, TicketIssuer, TicketSigner,
    TicketValidator,
};
use std::sync::Arc;

const T0: i64 = 1_750_000_000;

struct Fixture {
    issuer: TicketIssuer,
    validator: TicketValidator,
    clock: Arc<ManualClock>,
}

fn fixture() -> Fixture {
    let signer = Arc::new(TicketSigner::new(b"lifecycle-secret-lifecycle-secret-01").unwrap());
    let clock = Arc::new(ManualClock::at_secs(T0));
    let issuer = TicketIssuer::new(
        signer.clone(),
        clock.clone(),
        Arc::new(StaticCredentials::new().with_token("bearer-u1", "u1")),
        Arc::new(StaticEntitlements::new().grant("u1", "crm")),
    );
    let validator = TicketValidator::new(signer, clock.clone()).for_plugin("crm");
    Fixture {
        issuer,
        validator,
        clock,
    }
}

#[tokio::test]
async fn test_accepted_at_59_seconds() {
    let f = fixture();
    let ticket = f.issuer.issue(Some("bearer-u1"), "crm").await.unwrap();

    f.clock.advance_secs(59);
    let claims = f.validator.validate(Some(ticket.as_str())).unwrap();
    assert_eq!(claims.subject_user_id, "u1");
}

#[tokio::test]
async fn test_denied_at_61_seconds() {
    let f = fixture();
    let ticket = f.issuer.issue(Some("bearer-u1"), "crm").await.unwrap();

    f.clock.advance_secs(61);
    assert_eq!(
        f.validator.validate(Some(ticket.as_str())),
        Err(TicketError::Expired)
    );
}

#[tokio::test]
async fn test_denied_exactly_at_expiry() {
    let f = fixture();
    let ticket = f.issuer.issue(Some("bearer-u1"), "crm").await.unwrap();

    f.clock.advance_secs(60);
    assert!(f.validator.validate(Some(ticket.as_str())).is_err());
}

#[tokio::test]
async fn test_any_single_byte_tamper_is_denied() {
    let f = fixture();
    let ticket = f.issuer.issue(Some("bearer-u1"), "crm").await.unwrap();
    let original = ticket.as_str().to_string();
    let signed_len = original.rfind('.').unwrap();

    for i in 0..signed_len {
        let mut bytes = original.clone().into_bytes();
        if bytes[i] == b'.' {
            continue;
        }
        bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let result = f.validator.verify(Some(&tampered));
        assert!(
            matches!(
                result,
                Err(TicketError::BadSignature) | Err(TicketError::Malformed(_))
            ),
            "byte {} tampered but got {:?}",
            i,
            result
        );
    }

    // the untouched ticket is still good
    assert!(f.validator.validate(Some(&original)).is_ok());
}

#[tokio::test]
async fn test_replay_is_denied() {
    let f = fixture();
    let ticket = f.issuer.issue(Some("bearer-u1"), "crm").await.unwrap();

    assert!(f.validator.validate(Some(ticket.as_str())).is_ok());
    f.clock.advance_secs(1);
    assert_eq!(
        f.validator.validate(Some(ticket.as_str())),
        Err(TicketError::Replayed)
    );

    let fresh = f.issuer.issue(Some("bearer-u1"), "crm").await.unwrap();
    assert!(f.validator.validate(Some(fresh.as_str())).is_ok());
}
