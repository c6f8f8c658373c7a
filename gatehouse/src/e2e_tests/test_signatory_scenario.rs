//! Sign with one secret, validate with the same and a different secret.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::claims::ClaimStore;
use crate::signatory::{EXPIRY_CLAIM, Signatory};

#[test]
fn test_alice_round_trip() {
    let mut store = ClaimStore::new();
    store.set("user", "alice");

    let token = Signatory::new(Duration::from_secs(3_600))
        .with_secret("s")
        .sign(&store, &["user"])
        .expect("signed token");

    let mut validated = ClaimStore::new();
    assert!(
        Signatory::new(Duration::from_secs(3_600))
            .with_secret("s")
            .validate(&mut validated, &token)
    );
    assert_eq!(
        validated.get_as::<String>("user"),
        Ok(Some("alice".to_string()))
    );

    let now = i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs(),
    )
    .expect("seconds fit in i64");
    let expiry = validated
        .get_as::<i64>(EXPIRY_CLAIM)
        .expect("integer expiry")
        .expect("expiry present");
    assert!((now + 3_595..=now + 3_600).contains(&expiry));

    let mut rejected = ClaimStore::new();
    assert!(
        !Signatory::new(Duration::from_secs(3_600))
            .with_secret("t")
            .validate(&mut rejected, &token)
    );
    assert!(rejected.is_empty());
}

#[test]
fn test_validation_ttl_is_irrelevant() {
    let token = Signatory::new(Duration::from_secs(60))
        .with_secret("s")
        .sign(&ClaimStore::new(), &[])
        .expect("signed token");

    // A verifier with no TTL of its own still checks the signed expiry.
    let mut store = ClaimStore::new();
    assert!(
        Signatory::new(Duration::ZERO)
            .with_secret("s")
            .validate(&mut store, &token)
    );
}
