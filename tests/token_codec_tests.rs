use chrono::{TimeDelta, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use press_portal::{
    TokenCodec,
    auth::Rejection,
    models::Role,
    token::{Claims, ManualClock},
};
use std::sync::Arc;
use uuid::Uuid;

const SECRET: &str = "codec-test-secret";

fn codec_with_clock() -> (TokenCodec, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let codec = TokenCodec::with_clock(SECRET, TimeDelta::minutes(30), clock.clone()).unwrap();
    (codec, clock)
}

/// Signs arbitrary claims with `secret`, bypassing the codec's own invariants.
fn forge(claims: &Claims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[test]
fn test_issued_token_parses_back_to_the_same_identity() {
    let (codec, clock) = codec_with_clock();
    let user_id = Uuid::new_v4();
    let token = codec.issue(user_id, "alice", Role::Admin).unwrap();

    clock.advance(TimeDelta::minutes(29));
    let claims = codec.parse(&token).unwrap();

    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.role, Role::Admin);
    assert_eq!(claims.exp - claims.iat, 30 * 60);
}

#[test]
fn test_expired_token_is_expired_whoever_signed_it() {
    let (codec, clock) = codec_with_clock();
    let now = clock_now(&clock);
    let stale = Claims {
        sub: Uuid::new_v4(),
        username: "mallory".into(),
        role: Role::User,
        iat: now - 7200,
        exp: now - 3600,
    };

    assert_eq!(codec.parse(&forge(&stale, SECRET)), Err(Rejection::Expired));
    assert_eq!(
        codec.parse(&forge(&stale, "not-our-secret")),
        Err(Rejection::Expired)
    );
}

#[test]
fn test_foreign_secret_is_a_bad_signature() {
    let (codec, _) = codec_with_clock();
    let other = TokenCodec::new("not-our-secret", TimeDelta::minutes(30)).unwrap();
    let token = other.issue(Uuid::new_v4(), "mallory", Role::Admin).unwrap();

    assert_eq!(codec.parse(&token), Err(Rejection::BadSignature));
}

#[test]
fn test_tampered_payload_is_a_bad_signature() {
    let (codec, _) = codec_with_clock();
    let token = codec.issue(Uuid::new_v4(), "alice", Role::User).unwrap();

    // Swap in the payload of an admin token signed by someone else.
    let other = TokenCodec::new("not-our-secret", TimeDelta::minutes(30)).unwrap();
    let forged = other.issue(Uuid::new_v4(), "alice", Role::Admin).unwrap();
    let mut segments: Vec<&str> = token.split('.').collect();
    segments[1] = forged.split('.').nth(1).unwrap();
    let spliced = segments.join(".");

    assert_eq!(codec.parse(&spliced), Err(Rejection::BadSignature));
}

#[test]
fn test_claims_with_inverted_window_are_malformed() {
    let (codec, clock) = codec_with_clock();
    let now = clock_now(&clock);
    let inverted = Claims {
        sub: Uuid::new_v4(),
        username: "alice".into(),
        role: Role::User,
        iat: now + 7200,
        exp: now + 3600,
    };

    assert_eq!(
        codec.parse(&forge(&inverted, SECRET)),
        Err(Rejection::Malformed)
    );
}

#[test]
fn test_structurally_broken_tokens_are_malformed() {
    let (codec, _) = codec_with_clock();
    for token in ["", "abc", "a.b.c", "Bearer x.y.z"] {
        assert_eq!(codec.parse(token), Err(Rejection::Malformed), "{token:?}");
    }
}

fn clock_now(clock: &ManualClock) -> i64 {
    use press_portal::token::Clock;
    clock.now().timestamp()
}
