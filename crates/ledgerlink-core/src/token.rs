//! Credential validity checks.
//!
//! A credential is a JWT-shaped bearer string whose middle segment is a
//! base64url JSON payload carrying `exp` (seconds since the epoch). Validity
//! is a pure function of the token and the current instant: nothing here
//! caches a verdict, and every malformed input fails closed.
//!
//! Signature verification is the server's job; the client only needs to
//! know whether presenting the token is still worthwhile.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::session::Session;

// ── Clock ────────────────────────────────────────────────────────────

/// Source of "now" for validity decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Cheap to clone; clones share time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    epoch_secs: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            epoch_secs: Arc::new(AtomicI64::new(start.timestamp())),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.epoch_secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.epoch_secs.store(to.timestamp(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.epoch_secs.load(Ordering::SeqCst), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

// ── Validity ─────────────────────────────────────────────────────────

/// Decode the expiry embedded in `token`, if there is a readable one.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    segments.next()?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let exp = claims.get("exp")?;
    let secs = exp.as_i64().or_else(|| {
        exp.as_f64()
            .filter(|f| f.is_finite())
            .map(|f| f.floor() as i64)
    })?;

    Utc.timestamp_opt(secs, 0).single()
}

/// `true` iff the embedded expiry is strictly after `now`.
pub fn is_valid_at(token: &str, now: DateTime<Utc>) -> bool {
    expires_at(token).is_some_and(|exp| exp > now)
}

/// [`is_valid_at`] against the wall clock.
pub fn is_valid(token: &str) -> bool {
    is_valid_at(token, Utc::now())
}

/// A session is usable when it names an identity and its token is valid.
/// The role is a closed enum, so a session that deserialized has one.
pub fn is_session_valid(session: &Session, now: DateTime<Utc>) -> bool {
    !session.credential.email.trim().is_empty() && is_valid_at(&session.credential.token, now)
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    /// An unsigned JWT-shaped token with the given expiry.
    pub(crate) fn token_expiring(exp: DateTime<Utc>) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            json!({ "sub": "jo@bank.io", "role": "USER", "exp": exp.timestamp() }).to_string(),
        );
        format!("{header}.{payload}.signature")
    }
}

#[cfg(test)]
mod tests {
    use super::test_tokens::token_expiring;
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_default()
    }

    #[test]
    fn future_expiry_is_valid() {
        let token = token_expiring(now() + Duration::minutes(5));
        assert!(is_valid_at(&token, now()));
        assert_eq!(expires_at(&token), Some(now() + Duration::minutes(5)));
    }

    #[test]
    fn past_or_present_expiry_is_invalid() {
        assert!(!is_valid_at(&token_expiring(now() - Duration::seconds(1)), now()));
        assert!(!is_valid_at(&token_expiring(now()), now()));
    }

    #[test]
    fn garbage_fails_closed() {
        for token in [
            "",
            "not-a-token",
            "a.b",
            "a.!!!.c",
            "a.b.c.d",
            &format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json")),
            &format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"x"}"#)),
            &format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"exp":"tomorrow"}"#)),
        ] {
            assert!(!is_valid_at(token, now()), "{token:?} should be invalid");
        }
    }

    #[test]
    fn padded_payload_and_fractional_exp_are_accepted() {
        let exp = (now() + Duration::hours(1)).timestamp();
        let payload = base64::engine::general_purpose::URL_SAFE
            .encode(format!(r#"{{"exp":{exp}.5}}"#));
        let token = format!("h.{payload}.s");
        assert!(is_valid_at(&token, now()));
    }

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new(now());
        assert_eq!(clock.now(), now());
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), now() + Duration::seconds(90));
    }
}
