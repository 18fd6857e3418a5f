use std::time::{Duration, SystemTime};

use aws_lc_rs::{hmac, rand};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::prelude::*;
use super::Principal;


/// Key used to sign and verify session tokens.
///
/// A session token has the form `<username>.<expiry>.<tag>`, where the
/// username is base64-encoded, the expiry is a decimal unix timestamp in
/// seconds, and the tag is the base64-encoded HMAC-SHA256 of everything
/// before it. The server stores nothing per session: a token is valid iff
/// its tag matches and its expiry has not passed.
pub struct SessionKey(hmac::Key);

impl SessionKey {
    pub fn from_secret(secret: &str) -> Self {
        Self(hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()))
    }

    /// Generates a random key. Sessions signed with it die with the process.
    pub fn ephemeral() -> Result<Self> {
        let mut bytes = [0u8; 32];
        rand::fill(&mut bytes).map_err(|_| anyhow!("failed to gather random bytes"))?;
        Ok(Self(hmac::Key::new(hmac::HMAC_SHA256, &bytes)))
    }

    /// Creates a signed session token for the given user, expiring
    /// `lifetime` from now.
    pub fn issue(&self, username: &str, lifetime: Duration) -> String {
        self.issue_at(username, lifetime, unix_now())
    }

    fn issue_at(&self, username: &str, lifetime: Duration, now: u64) -> String {
        let expiry = now.saturating_add(lifetime.as_secs());
        let message = format!("{}.{expiry}", URL_SAFE_NO_PAD.encode(username));
        let tag = hmac::sign(&self.0, message.as_bytes());
        format!("{message}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref()))
    }

    /// Verifies a session token, returning the user it was issued to.
    pub fn verify(&self, token: &str) -> Result<Principal, SessionError> {
        self.verify_at(token, unix_now())
    }

    fn verify_at(&self, token: &str, now: u64) -> Result<Principal, SessionError> {
        // Check the signature before interpreting anything else.
        let (message, tag) = token.rsplit_once('.').ok_or(SessionError::InvalidFormat)?;
        let tag = decode_base64(tag)?;
        hmac::verify(&self.0, message.as_bytes(), &tag)
            .map_err(|_| SessionError::InvalidSignature)?;

        let (username, expiry) = message.split_once('.').ok_or(SessionError::InvalidFormat)?;
        let expiry: u64 = expiry.parse().map_err(|_| SessionError::InvalidFormat)?;
        if expiry < now {
            return Err(SessionError::Expired);
        }

        let username = decode_base64(username)?;
        let username = String::from_utf8(username).map_err(|_| SessionError::InvalidFormat)?;
        Ok(Principal::new(username))
    }
}

/// Reasons to reject a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Surface format incorrect (two dots, base64, decimal expiry).
    InvalidFormat,

    /// The tag does not match, i.e. this key never issued the token.
    InvalidSignature,

    /// The expiry timestamp has passed.
    Expired,
}

fn decode_base64(base64: &str) -> Result<Vec<u8>, SessionError> {
    URL_SAFE_NO_PAD.decode(base64).map_err(|_| SessionError::InvalidFormat)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system time is before unix epoch, interesting")
        .as_secs()
}


#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;
    const LIFETIME: Duration = Duration::from_secs(60 * 60);

    fn key() -> SessionKey {
        SessionKey::from_secret("correct horse battery staple")
    }

    #[test]
    fn round_trip() {
        let token = key().issue_at("admin", LIFETIME, NOW);
        let principal = key().verify_at(&token, NOW).unwrap();
        assert_eq!(principal.username(), "admin");

        // Usernames are not limited to the token's own alphabet.
        let token = key().issue_at("löwe.23=x", LIFETIME, NOW);
        assert_eq!(key().verify_at(&token, NOW).unwrap().username(), "löwe.23=x");
    }

    #[test]
    fn expired() {
        let token = key().issue_at("admin", LIFETIME, NOW);
        assert!(key().verify_at(&token, NOW + LIFETIME.as_secs()).is_ok());
        assert_eq!(
            key().verify_at(&token, NOW + LIFETIME.as_secs() + 1).unwrap_err(),
            SessionError::Expired,
        );
    }

    #[test]
    fn tampered() {
        let token = key().issue_at("admin", LIFETIME, NOW);
        let parts: Vec<_> = token.split('.').collect();
        let forged_username = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode("root"), parts[1], parts[2],
        );
        let forged_expiry = format!("{}.{}.{}", parts[0], u64::MAX, parts[2]);

        for forged in [forged_username, forged_expiry] {
            assert_eq!(
                key().verify_at(&forged, NOW).unwrap_err(),
                SessionError::InvalidSignature,
            );
        }
    }

    #[test]
    fn wrong_key() {
        let token = key().issue_at("admin", LIFETIME, NOW);
        let other = SessionKey::from_secret("hunter2");
        assert_eq!(
            other.verify_at(&token, NOW).unwrap_err(),
            SessionError::InvalidSignature,
        );
    }

    #[test]
    fn ephemeral_keys_differ() {
        let a = SessionKey::ephemeral().unwrap();
        let b = SessionKey::ephemeral().unwrap();
        let token = a.issue_at("admin", LIFETIME, NOW);
        assert!(a.verify_at(&token, NOW).is_ok());
        assert!(b.verify_at(&token, NOW).is_err());
    }

    #[test]
    fn garbage() {
        for bad in ["", ".", "..", "zzz", "a.b", "a.b.c.d", "!!!.123.!!!"] {
            assert!(key().verify_at(bad, NOW).is_err(), "accepted {bad:?}");
        }
    }
}
