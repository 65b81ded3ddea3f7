//! Handshake token verification.
//!
//! The realtime handshake carries its bearer token as the first offered
//! `Sec-WebSocket-Protocol` value. Verification turns that token into the
//! [`Claims`] snapshot the session keeps for its whole lifetime.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use squares_core::Claims;
use squares_settings::AuthSettings;
use thiserror::Error;

/// Token verification failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token was offered.
    #[error("missing token")]
    MissingToken,
    /// Signature, issuer, audience or shape check failed.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The token is past its expiry.
    #[error("token expired")]
    Expired,
}

/// Turns a raw token into a verified claims snapshot.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return its claims.
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// HS256 JWT verifier.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Verifier for tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 30;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Build from auth settings. `None` when no secret is configured.
    pub fn from_settings(settings: &AuthSettings) -> Option<Self> {
        let secret = settings.jwt_secret.as_deref()?;
        let mut verifier = Self::new(secret).with_leeway(settings.leeway_secs);
        if let Some(issuer) = &settings.issuer {
            verifier = verifier.with_issuer(issuer);
        }
        if let Some(audience) = &settings.audience {
            verifier = verifier.with_audience(audience);
        }
        Some(verifier)
    }

    /// Clock-skew leeway applied to `exp`.
    #[must_use]
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.validation.leeway = secs;
        self
    }

    /// Require this `iss`.
    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Require this `aud`.
    #[must_use]
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("missing subject".into()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token(secret: &str, payload: &serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            payload,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn exp_in(minutes: i64) -> i64 {
        (Utc::now() + Duration::minutes(minutes)).timestamp()
    }

    #[test]
    fn valid_token_yields_claims() {
        let t = token(
            SECRET,
            &json!({"sub": "alice", "exp": exp_in(10), "groups": ["players"]}),
        );
        let claims = JwtVerifier::new(SECRET).verify(&t).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.in_group("players"));
    }

    #[test]
    fn wrong_secret_rejected() {
        let t = token("other", &json!({"sub": "alice", "exp": exp_in(10)}));
        assert_matches!(
            JwtVerifier::new(SECRET).verify(&t),
            Err(AuthError::InvalidToken(_))
        );
    }

    #[test]
    fn expired_token_rejected() {
        let t = token(SECRET, &json!({"sub": "alice", "exp": exp_in(-10)}));
        assert_eq!(
            JwtVerifier::new(SECRET).with_leeway(0).verify(&t),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn leeway_tolerates_small_skew() {
        let exp = Utc::now().timestamp() - 5;
        let t = token(SECRET, &json!({"sub": "alice", "exp": exp}));
        assert!(JwtVerifier::new(SECRET).with_leeway(60).verify(&t).is_ok());
    }

    #[test]
    fn empty_token_is_missing() {
        assert_eq!(JwtVerifier::new(SECRET).verify(""), Err(AuthError::MissingToken));
    }

    #[test]
    fn garbage_token_rejected() {
        assert_matches!(
            JwtVerifier::new(SECRET).verify("not.a.jwt"),
            Err(AuthError::InvalidToken(_))
        );
    }

    #[test]
    fn empty_subject_rejected() {
        let t = token(SECRET, &json!({"sub": "", "exp": exp_in(10)}));
        assert_matches!(
            JwtVerifier::new(SECRET).verify(&t),
            Err(AuthError::InvalidToken(_))
        );
    }

    #[test]
    fn issuer_enforced_when_configured() {
        let verifier = JwtVerifier::new(SECRET).with_issuer("squares");
        let good = token(SECRET, &json!({"sub": "a", "exp": exp_in(10), "iss": "squares"}));
        let bad = token(SECRET, &json!({"sub": "a", "exp": exp_in(10), "iss": "elsewhere"}));
        assert!(verifier.verify(&good).is_ok());
        assert_matches!(verifier.verify(&bad), Err(AuthError::InvalidToken(_)));
    }

    #[test]
    fn audience_enforced_when_configured() {
        let verifier = JwtVerifier::new(SECRET).with_audience("viewers");
        let good = token(SECRET, &json!({"sub": "a", "exp": exp_in(10), "aud": "viewers"}));
        let bad = token(SECRET, &json!({"sub": "a", "exp": exp_in(10), "aud": "admins"}));
        assert!(verifier.verify(&good).is_ok());
        assert_matches!(verifier.verify(&bad), Err(AuthError::InvalidToken(_)));
    }

    #[test]
    fn from_settings_requires_secret() {
        let mut settings = AuthSettings::default();
        assert!(JwtVerifier::from_settings(&settings).is_none());
        settings.jwt_secret = Some(SECRET.into());
        settings.issuer = Some("squares".into());
        let verifier = JwtVerifier::from_settings(&settings).unwrap();
        let t = token(SECRET, &json!({"sub": "a", "exp": exp_in(10), "iss": "squares"}));
        assert!(verifier.verify(&t).is_ok());
    }
}
