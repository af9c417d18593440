//! Transient OAuth request state.
//!
//! Each login attempt gets a signed, short-lived token carrying the CSRF
//! state, the PKCE verifier, and the path the user came from. The token
//! travels as a cookie (and is mirrored into `sessionStorage` for the
//! blocked-cookie recovery path) and is valid for exactly one callback:
//! the `jti` is recorded in [`ConsumedStates`] when the callback first
//! processes it, and any replay is rejected.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{Error, Result};

/// Claims inside the state token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateClaims {
    /// Unique id for single-use enforcement.
    pub jti: String,
    /// CSRF token echoed back by the provider in the `state` query parameter.
    pub state: String,
    /// PKCE code verifier, released to the provider only at code exchange.
    pub verifier: String,
    /// Relative path to return the user to after login.
    pub origin: String,
    pub iat: i64,
    pub exp: i64,
}

/// Everything the login handler needs to start a flow.
pub struct IssuedState {
    /// Signed token to set as the state cookie.
    pub token: String,
    /// CSRF state to put in the authorization URL.
    pub state: String,
    /// PKCE S256 challenge to put in the authorization URL.
    pub challenge: String,
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// PKCE S256 challenge for a verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Issue a fresh state token for a login attempt returning to `origin`.
pub fn issue_state(origin: &str, config: &Config) -> Result<IssuedState> {
    let now = Utc::now();
    let ttl = chrono::Duration::from_std(config.auth.state.ttl)
        .map_err(|_| Error::Internal { operation: "oauth state ttl out of range".to_string() })?;
    let verifier = random_token();
    let challenge = pkce_challenge(&verifier);
    let claims = StateClaims {
        jti: Uuid::new_v4().to_string(),
        state: random_token(),
        verifier,
        origin: origin.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    let secret = config.secret_key.as_deref().unwrap_or_default();
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal { operation: format!("failed to sign oauth state: {e}") })?;

    Ok(IssuedState { token, state: claims.state, challenge })
}

/// Verify a state token. Any failure (bad signature, expired, garbage)
/// collapses to [`Error::MissingOAuthState`]: from the caller's point of view
/// there is no usable state either way.
pub fn verify_state(token: &str, config: &Config) -> Result<StateClaims> {
    let secret = config.secret_key.as_deref().unwrap_or_default();
    let data = decode::<StateClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("oauth state token rejected: {e}");
        Error::MissingOAuthState
    })?;
    Ok(data.claims)
}

/// `Set-Cookie` value for the state cookie.
///
/// Always `SameSite=Lax`: the cookie has to be sent on the top-level
/// redirect back from the provider, which `Strict` would block.
pub fn state_cookie(token: &str, config: &Config) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.auth.state.cookie_name,
        token,
        config.auth.state.ttl.as_secs(),
    );
    if config.auth.session.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that expires the state cookie.
pub fn clear_state_cookie(config: &Config) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.auth.state.cookie_name
    )
}

/// Registry of state token ids that have already been used at the callback.
///
/// Entries only need to live as long as the token they guard, so expired
/// ones are swept opportunistically on each insert.
#[derive(Debug, Default)]
pub struct ConsumedStates {
    inner: DashMap<String, i64>,
}

impl ConsumedStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a state id as consumed. Returns `false` if it was already
    /// consumed, which callers must treat as a replay.
    pub fn consume(&self, jti: &str, exp: i64) -> bool {
        let now = Utc::now().timestamp();
        self.inner.retain(|_, entry_exp| *entry_exp > now);
        self.inner.insert(jti.to_string(), exp).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    #[test]
    fn issued_state_round_trips() {
        let config = create_test_config();
        let issued = issue_state("/cart", &config).unwrap();
        let claims = verify_state(&issued.token, &config).unwrap();
        assert_eq!(claims.state, issued.state);
        assert_eq!(claims.origin, "/cart");
        assert_eq!(pkce_challenge(&claims.verifier), issued.challenge);
    }

    #[test]
    fn each_issue_is_unique() {
        let config = create_test_config();
        let a = issue_state("/", &config).unwrap();
        let b = issue_state("/", &config).unwrap();
        assert_ne!(a.state, b.state);
        let ca = verify_state(&a.token, &config).unwrap();
        let cb = verify_state(&b.token, &config).unwrap();
        assert_ne!(ca.jti, cb.jti);
        assert_ne!(ca.verifier, cb.verifier);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let config = create_test_config();
        let issued = issue_state("/", &config).unwrap();
        let mut tampered = issued.token.clone();
        tampered.push('x');
        assert!(matches!(
            verify_state(&tampered, &config),
            Err(Error::MissingOAuthState)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let config = create_test_config();
        let issued = issue_state("/", &config).unwrap();
        let mut other = create_test_config();
        other.secret_key = Some("a-completely-different-secret-key".to_string());
        assert!(matches!(
            verify_state(&issued.token, &other),
            Err(Error::MissingOAuthState)
        ));
    }

    #[test]
    fn pkce_challenge_matches_rfc_7636_example() {
        // Appendix B of RFC 7636.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn consume_is_single_use() {
        let states = ConsumedStates::new();
        let exp = Utc::now().timestamp() + 600;
        assert!(states.consume("abc", exp));
        assert!(!states.consume("abc", exp));
        assert!(states.consume("def", exp));
    }

    #[test]
    fn expired_entries_are_swept() {
        let states = ConsumedStates::new();
        let past = Utc::now().timestamp() - 10;
        assert!(states.consume("old", past));
        // The next insert sweeps the expired entry first.
        assert!(states.consume("new", Utc::now().timestamp() + 600));
        assert!(!states.inner.contains_key("old"));
    }

    #[test]
    fn state_cookie_attributes() {
        let mut config = create_test_config();
        config.auth.session.cookie_secure = true;
        let cookie = state_cookie("tok", &config);
        assert!(cookie.starts_with(&format!("{}=tok", config.auth.state.cookie_name)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(clear_state_cookie(&config).contains("Max-Age=0"));
    }
}
