//! Session cookie management.
//!
//! A session is a signed token in an HttpOnly cookie. The claims carry the
//! authenticated email, the role resolved at login time, and the upstream
//! access/refresh token pair with their expiries, so no server-side session
//! table is needed. The refresh middleware re-mints the cookie when the
//! access token nears expiry.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::types::Role;

/// The upstream token pair held inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl SessionTokens {
    /// Whether the access token expires within `window` from now.
    pub fn access_expires_within(&self, window: std::time::Duration) -> bool {
        let window = Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(0));
        self.access_token_expires_at <= Utc::now() + window
    }

    pub fn refresh_token_expired(&self) -> bool {
        self.refresh_token_expires_at <= Utc::now()
    }
}

/// An authenticated session, as carried in the cookie.
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
    pub role: Role,
    pub tokens: SessionTokens,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Authenticated email, lowercased.
    sub: String,
    role: Role,
    tokens: SessionTokens,
    iat: i64,
    exp: i64,
}

/// Sign a session into a cookie-ready token.
pub fn create_session_token(session: &Session, config: &Config) -> Result<String> {
    let now = Utc::now();
    let timeout = Duration::from_std(config.auth.session.timeout)
        .map_err(|_| Error::Internal { operation: "session timeout out of range".to_string() })?;
    let claims = SessionClaims {
        sub: session.email.clone(),
        role: session.role,
        tokens: session.tokens.clone(),
        iat: now.timestamp(),
        exp: (now + timeout).timestamp(),
    };
    let secret = config.secret_key.as_deref().unwrap_or_default();
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal { operation: format!("failed to sign session token: {e}") })
}

/// Verify a session token and recover the [`Session`].
pub fn verify_session_token(token: &str, config: &Config) -> Result<Session> {
    let secret = config.secret_key.as_deref().unwrap_or_default();
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => Error::Unauthorized {
                message: Some("Session expired. Please log in again.".to_string()),
            },
            ErrorKind::InvalidSignature | ErrorKind::InvalidToken => Error::Unauthorized {
                message: Some("Invalid session. Please log in again.".to_string()),
            },
            _ => {
                tracing::debug!("session token rejected: {e}");
                Error::Unauthorized { message: None }
            }
        }
    })?;
    Ok(Session {
        email: data.claims.sub,
        role: data.claims.role,
        tokens: data.claims.tokens,
    })
}

/// Pull a named cookie's value out of a `Cookie` request header.
pub fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Load a session from a request's `Cookie` header, if one is present and
/// valid. Malformed or expired cookies are treated as an anonymous request.
pub fn load(cookie_header: Option<&str>, config: &Config) -> Option<Session> {
    let header = cookie_header?;
    let token = cookie_value(header, &config.auth.session.cookie_name)?;
    verify_session_token(token, config).ok()
}

/// `Set-Cookie` value establishing or replacing the session cookie.
pub fn session_cookie(token: &str, config: &Config) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        config.auth.session.cookie_name,
        token,
        same_site_attribute(&config.auth.session.cookie_same_site),
        config.auth.session.timeout.as_secs(),
    );
    if config.auth.session.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that logs the browser out.
pub fn clear_session_cookie(config: &Config) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0",
        config.auth.session.cookie_name,
        same_site_attribute(&config.auth.session.cookie_same_site),
    )
}

fn same_site_attribute(value: &str) -> &'static str {
    match value {
        "strict" => "Strict",
        "none" => "None",
        _ => "Lax",
    }
}
