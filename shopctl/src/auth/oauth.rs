//! Client for the commerce platform's OAuth identity provider.

use chrono::{Duration, Utc};
use serde::Deserialize;
use url::Url;

use crate::auth::session::SessionTokens;
use crate::config::Config;
use crate::errors::{Error, Result};

/// Fallback refresh-token lifetime for providers that do not report one.
const DEFAULT_REFRESH_TOKEN_LIFETIME_SECS: i64 = 30 * 24 * 60 * 60;

/// Token endpoint success body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Access token lifetime in seconds.
    expires_in: i64,
    refresh_token: String,
    /// Refresh token lifetime in seconds, when the provider reports it.
    refresh_expires_in: Option<i64>,
}

/// Token endpoint error body (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    email: String,
}

/// HTTP client for the provider's authorize, token, and identity endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    authorize_url: Url,
    token_url: Url,
    identity_url: Url,
    logout_url: Option<Url>,
    callback_url: Url,
    scopes: Vec<String>,
}

impl OAuthClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.auth.oauth.request_timeout)
            .build()?;
        Ok(Self {
            http,
            client_id: config.auth.oauth.client_id.clone(),
            client_secret: config.auth.oauth.client_secret.clone(),
            authorize_url: config.auth.oauth.authorize_url.clone(),
            token_url: config.auth.oauth.token_url.clone(),
            identity_url: config.auth.oauth.identity_url.clone(),
            logout_url: config.auth.oauth.logout_url.clone(),
            callback_url: config.callback_url(),
            scopes: config.auth.oauth.scopes.clone(),
        })
    }

    /// Build the provider authorization URL for one login attempt.
    ///
    /// `provider_hint` is passed through opaquely so the upstream can
    /// preselect a social login button.
    pub fn authorization_url(
        &self,
        state: &str,
        code_challenge: &str,
        provider_hint: Option<&str>,
    ) -> Url {
        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", self.callback_url.as_str())
                .append_pair("response_type", "code")
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("state", state)
                .append_pair("code_challenge", code_challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(hint) = provider_hint {
                query.append_pair("provider", hint);
            }
        }
        url
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<SessionTokens> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.callback_url.as_str()),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("code_verifier", verifier),
        ];
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::UpstreamTimeout
                } else {
                    Error::TokenExchangeError { reason: format!("token endpoint unreachable: {e}") }
                }
            })?;
        self.read_token_response(response, "code exchange").await
    }

    /// Trade a refresh token for a fresh token pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::UpstreamTimeout
                } else {
                    Error::TokenExchangeError { reason: format!("token endpoint unreachable: {e}") }
                }
            })?;
        self.read_token_response(response, "token refresh").await
    }

    async fn read_token_response(
        &self,
        response: reqwest::Response,
        operation: &str,
    ) -> Result<SessionTokens> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => err.error_description.unwrap_or(err.error),
                Err(_) => format!("{operation} failed with status {status}"),
            };
            return Err(Error::TokenExchangeError { reason });
        }
        let tokens: TokenResponse = response.json().await.map_err(|e| {
            Error::TokenExchangeError { reason: format!("unparseable token response: {e}") }
        })?;
        let now = Utc::now();
        Ok(SessionTokens {
            access_token: tokens.access_token,
            access_token_expires_at: now + Duration::seconds(tokens.expires_in),
            refresh_token: tokens.refresh_token,
            refresh_token_expires_at: now
                + Duration::seconds(
                    tokens
                        .refresh_expires_in
                        .unwrap_or(DEFAULT_REFRESH_TOKEN_LIFETIME_SECS),
                ),
        })
    }

    /// Look up the authenticated email behind an access token.
    pub async fn fetch_identity(&self, access_token: &str) -> Result<String> {
        let response = self
            .http
            .get(self.identity_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::UpstreamTimeout
                } else {
                    Error::UpstreamAuthError {
                        description: format!("identity endpoint unreachable: {e}"),
                    }
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamAuthError {
                description: format!("identity endpoint returned {status}"),
            });
        }
        let identity: IdentityResponse = response.json().await.map_err(|e| {
            Error::UpstreamAuthError { description: format!("unparseable identity response: {e}") }
        })?;
        Ok(identity.email)
    }

    /// Provider-side logout URL, when the provider has one.
    pub fn logout_url(&self) -> Option<&Url> {
        self.logout_url.as_ref()
    }
}
