//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `SHOPCTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `SHOPCTL_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `SHOPCTL_AUTH__SESSION__COOKIE_NAME=sid` sets the `auth.session.cookie_name` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding
//! - **Canonical origin**: `public_base_url` - the single base URL login redirects are anchored
//!   to. The OAuth callback is always `public_base_url` + `auth.oauth.callback_path`; it is
//!   never derived from the incoming request's Host header.
//! - **Authentication**: `auth.oauth` (provider endpoints and the one canonical client id),
//!   `auth.session` and `auth.state` (cookie lifecycle)
//! - **Role registry**: `registry.store` (memory or file backing), `registry.super_admins`
//!   (protected seed emails), `registry.cache_ttl`
//! - **Security**: `secret_key` (cookie signing), `cors`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! SHOPCTL_PORT=8080
//!
//! # Cookie signing key (required)
//! SHOPCTL_SECRET_KEY="..."
//!
//! # Override nested values
//! SHOPCTL_AUTH__OAUTH__CLIENT_ID=storefront-prod
//! SHOPCTL_REGISTRY__STORE__TYPE=file
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SHOPCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Canonical base URL of the deployment (e.g., "https://shop.example.com").
    /// All login/logout redirects and the OAuth callback are anchored here.
    pub public_base_url: Url,
    /// Secret key for signing session and OAuth-state cookies (required)
    pub secret_key: Option<String>,
    /// Authentication configuration (OAuth provider, session and state cookies)
    pub auth: AuthConfig,
    /// Role registry configuration (backing store, protected super admins, cache)
    pub registry: RegistryConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Include error details on the callback diagnostic page.
    /// Must stay false in production; user-facing messages never include internals.
    pub debug_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_base_url: Url::parse("http://localhost:3000").expect("valid default URL"),
            secret_key: None,
            auth: AuthConfig::default(),
            registry: RegistryConfig::default(),
            cors: CorsConfig::default(),
            debug_errors: false,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// OAuth identity provider endpoints and client credentials
    pub oauth: OAuthConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Transient OAuth-state cookie configuration
    pub state: StateConfig,
    /// Where users land after login when no explicit destination was requested
    pub default_post_login_path: DefaultPostLoginPath,
    /// Where admin and super-admin users are redirected instead of the default path
    pub admin_dashboard_path: AdminDashboardPath,
}

/// Newtype wrappers keep the serde defaults next to the fields they apply to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DefaultPostLoginPath(pub String);

impl Default for DefaultPostLoginPath {
    fn default() -> Self {
        Self("/profile".to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AdminDashboardPath(pub String);

impl Default for AdminDashboardPath {
    fn default() -> Self {
        Self("/admin".to_string())
    }
}

/// OAuth identity provider configuration.
///
/// There is exactly one client identifier per deployment. Multiple client ids
/// across flows cause cookie/token mismatches and are deliberately impossible
/// to express here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OAuthConfig {
    /// The canonical OAuth client id for this deployment
    pub client_id: String,
    /// The OAuth client secret
    pub client_secret: String,
    /// Authorization endpoint users are redirected to
    pub authorize_url: Url,
    /// Token endpoint for code exchange and refresh
    pub token_url: Url,
    /// Endpoint returning the authenticated identity (email)
    pub identity_url: Url,
    /// Upstream logout URL. When absent, logout falls back to a local redirect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout_url: Option<Url>,
    /// Path under `public_base_url` the provider redirects back to
    pub callback_path: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
    /// Timeout applied to every identity provider call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorize_url: Url::parse("https://auth.example.com/oauth/authorize").expect("valid default URL"),
            token_url: Url::parse("https://auth.example.com/oauth/token").expect("valid default URL"),
            identity_url: Url::parse("https://auth.example.com/oauth/me").expect("valid default URL"),
            logout_url: None,
            callback_path: "/auth/callback".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string(), "offline_access".to_string()],
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session timeout duration (upper bound on the session cookie lifetime)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name for the session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
    /// Refresh the access token when it expires within this window
    #[serde(with = "humantime_serde")]
    pub refresh_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(24 * 60 * 60),
            cookie_name: "shopctl_session".to_string(),
            cookie_secure: true,
            cookie_same_site: "lax".to_string(),
            refresh_window: Duration::from_secs(5 * 60),
        }
    }
}

/// Transient OAuth-state cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Cookie name for the OAuth request state
    pub cookie_name: String,
    /// How long an issued state is valid. Kept short: the state is single-use
    /// and only has to survive the round trip to the identity provider.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            cookie_name: "shopctl_oauth_state".to_string(),
            ttl: Duration::from_secs(10 * 60),
        }
    }
}

/// Role registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Backing store for admin role records
    pub store: RegistryStoreConfig,
    /// Protected super-admin emails. Seeded into the store at startup and
    /// never demotable or removable through the API.
    pub super_admins: Vec<String>,
    /// Upper bound on role-resolution cache staleness
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            store: RegistryStoreConfig::default(),
            super_admins: Vec::new(),
            cache_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Backing store selection for the role registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryStoreConfig {
    /// In-process store; records do not survive a restart beyond the seeded
    /// super admins. Suitable for development and tests.
    Memory,
    /// JSON file-backed store with atomic rewrites.
    File {
        /// Path of the JSON file holding admin records
        path: PathBuf,
    },
}

impl Default for RegistryStoreConfig {
    fn default() -> Self {
        RegistryStoreConfig::Memory
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<String>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("SHOPCTL_").split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.is_none() {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                 Please set the SHOPCTL_SECRET_KEY environment variable or add secret_key to the config file."
                    .to_string(),
            });
        }

        if self.auth.oauth.client_id.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: auth.oauth.client_id must be set".to_string(),
            });
        }
        if self.auth.oauth.client_secret.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: auth.oauth.client_secret must be set".to_string(),
            });
        }
        if !self.auth.oauth.callback_path.starts_with('/') {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: auth.oauth.callback_path must be an absolute path, got '{}'",
                    self.auth.oauth.callback_path
                ),
            });
        }
        for path in [&self.auth.default_post_login_path.0, &self.auth.admin_dashboard_path.0] {
            if !path.starts_with('/') {
                return Err(Error::Internal {
                    operation: format!("Config validation: redirect paths must start with '/', got '{path}'"),
                });
            }
        }

        match self.auth.session.cookie_same_site.to_ascii_lowercase().as_str() {
            "strict" | "lax" | "none" => {}
            other => {
                return Err(Error::Internal {
                    operation: format!("Config validation: cookie_same_site must be strict, lax or none, got '{other}'"),
                });
            }
        }

        for email in &self.registry.super_admins {
            if crate::registry::validate_email(email).is_err() {
                return Err(Error::Internal {
                    operation: format!("Config validation: registry.super_admins contains a malformed address: '{email}'"),
                });
            }
        }

        Ok(())
    }

    /// The fixed, pre-registered OAuth callback URL.
    ///
    /// Anchored to `public_base_url`, never to the incoming request's Host header.
    pub fn callback_url(&self) -> Url {
        let mut url = self.public_base_url.clone();
        url.set_path(&self.auth.oauth.callback_path);
        url.set_query(None);
        url
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
