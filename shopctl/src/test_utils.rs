//! Shared helpers for unit and end-to-end tests.

use chrono::{Duration, Utc};

use crate::Application;
use crate::auth::session::{Session, SessionTokens, create_session_token, session_cookie};
use crate::config::Config;
use crate::types::Role;

/// Email of the protected super admin every test config seeds.
pub const TEST_ROOT_EMAIL: &str = "root@example.com";

/// A config suitable for unit tests: memory-backed registry, one seeded
/// super admin, insecure cookies, and provider URLs that nothing should
/// actually reach.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.secret_key = Some("test-secret-key-for-signing-cookies".to_string());
    config.auth.oauth.client_id = "test-client".to_string();
    config.auth.oauth.client_secret = "test-client-secret".to_string();
    config.auth.session.cookie_secure = false;
    config.registry.super_admins = vec![TEST_ROOT_EMAIL.to_string()];
    config
}

/// Like [`create_test_config`], with the provider endpoints pointed at a
/// wiremock server.
pub fn create_test_config_with_idp(idp_base: &str) -> Config {
    let mut config = create_test_config();
    let base = url::Url::parse(idp_base).expect("valid mock IdP base URL");
    config.auth.oauth.authorize_url = base.join("/oauth/authorize").unwrap();
    config.auth.oauth.token_url = base.join("/oauth/token").unwrap();
    config.auth.oauth.identity_url = base.join("/oauth/me").unwrap();
    config
}

/// Fresh, unexpired token pair for session fixtures.
pub fn test_session_tokens() -> SessionTokens {
    SessionTokens {
        access_token: "test-access-token".to_string(),
        access_token_expires_at: Utc::now() + Duration::hours(1),
        refresh_token: "test-refresh-token".to_string(),
        refresh_token_expires_at: Utc::now() + Duration::days(30),
    }
}

/// Install the process-wide TLS crypto provider. `main` does this at
/// startup; tests building an HTTP client need it too.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Spin up the full application as an in-process test server.
pub async fn create_test_app(config: Config) -> axum_test::TestServer {
    crate::telemetry::init_telemetry();
    install_crypto_provider();
    let app = Application::new(config).await.expect("test app should build");
    app.into_test_server()
}

/// `("cookie", "<name>=<jwt>")` header establishing a logged-in session,
/// bypassing the OAuth flow.
pub fn session_cookie_header(email: &str, role: Role, config: &Config) -> (String, String) {
    let session = Session {
        email: email.to_string(),
        role,
        tokens: test_session_tokens(),
    };
    let token = create_session_token(&session, config).expect("session token should sign");
    let cookie = session_cookie(&token, config);
    let pair = cookie
        .split(';')
        .next()
        .expect("cookie has a name=value part")
        .to_string();
    ("cookie".to_string(), pair)
}

/// Same as [`session_cookie_header`] but with an access token already past
/// expiry, for exercising the refresh path.
pub fn expired_session_cookie_header(email: &str, role: Role, config: &Config) -> (String, String) {
    let session = Session {
        email: email.to_string(),
        role,
        tokens: SessionTokens {
            access_token: "stale-access-token".to_string(),
            access_token_expires_at: Utc::now() - Duration::minutes(1),
            refresh_token: "test-refresh-token".to_string(),
            refresh_token_expires_at: Utc::now() + Duration::days(30),
        },
    };
    let token = create_session_token(&session, config).expect("session token should sign");
    let cookie = session_cookie(&token, config);
    let pair = cookie.split(';').next().expect("cookie has a name=value part").to_string();
    ("cookie".to_string(), pair)
}
