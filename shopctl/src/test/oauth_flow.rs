//! The login flow end to end: trampoline, callback, session, refresh, logout.

use axum::http::StatusCode;
use axum::http::header::LOCATION;

use crate::api::models::auth::MeResponse;
use crate::auth::state::verify_state;
use crate::test_utils::{
    TEST_ROOT_EMAIL, create_test_app, create_test_config, create_test_config_with_idp,
    expired_session_cookie_header, session_cookie_header,
};
use crate::types::Role;

use super::{extract_cookie, extract_cookie_value, mount_idp};

/// Drive `GET /auth/login` and return the state cookie pair plus the CSRF
/// state embedded in it.
async fn start_login(
    server: &axum_test::TestServer,
    config: &crate::Config,
    path: Option<&str>,
) -> (String, String) {
    let mut request = server.get("/auth/login");
    if let Some(path) = path {
        request = request.add_query_param("path", path);
    }
    let response = request.await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let cookie_name = &config.auth.state.cookie_name;
    let pair = extract_cookie(&response, cookie_name).expect("login sets the state cookie");
    let token = pair.split_once('=').unwrap().1.to_string();
    let claims = verify_state(&token, config).expect("state cookie holds a valid token");
    (pair, claims.state)
}

#[tokio::test]
async fn full_login_flow_establishes_session() {
    let idp = wiremock::MockServer::start().await;
    mount_idp(&idp, "shopper@example.com").await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    let (state_cookie, csrf_state) = start_login(&server, &config, Some("/cart")).await;

    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", &csrf_state)
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/cart");

    let session_pair = extract_cookie(&response, &config.auth.session.cookie_name)
        .expect("callback sets the session cookie");
    // The state cookie is cleared in the same response
    let state_value = extract_cookie_value(&response, &config.auth.state.cookie_name);
    assert_eq!(state_value.as_deref(), Some(""));

    let me = server.get("/auth/me").add_header("cookie", &session_pair).await;
    assert_eq!(me.status_code(), StatusCode::OK);
    let me: MeResponse = me.json();
    assert_eq!(me.email, "shopper@example.com");
    assert_eq!(me.role, Role::Customer);
    assert!(!me.is_admin);
}

#[tokio::test]
async fn admin_landing_on_default_path_goes_to_dashboard() {
    let idp = wiremock::MockServer::start().await;
    mount_idp(&idp, TEST_ROOT_EMAIL).await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    // No explicit path: the origin is the default post-login path
    let (state_cookie, csrf_state) = start_login(&server, &config, None).await;
    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", &csrf_state)
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(LOCATION).unwrap(),
        config.auth.admin_dashboard_path.0.as_str()
    );
}

#[tokio::test]
async fn admin_with_explicit_destination_keeps_it() {
    let idp = wiremock::MockServer::start().await;
    mount_idp(&idp, TEST_ROOT_EMAIL).await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    let (state_cookie, csrf_state) = start_login(&server, &config, Some("/orders/42")).await;
    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", &csrf_state)
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/orders/42");
}

#[tokio::test]
async fn mismatched_state_is_rejected() {
    let idp = wiremock::MockServer::start().await;
    mount_idp(&idp, "shopper@example.com").await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    let (state_cookie, _) = start_login(&server, &config, None).await;
    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", "attacker-supplied-state")
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(response.text().contains("could not be verified"));
}

#[tokio::test]
async fn replayed_callback_is_rejected() {
    let idp = wiremock::MockServer::start().await;
    mount_idp(&idp, "shopper@example.com").await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    let (state_cookie, csrf_state) = start_login(&server, &config, None).await;
    let first = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", &csrf_state)
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(first.status_code(), StatusCode::FOUND);

    // Identical request again: the state id is already consumed
    let replay = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", &csrf_state)
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(replay.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn provider_denial_shows_diagnostic_page() {
    let config = create_test_config();
    let server = create_test_app(config).await;

    let response = server
        .get("/auth/callback")
        .add_query_param("error", "access_denied")
        .add_query_param("error_description", "The user denied the request")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body = response.text();
    assert!(body.contains("The user denied the request"));
    assert!(body.contains("/auth/login"));
}

#[tokio::test]
async fn diagnostic_page_escapes_provider_error_text() {
    let config = create_test_config();
    let server = create_test_app(config).await;

    // error_description is attacker-controllable: anyone can hit the
    // callback with a crafted query string, no provider involved.
    let response = server
        .get("/auth/callback")
        .add_query_param("error", "access_denied")
        .add_query_param("error_description", "<script>alert(1)</script>")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body = response.text();
    assert!(!body.contains("<script>alert(1)</script>"));
    assert!(body.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
}

#[tokio::test]
async fn slow_token_endpoint_is_gateway_timeout() {
    let idp = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/oauth/token"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(2))
                .set_body_json(serde_json::json!({
                    "access_token": "late-token",
                    "expires_in": 3600,
                    "refresh_token": "late-refresh",
                })),
        )
        .mount(&idp)
        .await;
    let mut config = create_test_config_with_idp(&idp.uri());
    config.auth.oauth.request_timeout = std::time::Duration::from_millis(200);
    let server = create_test_app(config.clone()).await;

    let (state_cookie, csrf_state) = start_login(&server, &config, None).await;
    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", &csrf_state)
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(response.status_code(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn callback_without_code_is_bad_request() {
    let config = create_test_config();
    let server = create_test_app(config).await;

    let response = server
        .get("/auth/callback")
        .add_query_param("state", "whatever")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_state_cookie_serves_recovery_page_once() {
    let config = create_test_config();
    let server = create_test_app(config.clone()).await;

    // First pass without the cookie: a recovery page, not a failure
    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", "some-state")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.text();
    assert!(body.contains("recovered_state"));
    assert!(body.contains("retried=1"));
    // The replay URL is well-formed even when the callback query is empty
    assert!(body.contains(r#"search ? search + "&" : "?""#));

    // Second pass, still no state anywhere: terminal
    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", "some-state")
        .add_query_param("retried", "1")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn recovered_state_completes_login() {
    let idp = wiremock::MockServer::start().await;
    mount_idp(&idp, "shopper@example.com").await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    let (state_cookie, csrf_state) = start_login(&server, &config, Some("/checkout")).await;
    let token = state_cookie.split_once('=').unwrap().1.to_string();

    // The browser dropped the cookie; the recovery page replays the token
    // from sessionStorage instead.
    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", &csrf_state)
        .add_query_param("recovered_state", &token)
        .add_query_param("retried", "1")
        .await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/checkout");
}

#[tokio::test]
async fn state_signed_with_another_key_is_rejected() {
    let idp = wiremock::MockServer::start().await;
    mount_idp(&idp, "shopper@example.com").await;
    let mut config = create_test_config_with_idp(&idp.uri());
    // Sign states with one key, verify with another
    let server = create_test_app(config.clone()).await;
    let (state_cookie, csrf_state) = {
        config.secret_key = Some("a-different-signing-key-entirely".to_string());
        let other = create_test_app(config.clone()).await;
        let response = other.get("/auth/login").await;
        let pair = extract_cookie(&response, &config.auth.state.cookie_name).unwrap();
        let token = pair.split_once('=').unwrap().1.to_string();
        let claims = verify_state(&token, &config).unwrap();
        (pair, claims.state)
    };

    let response = server
        .get("/auth/callback")
        .add_query_param("code", "mock-code")
        .add_query_param("state", &csrf_state)
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upstream_exchange_failure_is_bad_gateway() {
    let idp = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/oauth/token"))
        .respond_with(wiremock::ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Code expired"
        })))
        .mount(&idp)
        .await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    let (state_cookie, csrf_state) = start_login(&server, &config, None).await;
    let response = server
        .get("/auth/callback")
        .add_query_param("code", "expired-code")
        .add_query_param("state", &csrf_state)
        .add_header("cookie", &state_cookie)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn login_rejects_offsite_redirects() {
    let config = create_test_config();
    let server = create_test_app(config).await;

    for path in ["https://evil.example/phish", "//evil.example", "relative"] {
        let response = server.get("/auth/login").add_query_param("path", path).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "path: {path}");
    }
}

#[tokio::test]
async fn me_requires_a_session() {
    let config = create_test_config();
    let server = create_test_app(config).await;
    let response = server.get("/auth/me").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let config = create_test_config();
    let server = create_test_app(config.clone()).await;
    let (name, value) = session_cookie_header("shopper@example.com", Role::Customer, &config);

    let response = server.get("/auth/logout").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
    let cleared = extract_cookie_value(&response, &config.auth.session.cookie_name);
    assert_eq!(cleared.as_deref(), Some(""));
}

#[tokio::test]
async fn logout_prefers_provider_logout_url() {
    let mut config = create_test_config();
    config.auth.oauth.logout_url = Some(url::Url::parse("https://auth.example.com/logout").unwrap());
    let server = create_test_app(config).await;

    let response = server.get("/auth/logout").await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(LOCATION).unwrap(),
        "https://auth.example.com/logout"
    );
}

#[tokio::test]
async fn expiring_access_token_is_refreshed_transparently() {
    let idp = wiremock::MockServer::start().await;
    mount_idp(&idp, "shopper@example.com").await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    let (name, value) = expired_session_cookie_header("shopper@example.com", Role::Customer, &config);
    let response = server.get("/auth/me").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let me: MeResponse = response.json();
    assert_eq!(me.email, "shopper@example.com");
    // The refreshed session is re-minted onto the response
    assert!(extract_cookie(&response, &config.auth.session.cookie_name).is_some());
}

#[tokio::test]
async fn failed_refresh_with_expired_token_logs_out() {
    let idp = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/oauth/token"))
        .respond_with(wiremock::ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&idp)
        .await;
    let config = create_test_config_with_idp(&idp.uri());
    let server = create_test_app(config.clone()).await;

    let (name, value) = expired_session_cookie_header("shopper@example.com", Role::Customer, &config);
    let response = server.get("/auth/me").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let cleared = extract_cookie_value(&response, &config.auth.session.cookie_name);
    assert_eq!(cleared.as_deref(), Some(""));
}

#[tokio::test]
async fn healthz_is_public() {
    let config = create_test_config();
    let server = create_test_app(config).await;
    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "OK");
}
