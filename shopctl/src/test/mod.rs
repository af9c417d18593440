//! End-to-end tests driving the full router through an in-process server,
//! with the identity provider mocked by wiremock.

pub mod oauth_flow;

use axum::http::header::SET_COOKIE;
use axum_test::TestResponse;

/// Pull a named cookie's `name=value` pair out of a response's Set-Cookie
/// headers.
pub fn extract_cookie(response: &TestResponse, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
        .find(|pair| pair.starts_with(&format!("{name}=")))
}

/// The value half of [`extract_cookie`].
pub fn extract_cookie_value(response: &TestResponse, name: &str) -> Option<String> {
    extract_cookie(response, name).and_then(|pair| pair.split_once('=').map(|(_, v)| v.to_string()))
}

/// Mount token and identity endpoints on a mock provider.
pub async fn mount_idp(server: &wiremock::MockServer, email: &str) {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "mock-access-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "mock-refresh-token",
            "refresh_expires_in": 86400
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth/me"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "email": email })),
        )
        .mount(server)
        .await;
}
