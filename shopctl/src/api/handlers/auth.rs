//! OAuth login, callback, logout, and identity endpoints.

use axum::extract::{Query, State};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};

use crate::AppState;
use crate::api::models::auth::{CallbackQuery, LoginQuery, MeResponse};
use crate::auth::current_user::CurrentUser;
use crate::auth::session::{self, Session};
use crate::auth::state::{self, StateClaims};
use crate::errors::{Error, Result};

const OAUTH_STATE_STORAGE_KEY: &str = "shopctl.oauth_state";

/// Reject redirect targets that would leave the site.
///
/// Only same-origin relative paths are accepted: anything absolute,
/// protocol-relative, or backslash-flavoured is refused outright rather
/// than sanitized.
fn validate_origin_path(path: &str) -> Result<()> {
    let ok = path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains("://")
        && !path.contains('\\');
    if ok {
        Ok(())
    } else {
        Err(Error::BadRequest {
            message: format!("redirect path must be a same-origin relative path, got '{path}'"),
        })
    }
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn append_cookie(response: &mut Response, cookie: &str) {
    if let Ok(value) = cookie.parse() {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

/// Start the OAuth flow.
///
/// Responds with a small HTML trampoline rather than a redirect: the page
/// sets nothing itself, but the response carries the state cookie, and the
/// inline script mirrors the state token into `sessionStorage` before
/// navigating to the provider. The mirror is what makes the callback
/// recoverable when the browser refuses the cookie on the cross-site
/// redirect back.
#[utoipa::path(
    get,
    path = "/auth/login",
    params(LoginQuery),
    responses(
        (status = 200, description = "Trampoline page that forwards to the identity provider"),
        (status = 400, description = "Redirect path is not same-origin"),
    ),
    tag = "auth"
)]
pub async fn login(
    State(app): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    let origin = query
        .path
        .as_deref()
        .unwrap_or(&app.config.auth.default_post_login_path.0);
    validate_origin_path(origin)?;

    let issued = state::issue_state(origin, &app.config)?;
    let authorize = app
        .oauth
        .authorization_url(&issued.state, &issued.challenge, query.provider.as_deref());

    tracing::info!(origin = %origin, "starting oauth login flow");

    let page = trampoline_page(&issued.token, authorize.as_str());
    let mut response = Html(page).into_response();
    append_cookie(&mut response, &state::state_cookie(&issued.token, &app.config));
    Ok(response)
}

fn trampoline_page(state_token: &str, authorize_url: &str) -> String {
    // serde_json string encoding doubles as JS string escaping here.
    let token_js = serde_json::to_string(state_token).unwrap_or_else(|_| "\"\"".to_string());
    let url_js = serde_json::to_string(authorize_url).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Signing in…</title></head>
<body>
<p>Redirecting to sign-in…</p>
<script>
  try {{ sessionStorage.setItem("{OAUTH_STATE_STORAGE_KEY}", {token_js}); }} catch (e) {{}}
  window.location.replace({url_js});
</script>
<noscript><a href={url_js}>Continue to sign-in</a></noscript>
</body>
</html>
"#
    )
}

/// Handle the provider's redirect back.
///
/// Errors never bubble to the global error handler here: a user arriving
/// mid-flow with a broken state deserves a page with a retry link, not a
/// JSON body.
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackQuery),
    responses(
        (status = 302, description = "Login complete, redirecting into the site"),
        (status = 200, description = "State recovery page (blocked cookie)"),
        (status = 401, description = "State missing, expired, or mismatched"),
        (status = 502, description = "Provider rejected the exchange"),
    ),
    tag = "auth"
)]
pub async fn callback(
    State(app): State<AppState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    match run_callback(&app, &query, &headers).await {
        Ok(response) => response,
        Err(err) => diagnostic_page(&app, err),
    }
}

async fn run_callback(
    app: &AppState,
    query: &CallbackQuery,
    headers: &HeaderMap,
) -> Result<Response> {
    if let Some(error) = &query.error {
        let description = query.error_description.clone().unwrap_or_else(|| error.clone());
        return Err(Error::UpstreamAuthError { description });
    }

    let code = query
        .code
        .as_deref()
        .ok_or_else(|| Error::MissingParameter { name: "code".to_string() })?;
    let state_param = query
        .state
        .as_deref()
        .ok_or_else(|| Error::MissingParameter { name: "state".to_string() })?;

    let claims = match load_state(app, query, headers)? {
        StateLookup::Found(claims) => claims,
        StateLookup::Recover => return Ok(Html(recovery_page()).into_response()),
    };

    if claims.state != state_param {
        return Err(Error::StateMismatch);
    }
    // Mark consumed before the exchange so a concurrent replay of the same
    // callback cannot race past the check.
    if !app.consumed_states.consume(&claims.jti, claims.exp) {
        return Err(Error::StateMismatch);
    }

    let tokens = app.oauth.exchange_code(code, &claims.verifier).await?;
    let email = crate::registry::normalize_email(&app.oauth.fetch_identity(&tokens.access_token).await?);
    let role = app.registry.resolve_role(&email).await;
    if role.is_admin() {
        app.registry.record_login(&email).await;
    }

    let session = Session { email: email.clone(), role, tokens };
    let token = session::create_session_token(&session, &app.config)?;

    let destination = post_login_destination(app, role, &claims.origin);
    tracing::info!(email = %email, role = %role, destination = %destination, "oauth login complete");

    let mut response = found(&destination);
    append_cookie(&mut response, &session::session_cookie(&token, &app.config));
    append_cookie(&mut response, &state::clear_state_cookie(&app.config));
    Ok(response)
}

enum StateLookup {
    Found(StateClaims),
    Recover,
}

/// Locate the state token: cookie first, then the recovered copy from
/// `sessionStorage`. A first miss gets one recovery round trip; a second
/// miss is terminal.
fn load_state(app: &AppState, query: &CallbackQuery, headers: &HeaderMap) -> Result<StateLookup> {
    let from_cookie = headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| session::cookie_value(h, &app.config.auth.state.cookie_name))
        .map(str::to_owned);
    let token = from_cookie.or_else(|| query.recovered_state.clone());

    match token {
        Some(token) => Ok(StateLookup::Found(state::verify_state(&token, &app.config)?)),
        None if !query.is_retry() => {
            tracing::info!("oauth state cookie missing, serving recovery page");
            Ok(StateLookup::Recover)
        }
        None => Err(Error::MissingOAuthState),
    }
}

fn recovery_page() -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Completing sign-in…</title></head>
<body>
<p>Completing sign-in…</p>
<script>
  var saved = null;
  try {{ saved = sessionStorage.getItem("{OAUTH_STATE_STORAGE_KEY}"); }} catch (e) {{}}
  if (saved) {{
    var search = window.location.search;
    window.location.replace(
      "/auth/callback" + (search ? search + "&" : "?") +
      "retried=1&recovered_state=" + encodeURIComponent(saved)
    );
  }} else {{
    document.body.innerHTML =
      '<p>Your sign-in attempt expired.</p><p><a href="/auth/login">Try again</a></p>';
  }}
</script>
<noscript><p>Your sign-in attempt expired. <a href="/auth/login">Try again</a></p></noscript>
</body>
</html>
"#
    )
}

fn post_login_destination(app: &AppState, role: crate::types::Role, origin: &str) -> String {
    let default = &app.config.auth.default_post_login_path.0;
    if role.is_admin() && origin == default {
        app.config.auth.admin_dashboard_path.0.clone()
    } else {
        origin.to_string()
    }
}

/// Minimal HTML escaping for text interpolated into error pages. Error
/// messages can echo provider-supplied query parameters, so they must
/// never reach the page as markup.
fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Render a login failure as an HTML page with the error's status code.
fn diagnostic_page(app: &AppState, err: Error) -> Response {
    if matches!(err, Error::StateMismatch) {
        tracing::warn!(security = true, "oauth state mismatch at callback");
    } else {
        tracing::warn!("oauth callback failed: {err}");
    }
    let status = err.status_code();
    let message = escape_html(&err.user_message());
    let detail = if app.config.debug_errors {
        format!("<p><code>{}</code></p>", escape_html(&err.to_string()))
    } else {
        String::new()
    };
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Sign-in failed</title></head>
<body>
<h1>Sign-in failed</h1>
<p>{message}</p>
{detail}<p><a href="/auth/login">Try again</a></p>
</body>
</html>
"#
    );
    let mut response = (status, Html(body)).into_response();
    append_cookie(&mut response, &state::clear_state_cookie(&app.config));
    response
}

/// End the session.
///
/// Always clears the cookie and redirects, even for anonymous callers:
/// logout is idempotent and never errors.
#[utoipa::path(
    get,
    path = "/auth/logout",
    responses((status = 302, description = "Session cleared")),
    tag = "auth"
)]
pub async fn logout(State(app): State<AppState>) -> Response {
    let destination = app
        .oauth
        .logout_url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "/".to_string());
    let mut response = found(&destination);
    append_cookie(&mut response, &session::clear_session_cookie(&app.config));
    response
}

/// Who the current session belongs to.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, body = MeResponse),
        (status = 401, description = "Not logged in"),
    ),
    tag = "auth"
)]
pub async fn me(user: CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        is_admin: user.role.is_admin(),
        is_super_admin: user.role.is_super_admin(),
        email: user.email,
        role: user.role,
    })
}
