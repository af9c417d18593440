//! Session refresh middleware and role guards.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::auth::session::{self, Session};
use crate::errors::{Error, Result};
use crate::types::Role;

/// Reject the request unless the user holds at least `required`.
pub fn require_role(user: &super::current_user::CurrentUser, required: Role, resource: &str) -> Result<()> {
    if user.role >= required {
        Ok(())
    } else {
        Err(Error::Forbidden { required, resource: resource.to_string() })
    }
}

/// Transparent access-token refresh.
///
/// Runs on every request. When the session's access token is inside the
/// refresh window, the upstream refresh grant is attempted and, on success,
/// a re-minted session cookie is appended to the response. Handlers only
/// ever see the post-refresh session, via request extensions. Refresh
/// failures are tolerated while the old access token is still valid; once
/// it has expired the request proceeds anonymously and the stale cookie is
/// cleared.
pub async fn session_refresh(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_header = request
        .headers()
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let Some(session) = session::load(cookie_header.as_deref(), &state.config) else {
        return next.run(request).await;
    };

    let window = state.config.auth.session.refresh_window;
    if !session.tokens.access_expires_within(window) {
        request.extensions_mut().insert(session);
        return next.run(request).await;
    }

    if session.tokens.refresh_token_expired() {
        tracing::info!(email = %session.email, "session refresh token expired, logging out");
        return logged_out(request, next, &state).await;
    }

    match state.oauth.refresh(&session.tokens.refresh_token).await {
        Ok(tokens) => {
            let refreshed = Session { tokens, ..session };
            match session::create_session_token(&refreshed, &state.config) {
                Ok(token) => {
                    tracing::debug!(email = %refreshed.email, "session access token refreshed");
                    request.extensions_mut().insert(refreshed);
                    let mut response = next.run(request).await;
                    append_set_cookie(&mut response, &session::session_cookie(&token, &state.config));
                    response
                }
                Err(e) => {
                    tracing::error!("failed to re-mint session after refresh: {e}");
                    request.extensions_mut().insert(refreshed);
                    next.run(request).await
                }
            }
        }
        Err(e) => {
            if session.tokens.access_expires_within(std::time::Duration::ZERO) {
                tracing::warn!(email = %session.email, "token refresh failed with expired access token: {e}");
                logged_out(request, next, &state).await
            } else {
                // Still inside the access token's lifetime; try again on a
                // later request.
                tracing::warn!(email = %session.email, "token refresh failed, keeping current session: {e}");
                request.extensions_mut().insert(session);
                next.run(request).await
            }
        }
    }
}

async fn logged_out(mut request: Request, next: Next, state: &AppState) -> Response {
    // Strip the cookie so downstream extractors see an anonymous request.
    request.headers_mut().remove(COOKIE);
    let mut response = next.run(request).await;
    append_set_cookie(&mut response, &session::clear_session_cookie(&state.config));
    response
}

fn append_set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::error!("unserializable session cookie: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::current_user::CurrentUser;

    fn user(role: Role) -> CurrentUser {
        CurrentUser { email: "u@example.com".to_string(), role }
    }

    #[test]
    fn require_role_orders_by_tier() {
        assert!(require_role(&user(Role::SuperAdmin), Role::Admin, "orders").is_ok());
        assert!(require_role(&user(Role::Admin), Role::Admin, "orders").is_ok());
        let err = require_role(&user(Role::Customer), Role::Admin, "orders").unwrap_err();
        assert!(matches!(err, Error::Forbidden { required: Role::Admin, .. }));
    }
}
