//! The authenticated identity, as seen by handlers.

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;

use crate::AppState;
use crate::auth::session::{self, Session};
use crate::errors::Error;
use crate::types::{Permission, Role};

/// The user behind the current request.
///
/// Extracting this in a handler makes the route require authentication:
/// requests without a valid, unexpired session are rejected with 401 before
/// the handler body runs.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.allows(permission)
    }
}

impl From<Session> for CurrentUser {
    fn from(session: Session) -> Self {
        Self { email: session.email, role: session.role }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // The refresh middleware parks the (possibly re-minted) session in
        // request extensions; prefer that over re-parsing the cookie, since
        // the cookie may carry an access token the middleware just replaced.
        if let Some(session) = parts.extensions.get::<Session>() {
            return Ok(session.clone().into());
        }

        let cookie_header = parts.headers.get(COOKIE).and_then(|v| v.to_str().ok());
        let session = session::load(cookie_header, &state.config)
            .ok_or(Error::Unauthorized { message: None })?;
        if session.tokens.access_expires_within(std::time::Duration::ZERO) {
            // Expired upstream token without a successful refresh means the
            // session is no longer usable.
            return Err(Error::Unauthorized {
                message: Some("Session expired. Please log in again.".to_string()),
            });
        }
        Ok(session.into())
    }
}
