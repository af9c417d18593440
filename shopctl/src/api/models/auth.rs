//! Query and response models for the OAuth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::types::Role;

/// Query parameters accepted by `GET /auth/login`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LoginQuery {
    /// Relative path to return to after login. Defaults to the configured
    /// post-login landing page.
    pub path: Option<String>,
    /// Opaque upstream provider hint (e.g. a social login shortcut).
    pub provider: Option<String>,
}

/// Query parameters the provider (or the recovery page) sends to
/// `GET /auth/callback`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set instead of `code` when the provider denied the request.
    pub error: Option<String>,
    pub error_description: Option<String>,
    /// State token recovered from `sessionStorage` when the cookie was
    /// blocked by the browser.
    pub recovered_state: Option<String>,
    /// Marker set by the recovery page so a second cookie miss is terminal.
    pub retried: Option<String>,
}

impl CallbackQuery {
    pub fn is_retry(&self) -> bool {
        self.retried.as_deref() == Some("1")
    }
}

/// Body of `GET /auth/me`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub email: String,
    pub role: Role,
    pub is_admin: bool,
    pub is_super_admin: bool,
}
