//! Authentication and authorization system.
//!
//! Implements the OAuth 2.0 authorization-code flow against the commerce
//! platform's identity provider, plus the session and guard machinery around
//! it:
//!
//! - [`oauth`]: the upstream client (authorization URL, code exchange, token
//!   refresh, identity fetch, logout URL)
//! - [`state`]: the transient OAuth request state - a short-TTL signed cookie
//!   with CSRF token and PKCE verifier, single-use by construction
//! - [`session`]: the session cookie holding the access/refresh token pair
//!   and the resolved identity
//! - [`current_user`]: extractor that turns the session cookie into a
//!   [`current_user::CurrentUser`] for handlers
//! - [`middleware`]: transparent token refresh and role guard helpers
//!
//! # Flow
//!
//! `GET /auth/login` issues an [`state::IssuedState`], sets the state cookie,
//! and sends the browser to the provider. The provider redirects back to
//! `GET /auth/callback` with `code` and `state`; the handler validates the
//! state (exact match, unconsumed, unexpired), exchanges the code, resolves
//! the identity's role through the registry, and establishes the session
//! cookie. Every protected request then goes through [`current_user`] and a
//! [`middleware::require_role`] check before doing anything else.

pub mod current_user;
pub mod middleware;
pub mod oauth;
pub mod session;
pub mod state;
