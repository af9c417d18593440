//! # shopctl: Storefront Authentication Control
//!
//! `shopctl` is the authentication and authorization core of a server-rendered
//! storefront. It delegates identity entirely to the commerce platform's OAuth
//! provider and keeps for itself the three things the platform cannot decide:
//! who is an administrator, what their session looks like, and which requests
//! they may make.
//!
//! ## Overview
//!
//! Customers and staff sign in through the same OAuth 2.0 authorization-code
//! flow (with PKCE). After the code exchange, the authenticated email is
//! resolved against a locally managed role registry: most identities are plain
//! customers, a configured few are admins or super admins. The resolved role is
//! sealed into a signed session cookie alongside the upstream access/refresh
//! token pair, so request handling needs no session table and no identity
//! provider round trip.
//!
//! ### Request Flow
//!
//! `GET /auth/login` issues a single-use, short-lived state token (CSRF state
//! plus PKCE verifier), sets it as a cookie, mirrors it into `sessionStorage`
//! for browsers that drop cross-site cookies, and forwards to the provider.
//! The provider redirects back to `GET /auth/callback`, where the state is
//! verified and consumed, the code is exchanged, the role is resolved, and the
//! session cookie is established. Subsequent requests pass through the refresh
//! middleware ([`auth::middleware::session_refresh`]), which transparently
//! renews the upstream access token near expiry, and reach handlers that
//! extract [`auth::current_user::CurrentUser`] and apply role guards.
//!
//! ### Core Components
//!
//! The **API layer** ([`api`]) exposes the login flow under `/auth/*` and the
//! role administration endpoints under `/admin/*`. The **authentication
//! layer** ([`auth`]) owns the OAuth client, state and session tokens, and the
//! guards. The **role registry** ([`registry`]) stores admin role assignments
//! behind a pluggable [`registry::RoleStore`], with protected super admins
//! seeded from configuration.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use shopctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = shopctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     shopctl::telemetry::init_telemetry();
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
mod openapi;
pub mod registry;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod test;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Router, http};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::auth::oauth::OAuthClient;
use crate::auth::state::ConsumedStates;
use crate::openapi::ApiDoc;
use crate::registry::RoleRegistry;

pub use config::Config;
pub use types::{Action, AdminUserId, Permission, Resource, Role};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub registry: RoleRegistry,
    pub oauth: Arc<OAuthClient>,
    pub consumed_states: Arc<ConsumedStates>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.cors.allowed_origins.is_empty() {
        return Ok(CorsLayer::new());
    }
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        origins.push(origin.parse::<HeaderValue>()?);
    }
    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);
    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }
    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/auth/login", get(api::handlers::auth::login))
        .route("/auth/callback", get(api::handlers::auth::callback))
        .route("/auth/logout", get(api::handlers::auth::logout))
        .route("/auth/me", get(api::handlers::auth::me))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/admin/role",
            get(api::handlers::roles::get_role).post(api::handlers::roles::mutate_role),
        )
        .route("/admin/roles", get(api::handlers::roles::list_roles))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/api-docs/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        .merge(auth_routes)
        .merge(admin_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(from_fn_with_state(state.clone(), auth::middleware::session_refresh));

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The assembled service: router, state, and listener lifecycle.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        tracing::debug!("Starting storefront auth with configuration: {:#?}", config);

        let registry = RoleRegistry::from_config(&config.registry).await?;
        let oauth = Arc::new(OAuthClient::new(&config)?);

        let state = AppState::builder()
            .config(config.clone())
            .registry(registry)
            .oauth(oauth)
            .consumed_states(Arc::new(ConsumedStates::new()))
            .build();

        let router = build_router(state)?;
        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service())
            .expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Storefront auth listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
