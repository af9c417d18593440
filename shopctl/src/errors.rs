use crate::types::Role;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// A required query parameter was absent from the request
    #[error("Missing required parameter '{name}'")]
    MissingParameter { name: String },

    /// The identity provider reported an error during authorization
    #[error("Identity provider error: {description}")]
    UpstreamAuthError { description: String },

    /// The OAuth request state was lost and could not be recovered
    #[error("Login state is missing or expired")]
    MissingOAuthState,

    /// The returned state does not match the issued one (possible CSRF)
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// The authorization code could not be exchanged for tokens
    #[error("Token exchange failed: {reason}")]
    TokenExchangeError { reason: String },

    /// An identity provider call exceeded the configured timeout
    #[error("Identity provider timed out")]
    UpstreamTimeout,

    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthorized { message: Option<String> },

    /// Identity present but role is insufficient for the operation
    #[error("Insufficient role for {resource}: requires {required}")]
    Forbidden { required: Role, resource: String },

    /// The email address is malformed
    #[error("Invalid email address: {email}")]
    InvalidEmail { email: String },

    /// Requested record not found
    #[error("{resource} '{id}' not found")]
    NotFound { resource: String, id: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingParameter { .. } => StatusCode::BAD_REQUEST,
            Error::UpstreamAuthError { .. } => StatusCode::BAD_GATEWAY,
            Error::MissingOAuthState => StatusCode::UNAUTHORIZED,
            Error::StateMismatch => StatusCode::UNAUTHORIZED,
            Error::TokenExchangeError { .. } => StatusCode::BAD_GATEWAY,
            Error::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::InvalidEmail { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::MissingParameter { name } => format!("Missing required parameter '{name}'"),
            Error::UpstreamAuthError { description } => format!("Sign-in was not completed: {description}"),
            Error::MissingOAuthState => "Your login attempt expired or was interrupted. Please sign in again.".to_string(),
            Error::StateMismatch => "Your login attempt could not be verified. Please sign in again.".to_string(),
            Error::TokenExchangeError { .. } => "Sign-in could not be completed. Please try again.".to_string(),
            Error::UpstreamTimeout => "The sign-in service took too long to respond. Please try again.".to_string(),
            Error::Unauthorized { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { required, resource } => format!("Access to {resource} requires the {required} role"),
            Error::InvalidEmail { email } => format!("Invalid email address: {email}"),
            Error::NotFound { resource, id } => format!("{resource} '{id}' not found"),
            Error::BadRequest { message } => message.clone(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::StateMismatch => {
                // Possible CSRF attempt; always recorded as a security event
                tracing::warn!(security = true, "OAuth state mismatch: {}", self);
            }
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::UpstreamAuthError { .. } | Error::TokenExchangeError { .. } | Error::UpstreamTimeout => {
                tracing::warn!("Upstream identity provider error: {}", self);
            }
            Error::Unauthorized { .. } | Error::Forbidden { .. } | Error::MissingOAuthState => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::MissingParameter { .. } | Error::InvalidEmail { .. } | Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        (status, self.user_message()).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
