//! Role administration endpoints.
//!
//! Mutation and enumeration are super admin operations; the registry
//! re-checks the requester against the store on every call rather than
//! trusting the session claim alone.

use axum::extract::{Query, State};
use axum::response::Json;

use crate::AppState;
use crate::api::models::roles::{
    AdminUserResponse, RoleAction, RoleMutationRequest, RoleMutationResponse, RoleQuery,
    RoleResponse,
};
use crate::auth::current_user::CurrentUser;
use crate::auth::middleware::require_role;
use crate::errors::Result;
use crate::registry::normalize_email;
use crate::types::Role;

/// Look up an identity's role.
#[utoipa::path(
    get,
    path = "/admin/role",
    params(RoleQuery),
    responses(
        (status = 200, body = RoleResponse),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Looking up another user without super admin"),
    ),
    tag = "roles"
)]
pub async fn get_role(
    State(app): State<AppState>,
    user: CurrentUser,
    Query(query): Query<RoleQuery>,
) -> Result<Json<RoleResponse>> {
    let target = match query.email {
        Some(email) => normalize_email(&email),
        None => normalize_email(&user.email),
    };
    if target != normalize_email(&user.email) {
        require_role(&user, Role::SuperAdmin, "other users' roles")?;
    }
    let role = app.registry.resolve_role(&target).await;
    Ok(Json(RoleResponse::new(target, role)))
}

/// Grant or revoke an admin role.
#[utoipa::path(
    post,
    path = "/admin/role",
    request_body = RoleMutationRequest,
    responses(
        (status = 200, body = RoleMutationResponse),
        (status = 400, description = "Malformed email or bad role"),
        (status = 401, description = "Requester is not a super admin"),
        (status = 403, description = "Target is a protected super admin"),
        (status = 404, description = "Removal target holds no admin role"),
    ),
    tag = "roles"
)]
pub async fn mutate_role(
    State(app): State<AppState>,
    user: CurrentUser,
    Json(request): Json<RoleMutationRequest>,
) -> Result<Json<RoleMutationResponse>> {
    match request.action {
        RoleAction::Add => {
            let role = request.role.unwrap_or(Role::Admin);
            let granted = app.registry.promote(&request.email, role, &user.email).await?;
            tracing::info!(
                email = %granted.email,
                role = %granted.role,
                requested_by = %user.email,
                "admin role granted"
            );
            Ok(Json(RoleMutationResponse {
                message: format!("{} is now {}", granted.email, granted.role),
                user: Some(granted.into()),
            }))
        }
        RoleAction::Remove => {
            app.registry.remove(&request.email, &user.email).await?;
            let email = normalize_email(&request.email);
            tracing::info!(email = %email, requested_by = %user.email, "admin role revoked");
            Ok(Json(RoleMutationResponse {
                message: format!("{email} no longer holds an admin role"),
                user: None,
            }))
        }
    }
}

/// Enumerate active admin users.
#[utoipa::path(
    get,
    path = "/admin/roles",
    responses(
        (status = 200, body = [AdminUserResponse]),
        (status = 401, description = "Requester is not a super admin"),
    ),
    tag = "roles"
)]
pub async fn list_roles(
    State(app): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<AdminUserResponse>>> {
    let users = app.registry.list(&user.email).await?;
    Ok(Json(users.into_iter().map(AdminUserResponse::from).collect()))
}
