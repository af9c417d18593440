//! Request/response models for the role administration endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::registry::AdminUser;
use crate::types::{AdminUserId, Permission, Role};

/// Query parameters for `GET /admin/role`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RoleQuery {
    /// Email to look up. Defaults to the caller's own; looking up anyone
    /// else requires super admin.
    pub email: Option<String>,
}

/// Body of `GET /admin/role`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub email: String,
    pub role: Role,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

impl RoleResponse {
    pub fn new(email: String, role: Role) -> Self {
        Self { email, role, is_admin: role.is_admin(), is_super_admin: role.is_super_admin() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleAction {
    Add,
    Remove,
}

/// Body of `POST /admin/role`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleMutationRequest {
    pub action: RoleAction,
    pub email: String,
    /// Role to grant on `add`. Defaults to `admin`. Ignored on `remove`.
    pub role: Option<Role>,
}

/// An admin user as exposed over the API. Upstream tokens never appear here.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminUserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AdminUserId,
    pub email: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<AdminUser> for AdminUserResponse {
    fn from(user: AdminUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            permissions: user.permissions,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// Body of `POST /admin/role`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleMutationResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AdminUserResponse>,
}
