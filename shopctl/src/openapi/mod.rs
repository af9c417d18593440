//! OpenAPI documentation for the auth and role administration API.

use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "shopctl API",
        description = "OAuth login, session, and admin role management for the storefront",
    ),
    paths(
        handlers::auth::login,
        handlers::auth::callback,
        handlers::auth::logout,
        handlers::auth::me,
        handlers::roles::get_role,
        handlers::roles::mutate_role,
        handlers::roles::list_roles,
    ),
    components(schemas(
        models::auth::MeResponse,
        models::roles::RoleResponse,
        models::roles::RoleAction,
        models::roles::RoleMutationRequest,
        models::roles::RoleMutationResponse,
        models::roles::AdminUserResponse,
        crate::registry::AdminUser,
        crate::types::Role,
        crate::types::Resource,
        crate::types::Action,
        crate::types::Permission,
    )),
    tags(
        (name = "auth", description = "OAuth login flow and session endpoints"),
        (name = "roles", description = "Admin role management"),
    )
)]
pub struct ApiDoc;
