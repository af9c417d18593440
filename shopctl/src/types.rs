//! Common type definitions: roles and the permission system.
//!
//! The permission system is based on three core types:
//!
//! - [`Role`]: the tier an identity resolves to (`customer`, `admin`, `super_admin`)
//! - [`Resource`] and [`Action`]: what is being accessed and how
//! - [`Permission`]: a (resource, action) pair a role may or may not allow
//!
//! Roles are totally ordered (`Customer < Admin < SuperAdmin`) so guard checks
//! can be expressed as `role >= min_role`.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier for an admin registry record.
pub type AdminUserId = Uuid;

/// Role tier an identity resolves to.
///
/// Unknown emails always resolve to `Customer`; the registry only stores
/// records for `Admin` and `SuperAdmin`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self >= Role::Admin
    }

    pub fn is_super_admin(self) -> bool {
        self == Role::SuperAdmin
    }

    /// Whether this role grants the given permission.
    pub fn allows(self, permission: Permission) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::Admin => matches!(
                (permission.resource, permission.action),
                (Resource::Orders | Resource::Products | Resource::Customers, Action::Read | Action::Write)
                    | (Resource::Analytics | Resource::Settings, Action::Read)
            ),
            Role::Customer => false,
        }
    }

    /// The full set of permissions this role grants.
    pub fn permissions(self) -> Vec<Permission> {
        Resource::ALL
            .iter()
            .flat_map(|&resource| Action::ALL.iter().map(move |&action| Permission { resource, action }))
            .filter(|&p| self.allows(p))
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        };
        write!(f, "{s}")
    }
}

/// Resources that can be operated on through the admin surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Orders,
    Products,
    Customers,
    Analytics,
    Settings,
    Users,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Orders,
        Resource::Products,
        Resource::Customers,
        Resource::Analytics,
        Resource::Settings,
        Resource::Users,
    ];
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Orders => "orders",
            Resource::Products => "products",
            Resource::Customers => "customers",
            Resource::Analytics => "analytics",
            Resource::Settings => "settings",
            Resource::Users => "users",
        };
        write!(f, "{s}")
    }
}

/// Actions that can be performed on a [`Resource`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Write,
    Delete,
    Admin,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Write, Action::Delete, Action::Admin];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

/// A (resource, action) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    pub fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Customer < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::Customer.is_admin());
    }

    #[test]
    fn test_super_admin_full_cross_product() {
        let perms = Role::SuperAdmin.permissions();
        assert_eq!(perms.len(), Resource::ALL.len() * Action::ALL.len());
    }

    #[test]
    fn test_admin_default_set() {
        let admin = Role::Admin;
        assert!(admin.allows(Permission::new(Resource::Orders, Action::Read)));
        assert!(admin.allows(Permission::new(Resource::Orders, Action::Write)));
        assert!(admin.allows(Permission::new(Resource::Products, Action::Write)));
        assert!(admin.allows(Permission::new(Resource::Customers, Action::Write)));
        assert!(admin.allows(Permission::new(Resource::Analytics, Action::Read)));
        assert!(admin.allows(Permission::new(Resource::Settings, Action::Read)));

        assert!(!admin.allows(Permission::new(Resource::Orders, Action::Delete)));
        assert!(!admin.allows(Permission::new(Resource::Settings, Action::Write)));
        assert!(!admin.allows(Permission::new(Resource::Users, Action::Read)));
        assert!(!admin.allows(Permission::new(Resource::Analytics, Action::Admin)));
    }

    #[test]
    fn test_customer_has_no_admin_permissions() {
        assert!(Role::Customer.permissions().is_empty());
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"super_admin\"");
        assert_eq!(serde_json::from_str::<Role>("\"customer\"").unwrap(), Role::Customer);
    }
}
