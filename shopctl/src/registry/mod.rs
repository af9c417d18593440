//! Role registry: the authority mapping identities (emails) to roles.
//!
//! The registry is deliberately isolated from the OAuth flow so the backing
//! store can change without touching authentication. Stores implement
//! [`RoleStore`]; two backends ship here:
//!
//! - [`memory::MemoryRoleStore`]: in-process, for development and tests
//! - [`file::FileRoleStore`]: JSON file with atomic rewrites
//!
//! Role resolution is total (unknown emails are customers) and cached with a
//! bounded TTL; every mutation invalidates the affected entry so staleness
//! only matters across processes.
//!
//! Protected super admins are seeded from configuration at startup and can
//! never be demoted or removed through the API.

pub mod file;
pub mod memory;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{RegistryConfig, RegistryStoreConfig};
use crate::errors::{Error, Result};
use crate::types::{AdminUserId, Permission, Role};

/// A registry record for an admin or super-admin identity.
///
/// Customers have no record; absence means [`Role::Customer`]. Records are
/// deactivated on removal, never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: AdminUserId,
    pub email: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub active: bool,
}

impl AdminUser {
    fn new(email: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            role,
            permissions: role.permissions(),
            created_at: Utc::now(),
            last_login: None,
            active: true,
        }
    }
}

/// Backing store for admin role records, keyed by normalized email.
///
/// Implementations must make each operation atomic: a failed upsert or
/// deactivation leaves the store unchanged.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get(&self, email: &str) -> Result<Option<AdminUser>>;
    async fn upsert(&self, user: AdminUser) -> Result<AdminUser>;
    async fn deactivate(&self, email: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<AdminUser>>;
}

/// Normalize an email address: the sole identity key used throughout.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Validate and normalize an email address.
///
/// Deliberately shallow: one `@`, non-empty local part, a dotted domain, no
/// embedded whitespace. The identity provider is the authority on deliverable
/// addresses; this only rejects obvious garbage before it lands in the store.
pub fn validate_email(raw: &str) -> Result<String> {
    let email = normalize_email(raw);
    let invalid = || Error::InvalidEmail { email: raw.to_string() };

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(email)
}

/// The role registry service.
///
/// Holds the backing store, the protected super-admin set, and a TTL-bounded
/// resolution cache. Cloning is cheap; all state is shared.
#[derive(Clone)]
pub struct RoleRegistry {
    store: Arc<dyn RoleStore>,
    protected: Arc<HashSet<String>>,
    cache: Cache<String, Role>,
}

impl RoleRegistry {
    /// Build a registry from configuration: construct the backing store,
    /// then seed the protected super admins so they are visible to `list`.
    pub async fn from_config(config: &RegistryConfig) -> Result<Self> {
        let store: Arc<dyn RoleStore> = match &config.store {
            RegistryStoreConfig::Memory => Arc::new(memory::MemoryRoleStore::new()),
            RegistryStoreConfig::File { path } => Arc::new(file::FileRoleStore::new(path.clone())),
        };
        Self::with_store(store, config).await
    }

    /// Build a registry around an existing store (used by tests and by any
    /// future database-backed store).
    pub async fn with_store(store: Arc<dyn RoleStore>, config: &RegistryConfig) -> Result<Self> {
        let mut protected = HashSet::new();
        for email in &config.super_admins {
            protected.insert(validate_email(email)?);
        }

        let registry = Self {
            store,
            protected: Arc::new(protected),
            cache: Cache::builder().max_capacity(10_000).time_to_live(config.cache_ttl).build(),
        };
        registry.seed().await?;
        Ok(registry)
    }

    /// Materialize protected super admins into the store. Idempotent: existing
    /// records are left alone apart from being re-activated and re-tiered.
    async fn seed(&self) -> Result<()> {
        for email in self.protected.iter() {
            match self.store.get(email).await? {
                Some(existing) if existing.active && existing.role == Role::SuperAdmin => {}
                Some(mut existing) => {
                    existing.role = Role::SuperAdmin;
                    existing.permissions = Role::SuperAdmin.permissions();
                    existing.active = true;
                    self.store.upsert(existing).await?;
                }
                None => {
                    info!(email, "seeding protected super admin");
                    self.store.upsert(AdminUser::new(email.clone(), Role::SuperAdmin)).await?;
                }
            }
        }
        Ok(())
    }

    /// Whether this email is in the immutable super-admin seed set.
    pub fn is_protected(&self, email: &str) -> bool {
        self.protected.contains(&normalize_email(email))
    }

    /// Resolve the role for an identity. Total: unknown or inactive records
    /// and store failures all resolve to `Customer`.
    #[instrument(skip(self))]
    pub async fn resolve_role(&self, email: &str) -> Role {
        let email = normalize_email(email);
        let store = self.store.clone();
        self.cache
            .get_with(email.clone(), async move {
                match store.get(&email).await {
                    Ok(Some(user)) if user.active => user.role,
                    Ok(_) => Role::Customer,
                    Err(e) => {
                        // Fail closed: a broken store must not grant privileges
                        warn!("role store lookup failed for {email}: {e:#}");
                        Role::Customer
                    }
                }
            })
            .await
    }

    /// Promote an email to `admin` or `super_admin`.
    ///
    /// Requires `requested_by` to currently resolve to super admin. Idempotent:
    /// promoting to the role already held is a no-op success.
    #[instrument(skip(self))]
    pub async fn promote(&self, email: &str, role: Role, requested_by: &str) -> Result<AdminUser> {
        self.require_super_admin(requested_by).await?;

        let email = validate_email(email)?;
        if role == Role::Customer {
            return Err(Error::BadRequest {
                message: "cannot promote to customer; use remove to revoke admin access".to_string(),
            });
        }
        if self.is_protected(&email) && role != Role::SuperAdmin {
            return Err(Error::Forbidden {
                required: Role::SuperAdmin,
                resource: format!("protected super admin '{email}'"),
            });
        }

        let user = match self.store.get(&email).await? {
            Some(existing) if existing.active && existing.role == role => existing,
            Some(mut existing) => {
                existing.role = role;
                existing.permissions = role.permissions();
                existing.active = true;
                self.store.upsert(existing).await?
            }
            None => self.store.upsert(AdminUser::new(email.clone(), role)).await?,
        };

        self.cache.invalidate(&email).await;
        info!(email, role = %role, requested_by, "admin role granted");
        Ok(user)
    }

    /// Deactivate an admin record.
    ///
    /// Protected seed emails always fail with `Forbidden`; emails without an
    /// active admin record fail with `NotFound`.
    #[instrument(skip(self))]
    pub async fn remove(&self, email: &str, requested_by: &str) -> Result<()> {
        self.require_super_admin(requested_by).await?;

        let email = validate_email(email)?;
        if self.is_protected(&email) {
            return Err(Error::Forbidden {
                required: Role::SuperAdmin,
                resource: format!("protected super admin '{email}'"),
            });
        }

        match self.store.get(&email).await? {
            Some(user) if user.active => {
                self.store.deactivate(&email).await?;
                self.cache.invalidate(&email).await;
                info!(email, requested_by, "admin role revoked");
                Ok(())
            }
            _ => Err(Error::NotFound {
                resource: "admin".to_string(),
                id: email,
            }),
        }
    }

    /// List active admin records. Super admin only.
    pub async fn list(&self, requested_by: &str) -> Result<Vec<AdminUser>> {
        self.require_super_admin(requested_by).await?;
        let mut users: Vec<AdminUser> = self.store.list().await?.into_iter().filter(|u| u.active).collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    /// Record a successful login for an admin identity. Best-effort: failures
    /// are logged, never surfaced to the login flow.
    pub async fn record_login(&self, email: &str) {
        let email = normalize_email(email);
        let result = async {
            if let Some(mut user) = self.store.get(&email).await? {
                if user.active {
                    user.last_login = Some(Utc::now());
                    self.store.upsert(user).await?;
                }
            }
            Ok::<_, Error>(())
        }
        .await;
        if let Err(e) = result {
            warn!("failed to record admin login for {email}: {e:#}");
        } else {
            debug!(email, "recorded admin login");
        }
    }

    async fn require_super_admin(&self, requested_by: &str) -> Result<()> {
        if self.resolve_role(requested_by).await != Role::SuperAdmin {
            return Err(Error::Unauthorized {
                message: Some("role registry changes require a super admin".to_string()),
            });
        }
        Ok(())
    }
}
