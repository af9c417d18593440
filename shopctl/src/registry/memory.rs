//! In-memory role store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{AdminUser, RoleStore};
use crate::errors::Result;

/// Role store backed by a concurrent in-process map, keyed by normalized
/// email. Records do not survive a restart; protected super admins are
/// re-seeded by the registry on startup.
#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    users: DashMap<String, AdminUser>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn get(&self, email: &str) -> Result<Option<AdminUser>> {
        Ok(self.users.get(email).map(|entry| entry.clone()))
    }

    async fn upsert(&self, user: AdminUser) -> Result<AdminUser> {
        self.users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn deactivate(&self, email: &str) -> Result<bool> {
        match self.users.get_mut(email) {
            Some(mut entry) if entry.active => {
                entry.active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<AdminUser>> {
        Ok(self.users.iter().map(|entry| entry.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = MemoryRoleStore::new();
        let user = AdminUser::new("a@example.com".to_string(), Role::Admin);
        store.upsert(user.clone()).await.unwrap();

        let loaded = store.get("a@example.com").await.unwrap().unwrap();
        assert_eq!(loaded.id, user.id);
        assert_eq!(loaded.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_deactivate() {
        let store = MemoryRoleStore::new();
        store.upsert(AdminUser::new("a@example.com".to_string(), Role::Admin)).await.unwrap();

        assert!(store.deactivate("a@example.com").await.unwrap());
        assert!(!store.get("a@example.com").await.unwrap().unwrap().active);
        // Second deactivation is a no-op
        assert!(!store.deactivate("a@example.com").await.unwrap());
        assert!(!store.deactivate("missing@example.com").await.unwrap());
    }
}
