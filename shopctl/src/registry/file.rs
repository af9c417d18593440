//! JSON file-backed role store.
//!
//! The whole record set is small (an admin list), so every mutation rewrites
//! the file: serialize to a sibling temp file, then rename over the original.
//! The rename makes each mutation atomic on the filesystem; a mutex
//! serializes writers within the process. A missing or corrupt file is
//! treated as an empty store rather than an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use super::{AdminUser, RoleStore};
use crate::errors::{Error, Result};

pub struct FileRoleStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRoleStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> BTreeMap<String, AdminUser> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("failed to read role store {}: {e}", self.path.display());
                return BTreeMap::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(users) => users,
            Err(e) => {
                warn!("role store {} is corrupt, treating as empty: {e}", self.path.display());
                BTreeMap::new()
            }
        }
    }

    async fn persist(&self, users: &BTreeMap<String, AdminUser>) -> Result<()> {
        let json = serde_json::to_vec_pretty(users).map_err(|e| Error::Internal {
            operation: format!("serialize role store: {e}"),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Internal {
                operation: format!("create role store directory {}: {e}", parent.display()),
            })?;
        }

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &json).await.map_err(|e| Error::Internal {
            operation: format!("write role store temp file {}: {e}", tmp.display()),
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| Error::Internal {
            operation: format!("replace role store {}: {e}", self.path.display()),
        })?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl RoleStore for FileRoleStore {
    async fn get(&self, email: &str) -> Result<Option<AdminUser>> {
        Ok(self.load().await.get(email).cloned())
    }

    async fn upsert(&self, user: AdminUser) -> Result<AdminUser> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await;
        users.insert(user.email.clone(), user.clone());
        self.persist(&users).await?;
        Ok(user)
    }

    async fn deactivate(&self, email: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await;
        match users.get_mut(email) {
            Some(user) if user.active => {
                user.active = false;
                self.persist(&users).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<AdminUser>> {
        Ok(self.load().await.into_values().collect())
    }
}
