//! The credential store boundary, plus an in-process implementation.
//!
//! The validator and orchestrator only ever see the [`CredentialStore`]
//! trait; where users and services actually live is a deployment concern.

use crate::model::{
    Permission, ServiceId, ServiceInfo, ServicePermission, ServiceStatus, UserFull, UserId,
    UserInfo,
};
use crate::password;
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Lookup surface the token validator and orchestrator need from wherever
/// credentials actually live.
///
/// `Ok(None)` means "no such subject" and is a soft rejection upstream.
/// `Err` means the store itself failed; it propagates as an infrastructure
/// error and is never read as an authentication verdict.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The user plus the instant their password last changed. Any user token
    /// issued before that instant is dead.
    async fn user_with_last_password_change(
        &self,
        id: UserId,
    ) -> Result<Option<(UserInfo, DateTime<Utc>)>>;

    /// The service plus the instant its secret was last revoked. Any
    /// service-scoped token issued before that instant is dead.
    async fn service_with_secret_revoked_time(
        &self,
        id: ServiceId,
    ) -> Result<Option<(ServiceInfo, DateTime<Utc>)>>;

    async fn service(&self, id: ServiceId) -> Result<Option<ServiceInfo>>;

    /// Full user projection for scoped disclosure.
    async fn user_full(&self, id: UserId) -> Result<Option<UserFull>>;

    async fn check_login(&self, id: UserId, password: &str) -> Result<bool>;

    /// Password check by registered email; `None` for unknown address or
    /// wrong password alike.
    async fn check_login_by_email(&self, email: &str, password: &str) -> Result<Option<UserId>>;
}

struct UserRow {
    info: UserInfo,
    password_hash: String,
    last_password_change: DateTime<Utc>,
    emails: Vec<String>,
}

struct ServiceRow {
    info: ServiceInfo,
    secret_revoked_time: DateTime<Utc>,
}

#[derive(Default)]
struct DirectoryInner {
    users: HashMap<UserId, UserRow>,
    services: HashMap<ServiceId, ServiceRow>,
    next_user: i32,
    next_service: i32,
}

/// In-process user/service directory (doesn't persist). Carries the same
/// management operations a database-backed store would: account creation,
/// password rotation and the O(1) bulk revocations.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: RwLock<DirectoryInner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<UserId> {
        let hash = password::hash_password(password)?;
        let mut inner = self.inner.write().await;
        inner.next_user += 1;
        let id = UserId(inner.next_user);
        inner.users.insert(
            id,
            UserRow {
                info: UserInfo {
                    id,
                    username: username.to_owned(),
                    registration_time: Utc::now(),
                    permission: Permission::Normal,
                    phone: String::new(),
                },
                password_hash: hash,
                last_password_change: Utc::now(),
                emails: Vec::new(),
            },
        );
        tracing::debug!(user = %id, username, "created user");
        Ok(id)
    }

    /// Change a user's password. Bumps the change timestamp, which instantly
    /// invalidates every user token issued before this call.
    pub async fn set_password(&self, id: UserId, password: &str) -> Result<bool> {
        let hash = password::hash_password(password)?;
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id) {
            Some(row) => {
                row.password_hash = hash;
                row.last_password_change = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn add_email(&self, id: UserId, email: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id) {
            Some(row) => {
                row.emails.push(email.to_owned());
                true
            }
            None => false,
        }
    }

    pub async fn set_phone(&self, id: UserId, phone: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id) {
            Some(row) => {
                row.info.phone = phone.to_owned();
                true
            }
            None => false,
        }
    }

    /// Register a service. New services start PENDING with every disclosure
    /// tier at NONE, like the original registry.
    pub async fn create_service(
        &self,
        name: &str,
        description: &str,
        owner: UserId,
    ) -> Result<ServiceId> {
        let mut inner = self.inner.write().await;
        if inner.services.values().any(|row| row.info.name == name) {
            bail!("service name already taken: {name}");
        }
        inner.next_service += 1;
        let id = ServiceId(inner.next_service);
        inner.services.insert(
            id,
            ServiceRow {
                info: ServiceInfo {
                    id,
                    name: name.to_owned(),
                    description: description.to_owned(),
                    owner,
                    status: ServiceStatus::Pending,
                    unauthorized: ServicePermission::None,
                    authorized: ServicePermission::None,
                    cancel_authorization: ServicePermission::None,
                },
                secret_revoked_time: DateTime::UNIX_EPOCH,
            },
        );
        Ok(id)
    }

    pub async fn set_service_status(&self, id: ServiceId, status: ServiceStatus) -> bool {
        let mut inner = self.inner.write().await;
        match inner.services.get_mut(&id) {
            Some(row) => {
                row.info.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn set_service_permissions(
        &self,
        id: ServiceId,
        unauthorized: ServicePermission,
        authorized: ServicePermission,
        cancel_authorization: ServicePermission,
    ) -> bool {
        let mut inner = self.inner.write().await;
        match inner.services.get_mut(&id) {
            Some(row) => {
                row.info.unauthorized = unauthorized;
                row.info.authorized = authorized;
                row.info.cancel_authorization = cancel_authorization;
                true
            }
            None => false,
        }
    }

    /// Rotate a service's credential. Every SERVICE, access and refresh token
    /// minted for it before this call stops validating; no token tracking
    /// involved.
    pub async fn revoke_service_secret(&self, id: ServiceId) -> bool {
        let mut inner = self.inner.write().await;
        match inner.services.get_mut(&id) {
            Some(row) => {
                row.secret_revoked_time = Utc::now();
                tracing::debug!(service = %id, "service secret revoked");
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryDirectory {
    async fn user_with_last_password_change(
        &self,
        id: UserId,
    ) -> Result<Option<(UserInfo, DateTime<Utc>)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .get(&id)
            .map(|row| (row.info.clone(), row.last_password_change)))
    }

    async fn service_with_secret_revoked_time(
        &self,
        id: ServiceId,
    ) -> Result<Option<(ServiceInfo, DateTime<Utc>)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .services
            .get(&id)
            .map(|row| (row.info.clone(), row.secret_revoked_time)))
    }

    async fn service(&self, id: ServiceId) -> Result<Option<ServiceInfo>> {
        let inner = self.inner.read().await;
        Ok(inner.services.get(&id).map(|row| row.info.clone()))
    }

    async fn user_full(&self, id: UserId) -> Result<Option<UserFull>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id).map(|row| UserFull {
            id: row.info.id,
            username: row.info.username.clone(),
            registration_time: row.info.registration_time,
            permission: row.info.permission,
            phone: row.info.phone.clone(),
            email: row.emails.clone(),
        }))
    }

    async fn check_login(&self, id: UserId, password: &str) -> Result<bool> {
        let hash = {
            let inner = self.inner.read().await;
            match inner.users.get(&id) {
                Some(row) => row.password_hash.clone(),
                None => return Ok(false),
            }
        };
        // bcrypt is deliberately slow, keep the lock out of it
        Ok(password::verify_password(password, &hash))
    }

    async fn check_login_by_email(&self, email: &str, password: &str) -> Result<Option<UserId>> {
        let (id, hash) = {
            let inner = self.inner.read().await;
            match inner
                .users
                .values()
                .find(|row| row.emails.iter().any(|e| e == email))
            {
                Some(row) => (row.info.id, row.password_hash.clone()),
                None => return Ok(None),
            }
        };
        Ok(password::verify_password(password, &hash).then_some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_user_and_check_login() {
        let dir = MemoryDirectory::new();
        let id = dir.create_user("alice", "hunter2").await.unwrap();
        assert!(dir.check_login(id, "hunter2").await.unwrap());
        assert!(!dir.check_login(id, "wrong").await.unwrap());
        assert!(!dir.check_login(UserId(999), "hunter2").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_login_by_email() {
        let dir = MemoryDirectory::new();
        let id = dir.create_user("alice", "hunter2").await.unwrap();
        dir.add_email(id, "alice@example.com").await;
        assert_eq!(
            dir.check_login_by_email("alice@example.com", "hunter2")
                .await
                .unwrap(),
            Some(id)
        );
        assert_eq!(
            dir.check_login_by_email("alice@example.com", "wrong")
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            dir.check_login_by_email("nobody@example.com", "hunter2")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_set_password_bumps_change_time() {
        let dir = MemoryDirectory::new();
        let id = dir.create_user("alice", "hunter2").await.unwrap();
        let (_, before) = dir
            .user_with_last_password_change(id)
            .await
            .unwrap()
            .unwrap();
        assert!(dir.set_password(id, "correct horse").await.unwrap());
        let (_, after) = dir
            .user_with_last_password_change(id)
            .await
            .unwrap()
            .unwrap();
        assert!(after >= before);
        assert!(dir.check_login(id, "correct horse").await.unwrap());
        assert!(!dir.check_login(id, "hunter2").await.unwrap());
    }

    #[tokio::test]
    async fn test_new_service_secret_is_never_revoked() {
        let dir = MemoryDirectory::new();
        let owner = dir.create_user("owner", "pw").await.unwrap();
        let id = dir.create_service("wiki", "the wiki", owner).await.unwrap();
        let (info, revoked) = dir
            .service_with_secret_revoked_time(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.status, ServiceStatus::Pending);
        assert_eq!(revoked, DateTime::UNIX_EPOCH);

        assert!(dir.revoke_service_secret(id).await);
        let (_, revoked) = dir
            .service_with_secret_revoked_time(id)
            .await
            .unwrap()
            .unwrap();
        assert!(revoked > DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_service_names_are_unique() {
        let dir = MemoryDirectory::new();
        let owner = dir.create_user("owner", "pw").await.unwrap();
        dir.create_service("wiki", "the wiki", owner).await.unwrap();
        assert!(dir.create_service("wiki", "impostor", owner).await.is_err());
    }

    #[tokio::test]
    async fn test_user_full_carries_emails() {
        let dir = MemoryDirectory::new();
        let id = dir.create_user("alice", "hunter2").await.unwrap();
        dir.add_email(id, "alice@example.com").await;
        dir.add_email(id, "work@example.com").await;
        let full = dir.user_full(id).await.unwrap().unwrap();
        assert_eq!(full.email, vec!["alice@example.com", "work@example.com"]);
        assert_eq!(full.to_basic().email, full.email);
    }
}
