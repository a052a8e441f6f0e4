//! The authorization grant store: persisted user↔service delegations.
//!
//! Exactly one logical row per (user, service) pair. Granting is an
//! idempotent upsert, revoking flips the cancellation flag, and rows are
//! never deleted — the service-side listing keeps cancelled rows for audit.

use crate::model::{AuthorizationStatus, Grant, GrantId, ServiceId, UserId};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Grant `user`'s authorization of `service`.
    ///
    /// Upsert keyed on the pair: a fresh pair gets a new row; an existing
    /// row — cancelled or not — is reused with `cancelled` cleared and
    /// `granted_at` refreshed, and keeps its id. The upsert must be atomic
    /// for the pair: two concurrent calls may not produce two rows.
    async fn grant(&self, user: UserId, service: ServiceId) -> Result<GrantId>;

    /// Set the cancellation flag. Returns whether a row was affected
    /// (false only when no such grant exists).
    async fn revoke(&self, id: GrantId) -> Result<bool>;

    async fn revoke_pair(&self, user: UserId, service: ServiceId) -> Result<bool>;

    async fn get(&self, id: GrantId) -> Result<Option<Grant>>;

    async fn get_pair(&self, user: UserId, service: ServiceId) -> Result<Option<Grant>>;

    /// A user's own grants, id-ordered. Cancelled rows are hidden here but
    /// still visible through [`GrantStore::list_for_service`].
    async fn list_for_user(&self, user: UserId, begin: usize, count: usize) -> Result<Vec<Grant>>;

    /// All grants ever made to a service, cancelled ones included, id-ordered.
    async fn list_for_service(
        &self,
        service: ServiceId,
        begin: usize,
        count: usize,
    ) -> Result<Vec<Grant>>;

    /// Logical status of the pair, derived from row presence and the flag.
    async fn status(&self, user: UserId, service: ServiceId) -> Result<AuthorizationStatus> {
        Ok(match self.get_pair(user, service).await? {
            None => AuthorizationStatus::Unauthorized,
            Some(grant) if grant.cancelled => AuthorizationStatus::Canceled,
            Some(_) => AuthorizationStatus::Authorized,
        })
    }
}

#[derive(Default)]
struct GrantsInner {
    by_pair: HashMap<(UserId, ServiceId), GrantId>,
    rows: BTreeMap<GrantId, Grant>,
    next_id: i64,
}

/// In-process grant store (doesn't persist). The whole upsert runs under one
/// write guard, which is this store's version of the unique-(user, service)
/// constraint a relational backend would use.
#[derive(Default)]
pub struct MemoryGrantStore {
    inner: RwLock<GrantsInner>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn grant(&self, user: UserId, service: ServiceId) -> Result<GrantId> {
        let mut inner = self.inner.write().await;

        let existing = inner.by_pair.get(&(user, service)).copied();
        if let Some(id) = existing {
            if let Some(row) = inner.rows.get_mut(&id) {
                row.cancelled = false;
                row.granted_at = Utc::now();
            }
            tracing::debug!(%user, %service, grant = %id, "re-granted authorization");
            return Ok(id);
        }

        inner.next_id += 1;
        let id = GrantId(inner.next_id);
        inner.rows.insert(
            id,
            Grant {
                id,
                user,
                service,
                granted_at: Utc::now(),
                cancelled: false,
            },
        );
        inner.by_pair.insert((user, service), id);
        tracing::debug!(%user, %service, grant = %id, "granted authorization");
        Ok(id)
    }

    async fn revoke(&self, id: GrantId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.rows.get_mut(&id) {
            Some(row) => {
                row.cancelled = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_pair(&self, user: UserId, service: ServiceId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(id) = inner.by_pair.get(&(user, service)).copied() else {
            return Ok(false);
        };
        match inner.rows.get_mut(&id) {
            Some(row) => {
                row.cancelled = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: GrantId) -> Result<Option<Grant>> {
        let inner = self.inner.read().await;
        Ok(inner.rows.get(&id).cloned())
    }

    async fn get_pair(&self, user: UserId, service: ServiceId) -> Result<Option<Grant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_pair
            .get(&(user, service))
            .and_then(|id| inner.rows.get(id))
            .cloned())
    }

    async fn list_for_user(&self, user: UserId, begin: usize, count: usize) -> Result<Vec<Grant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|g| g.user == user && !g.cancelled)
            .skip(begin)
            .take(count)
            .cloned()
            .collect())
    }

    async fn list_for_service(
        &self,
        service: ServiceId,
        begin: usize,
        count: usize,
    ) -> Result<Vec<Grant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|g| g.service == service)
            .skip(begin)
            .take(count)
            .cloned()
            .collect())
    }
}
