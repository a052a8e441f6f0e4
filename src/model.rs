use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub i32);

/// Surrogate key of an authorization grant, assigned at first grant and
/// stable across re-grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Administrative level of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Banned,
    Normal,
    Admin,
    Root,
}

/// Review state of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Banned,
    Pending,
    Normal,
}

/// How much a service may read about a delegating user: nothing, the basic
/// projection, or the full record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServicePermission {
    None,
    Basic,
    All,
}

/// A user as the credential store hands it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub registration_time: DateTime<Utc>,
    pub permission: Permission,
    pub phone: String,
}

/// Full user projection, contact addresses included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFull {
    pub id: UserId,
    pub username: String,
    pub registration_time: DateTime<Utc>,
    pub permission: Permission,
    pub phone: String,
    pub email: Vec<String>,
}

impl UserFull {
    pub fn to_basic(&self) -> BasicUserInfo {
        BasicUserInfo {
            id: self.id,
            username: self.username.clone(),
            registration_time: self.registration_time,
            email: self.email.clone(),
        }
    }
}

/// Restricted user projection for services on the BASIC tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicUserInfo {
    pub id: UserId,
    pub username: String,
    pub registration_time: DateTime<Utc>,
    pub email: Vec<String>,
}

/// A registered third-party service, with its three disclosure tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub name: String,
    pub description: String,
    pub owner: UserId,
    pub status: ServiceStatus,
    /// Tier applied when the user never authorized the service.
    pub unauthorized: ServicePermission,
    /// Tier applied while an authorization is active.
    pub authorized: ServicePermission,
    /// Tier applied after the user cancelled their authorization.
    pub cancel_authorization: ServicePermission,
}

/// The persisted record of a user's delegation to a service. Rows are never
/// deleted; revocation only flips `cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: GrantId,
    pub user: UserId,
    pub service: ServiceId,
    pub granted_at: DateTime<Utc>,
    pub cancelled: bool,
}

/// Logical status of a (user, service) relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationStatus {
    Unauthorized,
    Authorized,
    Canceled,
}
