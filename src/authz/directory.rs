use async_trait::async_trait;

use super::UserPermissionRecord;
use crate::errors::AppError;

/// Resolves a user identity to its permission record.
///
/// `Ok(None)` means the user has no account; `Err` means the backing store
/// could not answer (surfaced as 503 rather than a misleading 403, so an
/// outage is never mistaken for a missing grant). Two backings exist: the
/// local SQLite store and the upstream user-profile endpoint.
#[async_trait]
pub trait PermissionDirectory: Send + Sync {
    async fn lookup(&self, email: &str) -> Result<Option<UserPermissionRecord>, AppError>;
}
