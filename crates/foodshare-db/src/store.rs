//! Store abstractions consumed by the services and the worker pool.
//!
//! Postgres repositories in [`crate::db`] implement these; the in-memory store in
//! `test_helpers` implements the same contracts for tests without a database.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use foodshare_core::models::{
    Capability, ClientUploadOutcome, FileClaim, FileRecord, Group, GroupUpdate, NewFile,
    NewGroup, NewUser, PermissionSet, TransferOutcome, User,
};
use foodshare_core::AppError;

/// Point lookups of users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
}

/// Which groups a mutation may touch.
///
/// Stores check the scope against the row they lock for the write, so an `Admin` grant
/// landing between an earlier read and the write is still caught.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupScope {
    /// The actor holds `Admin`.
    Any,
    /// Groups carrying `Admin` are off limits to `actor`.
    NonAdmin { actor: Uuid },
}

impl GroupScope {
    pub fn for_actor(actor: Uuid, effective: PermissionSet) -> Self {
        if effective.is_admin() {
            Self::Any
        } else {
            Self::NonAdmin { actor }
        }
    }

    /// `Forbidden` when `permissions` carries `Admin` and the scope excludes it.
    pub fn check(&self, permissions: PermissionSet) -> Result<(), AppError> {
        match *self {
            Self::NonAdmin { actor } if permissions.is_admin() => Err(AppError::Forbidden {
                user_id: actor,
                capability: Capability::Admin,
            }),
            _ => Ok(()),
        }
    }
}

/// Groups and the `(user, group)` membership relation.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Fails with `InvalidInput` when the name is taken.
    async fn create_group(&self, group: NewGroup) -> Result<Group, AppError>;

    /// Both the current and the new permissions must be inside `scope`.
    async fn update_group(
        &self,
        id: Uuid,
        update: GroupUpdate,
        scope: GroupScope,
    ) -> Result<Group, AppError>;

    /// Removes the group together with its membership rows.
    async fn delete_group(&self, id: Uuid, scope: GroupScope) -> Result<(), AppError>;

    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, AppError>;

    /// Case-insensitive substring match on the group name.
    async fn search_groups_by_name(&self, fragment: &str) -> Result<Vec<Group>, AppError>;

    /// Groups sharing at least one bit with `mask`.
    async fn get_groups_by_permissions(
        &self,
        mask: PermissionSet,
    ) -> Result<Vec<Group>, AppError>;

    async fn list_groups(&self) -> Result<Vec<Group>, AppError>;

    /// Idempotent. `NotFound` when the user or the group does not exist.
    async fn add_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        scope: GroupScope,
    ) -> Result<(), AppError>;

    /// Idempotent; removing an absent pair succeeds.
    async fn remove_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        scope: GroupScope,
    ) -> Result<(), AppError>;

    async fn groups_of_user(&self, user_id: Uuid) -> Result<Vec<Group>, AppError>;
}

/// File records outside of the claim protocol.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Inserts a record in `ClientUploadInProgress`.
    async fn create_file(&self, user_id: Uuid, file: NewFile) -> Result<FileRecord, AppError>;

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    /// Conditional transition out of `ClientUploadInProgress`.
    async fn record_client_result(
        &self,
        id: Uuid,
        outcome: ClientUploadOutcome,
    ) -> Result<FileRecord, AppError>;
}

/// Exclusive hand-off of `UploadedByClient` records to workers.
#[async_trait]
pub trait UploadClaimQueue: Send + Sync {
    /// Atomically claims the oldest eligible record. `None` means the queue is empty.
    async fn claim_next(&self) -> Result<Option<FileClaim>, AppError>;

    /// Records the transfer outcome for a record claimed with `lease_token`.
    async fn finalize(
        &self,
        file_id: Uuid,
        lease_token: Uuid,
        outcome: TransferOutcome,
    ) -> Result<FileRecord, AppError>;

    /// Returns claims older than `lease` to the queue. Returns the number reclaimed.
    async fn reclaim_expired(&self, lease: Duration) -> Result<u64, AppError>;

    /// Puts a `StorageUploadError` record back in the queue.
    async fn requeue_failed(&self, file_id: Uuid) -> Result<FileRecord, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_follows_actor_admin_bit() {
        let actor = Uuid::new_v4();
        assert_eq!(
            GroupScope::for_actor(actor, PermissionSet::ADMIN | PermissionSet::READ_ACT),
            GroupScope::Any
        );
        assert_eq!(
            GroupScope::for_actor(actor, PermissionSet::EDIT_GROUP),
            GroupScope::NonAdmin { actor }
        );
    }

    #[test]
    fn non_admin_scope_rejects_admin_groups_only() {
        let actor = Uuid::new_v4();
        let scope = GroupScope::NonAdmin { actor };

        assert!(scope.check(PermissionSet::READ_ACT).is_ok());
        assert!(matches!(
            scope.check(PermissionSet::ADMIN),
            Err(AppError::Forbidden {
                user_id,
                capability: Capability::Admin,
            }) if user_id == actor
        ));
        assert!(GroupScope::Any.check(PermissionSet::all()).is_ok());
    }
}
