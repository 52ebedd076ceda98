//! Group administration guarded by group capabilities.

use std::sync::Arc;
use uuid::Uuid;

use foodshare_core::models::{Capability, Group, GroupUpdate, NewGroup, PermissionSet};
use foodshare_core::AppError;
use foodshare_db::{GroupScope, MembershipStore};

use crate::AuthorizationChecker;

/// Handing out `Admin`, or touching a group that carries it, takes `Admin`. The store
/// enforces the group side of that rule against the row it writes.
#[derive(Clone)]
pub struct GroupService {
    authz: AuthorizationChecker,
    groups: Arc<dyn MembershipStore>,
}

impl GroupService {
    pub fn new(authz: AuthorizationChecker, groups: Arc<dyn MembershipStore>) -> Self {
        Self { authz, groups }
    }

    async fn scope(&self, actor: Uuid, capability: Capability) -> Result<GroupScope, AppError> {
        let effective = self.authz.authorize_all(actor, &[capability]).await?;
        Ok(GroupScope::for_actor(actor, effective))
    }

    async fn require_group(&self, id: Uuid) -> Result<Group, AppError> {
        self.groups
            .get_group(id)
            .await?
            .ok_or_else(|| AppError::not_found("Group", id))
    }

    #[tracing::instrument(skip(self, group), fields(name = %group.name))]
    pub async fn create_group(&self, actor: Uuid, group: NewGroup) -> Result<Group, AppError> {
        self.scope(actor, Capability::CreateGroup)
            .await?
            .check(group.permissions)?;

        let created = self.groups.create_group(group).await?;
        tracing::info!(actor = %actor, group_id = %created.id, "Group created by user");
        Ok(created)
    }

    /// Removing `Admin` from a group is as privileged as granting it.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_group(
        &self,
        actor: Uuid,
        id: Uuid,
        update: GroupUpdate,
    ) -> Result<Group, AppError> {
        let scope = self.scope(actor, Capability::EditGroup).await?;
        self.groups.update_group(id, update, scope).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_group(&self, actor: Uuid, id: Uuid) -> Result<(), AppError> {
        let scope = self.scope(actor, Capability::EditGroup).await?;
        self.groups.delete_group(id, scope).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_group(&self, actor: Uuid, id: Uuid) -> Result<Group, AppError> {
        self.authz.authorize(actor, Capability::ReadGroup).await?;
        self.require_group(id).await
    }

    pub async fn search_by_name(
        &self,
        actor: Uuid,
        fragment: &str,
    ) -> Result<Vec<Group>, AppError> {
        self.authz.authorize(actor, Capability::ReadGroup).await?;
        self.groups.search_groups_by_name(fragment).await
    }

    pub async fn find_by_permissions(
        &self,
        actor: Uuid,
        mask: PermissionSet,
    ) -> Result<Vec<Group>, AppError> {
        self.authz.authorize(actor, Capability::ReadGroup).await?;
        self.groups.get_groups_by_permissions(mask).await
    }

    pub async fn list_groups(&self, actor: Uuid) -> Result<Vec<Group>, AppError> {
        self.authz.authorize(actor, Capability::ReadGroup).await?;
        self.groups.list_groups().await
    }

    /// Groups of `user_id`. Users may always list their own.
    pub async fn groups_of_user(&self, actor: Uuid, user_id: Uuid) -> Result<Vec<Group>, AppError> {
        if actor != user_id {
            self.authz.authorize(actor, Capability::ReadGroup).await?;
        }
        self.groups.groups_of_user(user_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_member(
        &self,
        actor: Uuid,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let scope = self.scope(actor, Capability::EditGroup).await?;
        self.groups.add_member(group_id, user_id, scope).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_member(
        &self,
        actor: Uuid,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let scope = self.scope(actor, Capability::EditGroup).await?;
        self.groups.remove_member(group_id, user_id, scope).await
    }
}
