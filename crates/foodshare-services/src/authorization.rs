//! Capability checks against a user's group memberships.

use std::sync::Arc;
use uuid::Uuid;

use foodshare_core::models::{Capability, PermissionSet};
use foodshare_core::AppError;
use foodshare_db::{MembershipStore, UserDirectory};

/// Resolves effective permissions and guards operations with them.
///
/// Holds no cache: every check reads memberships, so a change takes effect on the next call.
#[derive(Clone)]
pub struct AuthorizationChecker {
    users: Arc<dyn UserDirectory>,
    memberships: Arc<dyn MembershipStore>,
}

impl AuthorizationChecker {
    pub fn new(users: Arc<dyn UserDirectory>, memberships: Arc<dyn MembershipStore>) -> Self {
        Self { users, memberships }
    }

    /// Union of the permissions of every group `user_id` belongs to.
    #[tracing::instrument(skip(self))]
    pub async fn effective_permissions(&self, user_id: Uuid) -> Result<PermissionSet, AppError> {
        if self.users.get_user(user_id).await?.is_none() {
            return Err(AppError::not_found("User", user_id));
        }

        let groups = self.memberships.groups_of_user(user_id).await?;
        Ok(PermissionSet::union_all(
            groups.iter().map(|group| group.permissions),
        ))
    }

    /// `Forbidden` unless the user's effective set grants `capability`.
    pub async fn authorize(&self, user_id: Uuid, capability: Capability) -> Result<(), AppError> {
        self.authorize_all(user_id, &[capability]).await.map(|_| ())
    }

    /// Requires every capability in `capabilities`; reports the first one missing.
    /// Returns the effective set the check ran against.
    #[tracing::instrument(skip(self))]
    pub async fn authorize_all(
        &self,
        user_id: Uuid,
        capabilities: &[Capability],
    ) -> Result<PermissionSet, AppError> {
        let effective = self.effective_permissions(user_id).await?;

        match capabilities.iter().find(|c| !effective.has(**c)) {
            Some(&missing) => {
                tracing::debug!(
                    user_id = %user_id,
                    capability = %missing,
                    "Capability check denied"
                );
                Err(AppError::Forbidden {
                    user_id,
                    capability: missing,
                })
            }
            None => Ok(effective),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    #[tokio::test]
    async fn union_across_groups_grants_and_denies() {
        let fx = Fixture::new();
        let user = fx.user("both@example.org").await;
        let volunteers = fx
            .group("Volunteers", PermissionSet::READ_ACT | PermissionSet::READ_COMPANY)
            .await;
        let auditors = fx
            .group(
                "Auditors",
                PermissionSet::READ_COMPANY | PermissionSet::EDIT_COMPANY,
            )
            .await;
        fx.join(volunteers.id, user.id).await;
        fx.join(auditors.id, user.id).await;

        let authz = fx.authz();
        authz
            .authorize(user.id, Capability::EditCompany)
            .await
            .unwrap();

        let err = authz
            .authorize(user.id, Capability::CreateAct)
            .await
            .unwrap_err();
        match err {
            AppError::Forbidden {
                user_id,
                capability,
            } => {
                assert_eq!(user_id, user.id);
                assert_eq!(capability, Capability::CreateAct);
            }
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn user_without_groups_has_empty_set() {
        let fx = Fixture::new();
        let user = fx.user("nobody@example.org").await;

        let authz = fx.authz();
        assert_eq!(
            authz.effective_permissions(user.id).await.unwrap(),
            PermissionSet::empty()
        );
        assert!(authz
            .authorize(user.id, Capability::ReadAct)
            .await
            .unwrap_err()
            .is_forbidden());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found_not_forbidden() {
        let fx = Fixture::new();
        let err = fx
            .authz()
            .authorize(Uuid::new_v4(), Capability::ReadAct)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn admin_group_grants_everything() {
        let fx = Fixture::new();
        let admin = fx.admin().await;

        let effective = fx
            .authz()
            .authorize_all(admin, &Capability::ALL)
            .await
            .unwrap();
        assert!(effective.is_admin());
    }

    #[tokio::test]
    async fn membership_changes_apply_to_next_check() {
        let fx = Fixture::new();
        let user = fx.user("late@example.org").await;
        let editors = fx.group("Editors", PermissionSet::EDIT_ACT).await;
        let authz = fx.authz();

        assert!(authz
            .authorize(user.id, Capability::EditAct)
            .await
            .is_err());

        fx.join(editors.id, user.id).await;
        authz.authorize(user.id, Capability::EditAct).await.unwrap();
    }

    #[tokio::test]
    async fn authorize_all_reports_first_missing() {
        let fx = Fixture::new();
        let user = fx.user("reader@example.org").await;
        let readers = fx.group("Readers", PermissionSet::READ_GROUP).await;
        fx.join(readers.id, user.id).await;

        let err = fx
            .authz()
            .authorize_all(user.id, &[Capability::ReadGroup, Capability::EditGroup])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Forbidden {
                capability: Capability::EditGroup,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let fx = Fixture::new();
        let user = fx.user("x@example.org").await;
        fx.store.set_failing(true);

        let err = fx
            .authz()
            .authorize(user.id, Capability::ReadAct)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreFailure { .. }));
    }
}
