use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use foodshare_core::models::{Group, GroupUpdate, NewGroup, PermissionSet};
use foodshare_core::{AppError, StoreResultExt};

use crate::db::{is_foreign_key_violation, is_unique_violation};
use crate::store::{GroupScope, MembershipStore};

#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Permissions of group `id`, row-locked until `tx` ends. `None` when it does not exist.
    ///
    /// `exclusive` takes `FOR UPDATE`; otherwise `FOR SHARE`, which still blocks a concurrent
    /// permissions update.
    async fn lock_permissions(
        tx: &mut Transaction<'_, Postgres>,
        operation: &'static str,
        id: Uuid,
        exclusive: bool,
    ) -> Result<Option<PermissionSet>, AppError> {
        let query = if exclusive {
            "SELECT permissions FROM groups WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT permissions FROM groups WHERE id = $1 FOR SHARE"
        };

        let permissions: Option<i64> = sqlx::query_scalar(query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .store_context(operation, id)?;

        Ok(permissions.map(PermissionSet::from_db))
    }
}

/// `%fragment%` with LIKE metacharacters escaped.
fn contains_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl MembershipStore for GroupRepository {
    #[tracing::instrument(skip(self, group), fields(name = %group.name))]
    async fn create_group(&self, group: NewGroup) -> Result<Group, AppError> {
        group.validate()?;

        let created: Group = sqlx::query_as::<Postgres, Group>(
            r#"
            INSERT INTO groups (id, name, permissions)
            VALUES ($1, $2, $3)
            RETURNING id, name, permissions, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&group.name)
        .bind(group.permissions.to_db())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::InvalidInput(format!("Group {} already exists", group.name))
            } else {
                AppError::store_failure("create_group", &group.name, e)
            }
        })?;

        tracing::info!(
            group_id = %created.id,
            permissions = created.permissions.bits(),
            "Group created"
        );

        Ok(created)
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_group(
        &self,
        id: Uuid,
        update: GroupUpdate,
        scope: GroupScope,
    ) -> Result<Group, AppError> {
        update.validate()?;
        scope.check(update.permissions)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .store_context("update_group", id)?;

        let current = Self::lock_permissions(&mut tx, "update_group", id, true)
            .await?
            .ok_or_else(|| AppError::not_found("Group", id))?;
        scope.check(current)?;

        let group: Group = sqlx::query_as::<Postgres, Group>(
            r#"
            UPDATE groups
            SET name = $2,
                permissions = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, permissions, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(update.permissions.to_db())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::InvalidInput(format!("Group {} already exists", update.name))
            } else {
                AppError::store_failure("update_group", id, e)
            }
        })?;

        tx.commit().await.store_context("update_group", id)?;

        tracing::info!(
            group_id = %id,
            permissions = group.permissions.bits(),
            "Group updated"
        );

        Ok(group)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_group(&self, id: Uuid, scope: GroupScope) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .store_context("delete_group", id)?;

        let current = Self::lock_permissions(&mut tx, "delete_group", id, true)
            .await?
            .ok_or_else(|| AppError::not_found("Group", id))?;
        scope.check(current)?;

        let memberships = sqlx::query("DELETE FROM users_to_groups WHERE group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_context("delete_group_memberships", id)?
            .rows_affected();

        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_context("delete_group", id)?;

        tx.commit().await.store_context("delete_group", id)?;

        tracing::info!(group_id = %id, memberships = memberships, "Group deleted");

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, AppError> {
        sqlx::query_as::<Postgres, Group>(
            r#"
            SELECT id, name, permissions, created_at, updated_at
            FROM groups
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .store_context("get_group", id)
    }

    #[tracing::instrument(skip(self))]
    async fn search_groups_by_name(&self, fragment: &str) -> Result<Vec<Group>, AppError> {
        sqlx::query_as::<Postgres, Group>(
            r#"
            SELECT id, name, permissions, created_at, updated_at
            FROM groups
            WHERE name ILIKE $1
            ORDER BY name
            "#,
        )
        .bind(contains_pattern(fragment))
        .fetch_all(&self.pool)
        .await
        .store_context("search_groups_by_name", fragment)
    }

    #[tracing::instrument(skip(self))]
    async fn get_groups_by_permissions(
        &self,
        mask: PermissionSet,
    ) -> Result<Vec<Group>, AppError> {
        // <> 0 rather than > 0: bit 63 makes the column negative.
        sqlx::query_as::<Postgres, Group>(
            r#"
            SELECT id, name, permissions, created_at, updated_at
            FROM groups
            WHERE permissions & $1 <> 0
            ORDER BY name
            "#,
        )
        .bind(mask.to_db())
        .fetch_all(&self.pool)
        .await
        .store_context("get_groups_by_permissions", mask.bits())
    }

    #[tracing::instrument(skip(self))]
    async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        sqlx::query_as::<Postgres, Group>(
            r#"
            SELECT id, name, permissions, created_at, updated_at
            FROM groups
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .store_context("list_groups", "groups")
    }

    #[tracing::instrument(skip(self))]
    async fn add_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        scope: GroupScope,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .store_context("add_member", group_id)?;

        let permissions = Self::lock_permissions(&mut tx, "add_member", group_id, false)
            .await?
            .ok_or_else(|| AppError::not_found("Group", group_id))?;
        scope.check(permissions)?;

        let result = sqlx::query(
            r#"
            INSERT INTO users_to_groups (user_id, group_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::not_found("User", user_id)
            } else {
                AppError::store_failure("add_member", group_id, e)
            }
        })?;

        tx.commit().await.store_context("add_member", group_id)?;

        if result.rows_affected() > 0 {
            tracing::info!(group_id = %group_id, user_id = %user_id, "Member added");
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        scope: GroupScope,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .store_context("remove_member", group_id)?;

        if let Some(permissions) =
            Self::lock_permissions(&mut tx, "remove_member", group_id, false).await?
        {
            scope.check(permissions)?;
        }

        let result = sqlx::query("DELETE FROM users_to_groups WHERE user_id = $1 AND group_id = $2")
            .bind(user_id)
            .bind(group_id)
            .execute(&mut *tx)
            .await
            .store_context("remove_member", group_id)?;

        tx.commit().await.store_context("remove_member", group_id)?;

        if result.rows_affected() > 0 {
            tracing::info!(group_id = %group_id, user_id = %user_id, "Member removed");
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn groups_of_user(&self, user_id: Uuid) -> Result<Vec<Group>, AppError> {
        sqlx::query_as::<Postgres, Group>(
            r#"
            SELECT g.id, g.name, g.permissions, g.created_at, g.updated_at
            FROM groups g
            JOIN users_to_groups ug ON ug.group_id = g.id
            WHERE ug.user_id = $1
            ORDER BY g.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .store_context("groups_of_user", user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("vol"), "%vol%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern(""), "%%");
    }
}
