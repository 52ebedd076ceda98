use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::permission::{Capability, PermissionSet};

/// Named bundle of capabilities. Users gain the union of every group they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Group {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Group {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            permissions: PermissionSet::from_db(row.try_get::<i64, _>("permissions")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Group {
    pub fn grants(&self, capability: Capability) -> bool {
        self.permissions.has(capability)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewGroup {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub permissions: PermissionSet,
}

/// Full replacement of a group's mutable fields.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GroupUpdate {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub permissions: PermissionSet,
}

/// One `(user, group)` membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Membership {
    pub user_id: Uuid,
    pub group_id: Uuid,
}
