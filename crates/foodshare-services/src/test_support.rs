use std::sync::Arc;
use uuid::Uuid;

use foodshare_core::models::{Group, NewGroup, NewUser, PermissionSet, User};
use foodshare_db::test_helpers::InMemoryStore;
use foodshare_db::{GroupScope, MembershipStore, UserDirectory};

use crate::AuthorizationChecker;

pub(crate) struct Fixture {
    pub store: InMemoryStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: InMemoryStore::new(),
        }
    }

    pub fn authz(&self) -> AuthorizationChecker {
        AuthorizationChecker::new(Arc::new(self.store.clone()), Arc::new(self.store.clone()))
    }

    pub async fn user(&self, email: &str) -> User {
        self.store
            .create_user(NewUser {
                surname: "Kuznetsova".to_string(),
                name: "Olga".to_string(),
                patronymic: None,
                date_of_birth: None,
                phone_number: None,
                email: email.to_string(),
                city_id: None,
            })
            .await
            .unwrap()
    }

    pub async fn group(&self, name: &str, permissions: PermissionSet) -> Group {
        self.store
            .create_group(NewGroup {
                name: name.to_string(),
                permissions,
            })
            .await
            .unwrap()
    }

    pub async fn join(&self, group_id: Uuid, user_id: Uuid) {
        self.store
            .add_member(group_id, user_id, GroupScope::Any)
            .await
            .unwrap();
    }

    /// A user whose only group is `name` with `permissions`.
    pub async fn user_with(&self, name: &str, permissions: PermissionSet) -> Uuid {
        let user = self.user(&format!("{}@example.org", name.to_lowercase())).await;
        let group = self.group(name, permissions).await;
        self.join(group.id, user.id).await;
        user.id
    }

    pub async fn admin(&self) -> Uuid {
        self.user_with("Administrators", PermissionSet::ADMIN).await
    }
}
