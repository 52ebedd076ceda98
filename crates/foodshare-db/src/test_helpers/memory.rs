//! In-memory store implementing every store trait.
//!
//! All state sits behind one mutex, so each trait call is a single critical section and
//! `claim_next` has the same single-claimant guarantee as the Postgres statement.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use foodshare_core::models::{
    ClientUploadOutcome, FileClaim, FileEvent, FileRecord, FileStatus, Group, GroupUpdate,
    Membership, NewFile, NewGroup, NewUser, PermissionSet, TransferOutcome, User,
};
use foodshare_core::AppError;

use crate::store::{FileStore, GroupScope, MembershipStore, UploadClaimQueue, UserDirectory};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    memberships: BTreeSet<(Uuid, Uuid)>,
    files: HashMap<Uuid, FileRecord>,
}

/// Mock store for tests without a database
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    /// Every call fails with `StoreFailure` while set.
    fail_all: Arc<Mutex<bool>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a file record as-is, bypassing the transition rules.
    pub fn put_file(&self, file: FileRecord) {
        self.state.lock().unwrap().files.insert(file.id, file);
    }

    pub fn file(&self, id: Uuid) -> Option<FileRecord> {
        self.state.lock().unwrap().files.get(&id).cloned()
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.state.lock().unwrap().files.values().cloned().collect()
    }

    pub fn memberships(&self) -> Vec<Membership> {
        self.state
            .lock()
            .unwrap()
            .memberships
            .iter()
            .map(|&(user_id, group_id)| Membership { user_id, group_id })
            .collect()
    }

    /// Moves a claim's `claimed_at` into the past.
    pub fn age_claim(&self, file_id: Uuid, by: Duration) {
        let mut state = self.state.lock().unwrap();
        if let Some(file) = state.files.get_mut(&file_id) {
            if let Some(claimed_at) = file.claimed_at {
                file.claimed_at = Some(claimed_at - chrono::Duration::from_std(by).unwrap());
            }
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail_all.lock().unwrap() = failing;
    }

    fn check(&self, operation: &'static str) -> Result<(), AppError> {
        if *self.fail_all.lock().unwrap() {
            return Err(AppError::store_failure(
                operation,
                "memory",
                anyhow::anyhow!("injected store failure"),
            ));
        }
        Ok(())
    }
}

fn sorted_groups<'a>(groups: impl Iterator<Item = &'a Group>) -> Vec<Group> {
    let mut out: Vec<Group> = groups.cloned().collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

fn rejected(state: &State, file_id: Uuid, event: FileEvent) -> AppError {
    match state.files.get(&file_id) {
        None => AppError::not_found("File", file_id),
        Some(file) => AppError::InvalidTransition {
            file_id,
            from: file.status,
            event,
        },
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        self.check("create_user")?;
        user.validate()?;

        let mut state = self.state.lock().unwrap();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::InvalidInput(format!(
                "Email {} is already registered",
                user.email
            )));
        }

        let created = User {
            id: Uuid::new_v4(),
            surname: user.surname,
            name: user.name,
            patronymic: user.patronymic,
            date_of_birth: user.date_of_birth,
            phone_number: user.phone_number,
            email: user.email,
            city_id: user.city_id,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        self.check("get_user")?;
        Ok(self.state.lock().unwrap().users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.check("get_user_by_email")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn create_group(&self, group: NewGroup) -> Result<Group, AppError> {
        self.check("create_group")?;
        group.validate()?;

        let mut state = self.state.lock().unwrap();
        if state.groups.values().any(|g| g.name == group.name) {
            return Err(AppError::InvalidInput(format!(
                "Group {} already exists",
                group.name
            )));
        }

        let created = Group {
            id: Uuid::new_v4(),
            name: group.name,
            permissions: group.permissions,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.groups.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_group(
        &self,
        id: Uuid,
        update: GroupUpdate,
        scope: GroupScope,
    ) -> Result<Group, AppError> {
        self.check("update_group")?;
        update.validate()?;
        scope.check(update.permissions)?;

        let mut state = self.state.lock().unwrap();
        if state
            .groups
            .values()
            .any(|g| g.id != id && g.name == update.name)
        {
            return Err(AppError::InvalidInput(format!(
                "Group {} already exists",
                update.name
            )));
        }

        let group = state
            .groups
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Group", id))?;
        scope.check(group.permissions)?;
        group.name = update.name;
        group.permissions = update.permissions;
        group.updated_at = Some(Utc::now());
        Ok(group.clone())
    }

    async fn delete_group(&self, id: Uuid, scope: GroupScope) -> Result<(), AppError> {
        self.check("delete_group")?;

        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get(&id)
            .ok_or_else(|| AppError::not_found("Group", id))?;
        scope.check(group.permissions)?;

        state.groups.remove(&id);
        state.memberships.retain(|&(_, group_id)| group_id != id);
        Ok(())
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, AppError> {
        self.check("get_group")?;
        Ok(self.state.lock().unwrap().groups.get(&id).cloned())
    }

    async fn search_groups_by_name(&self, fragment: &str) -> Result<Vec<Group>, AppError> {
        self.check("search_groups_by_name")?;
        let needle = fragment.to_lowercase();
        let state = self.state.lock().unwrap();
        Ok(sorted_groups(
            state
                .groups
                .values()
                .filter(|g| g.name.to_lowercase().contains(&needle)),
        ))
    }

    async fn get_groups_by_permissions(
        &self,
        mask: PermissionSet,
    ) -> Result<Vec<Group>, AppError> {
        self.check("get_groups_by_permissions")?;
        let state = self.state.lock().unwrap();
        Ok(sorted_groups(
            state
                .groups
                .values()
                .filter(|g| g.permissions.intersects(mask)),
        ))
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        self.check("list_groups")?;
        let state = self.state.lock().unwrap();
        Ok(sorted_groups(state.groups.values()))
    }

    async fn add_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        scope: GroupScope,
    ) -> Result<(), AppError> {
        self.check("add_member")?;

        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get(&group_id)
            .ok_or_else(|| AppError::not_found("Group", group_id))?;
        scope.check(group.permissions)?;
        if !state.users.contains_key(&user_id) {
            return Err(AppError::not_found("User", user_id));
        }
        state.memberships.insert((user_id, group_id));
        Ok(())
    }

    async fn remove_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        scope: GroupScope,
    ) -> Result<(), AppError> {
        self.check("remove_member")?;

        let mut state = self.state.lock().unwrap();
        if let Some(group) = state.groups.get(&group_id) {
            scope.check(group.permissions)?;
        }
        state.memberships.remove(&(user_id, group_id));
        Ok(())
    }

    async fn groups_of_user(&self, user_id: Uuid) -> Result<Vec<Group>, AppError> {
        self.check("groups_of_user")?;
        let state = self.state.lock().unwrap();
        Ok(sorted_groups(
            state
                .memberships
                .iter()
                .filter(|(u, _)| *u == user_id)
                .filter_map(|(_, g)| state.groups.get(g)),
        ))
    }
}

#[async_trait]
impl FileStore for InMemoryStore {
    async fn create_file(&self, user_id: Uuid, file: NewFile) -> Result<FileRecord, AppError> {
        self.check("create_file")?;
        file.validate()?;

        let mut state = self.state.lock().unwrap();
        if !state.users.contains_key(&user_id) {
            return Err(AppError::not_found("User", user_id));
        }

        let created = FileRecord {
            id: Uuid::new_v4(),
            user_id,
            file_type: file.file_type,
            content_type: file.content_type,
            name: file.name,
            size: file.size,
            status: FileStatus::ClientUploadInProgress,
            url: None,
            lease_token: None,
            claimed_at: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.files.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        self.check("get_file")?;
        Ok(self.file(id))
    }

    async fn record_client_result(
        &self,
        id: Uuid,
        outcome: ClientUploadOutcome,
    ) -> Result<FileRecord, AppError> {
        self.check("record_client_result")?;
        let event = outcome.event();

        let mut state = self.state.lock().unwrap();
        let next = match state.files.get(&id) {
            Some(file) if file.status == FileStatus::ClientUploadInProgress => {
                file.next_status(event)?
            }
            _ => return Err(rejected(&state, id, event)),
        };

        let file = state
            .files
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("File", id))?;
        file.status = next;
        file.updated_at = Some(Utc::now());
        Ok(file.clone())
    }
}

#[async_trait]
impl UploadClaimQueue for InMemoryStore {
    async fn claim_next(&self) -> Result<Option<FileClaim>, AppError> {
        self.check("claim_next")?;

        let mut state = self.state.lock().unwrap();
        let next = state
            .files
            .values()
            .filter(|f| f.status == FileStatus::UploadedByClient)
            .min_by_key(|f| (f.created_at, f.id))
            .map(|f| f.id);

        let Some(id) = next else {
            return Ok(None);
        };

        let lease_token = Uuid::new_v4();
        let now = Utc::now();
        let file = state
            .files
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("File", id))?;
        file.status = file.next_status(FileEvent::Claimed)?;
        file.lease_token = Some(lease_token);
        file.claimed_at = Some(now);
        file.updated_at = Some(now);

        Ok(Some(FileClaim {
            file: file.clone(),
            lease_token,
        }))
    }

    async fn finalize(
        &self,
        file_id: Uuid,
        lease_token: Uuid,
        outcome: TransferOutcome,
    ) -> Result<FileRecord, AppError> {
        self.check("finalize")?;
        let event = outcome.event();

        let mut state = self.state.lock().unwrap();
        let holds_claim = state.files.get(&file_id).is_some_and(|f| {
            f.status == FileStatus::StorageUploadInProgress && f.lease_token == Some(lease_token)
        });
        if !holds_claim {
            return Err(rejected(&state, file_id, event));
        }

        let file = state
            .files
            .get_mut(&file_id)
            .ok_or_else(|| AppError::not_found("File", file_id))?;
        file.status = file.next_status(event)?;
        file.url = outcome.url().map(str::to_string);
        file.lease_token = None;
        file.updated_at = Some(Utc::now());
        Ok(file.clone())
    }

    async fn reclaim_expired(&self, lease: Duration) -> Result<u64, AppError> {
        self.check("reclaim_expired")?;

        let cutoff = Utc::now()
            - chrono::Duration::from_std(lease)
                .map_err(|e| AppError::InvalidInput(format!("Lease out of range: {}", e)))?;

        let mut state = self.state.lock().unwrap();
        let mut reclaimed = 0;
        for file in state.files.values_mut() {
            let expired = file.status == FileStatus::StorageUploadInProgress
                && file.claimed_at.is_some_and(|at| at < cutoff);
            if expired {
                file.status = file.next_status(FileEvent::LeaseExpired)?;
                file.lease_token = None;
                file.claimed_at = None;
                file.updated_at = Some(Utc::now());
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn requeue_failed(&self, file_id: Uuid) -> Result<FileRecord, AppError> {
        self.check("requeue_failed")?;

        let mut state = self.state.lock().unwrap();
        let eligible = state
            .files
            .get(&file_id)
            .is_some_and(|f| f.status == FileStatus::StorageUploadError);
        if !eligible {
            return Err(rejected(&state, file_id, FileEvent::Requeued));
        }

        let file = state
            .files
            .get_mut(&file_id)
            .ok_or_else(|| AppError::not_found("File", file_id))?;
        file.status = file.next_status(FileEvent::Requeued)?;
        file.claimed_at = None;
        file.updated_at = Some(Utc::now());
        Ok(file.clone())
    }
}
