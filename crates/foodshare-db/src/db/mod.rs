//! Postgres repositories

pub mod file;
pub mod group;
pub mod user;

pub use file::{FileRepository, FILE_UPLOADED_CHANNEL};
pub use group::GroupRepository;
pub use user::UserRepository;

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
