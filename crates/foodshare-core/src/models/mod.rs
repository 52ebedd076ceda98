//! Data models shared by the store, services and worker crates.

mod file;
mod group;
mod permission;
mod user;

pub use file::*;
pub use group::*;
pub use permission::*;
pub use user::*;
