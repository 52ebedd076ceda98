//! Foodshare Services
//!
//! Capability checks and the guarded operations built on them: group administration
//! and the client side of the upload lifecycle.

pub mod authorization;
pub mod groups;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use authorization::AuthorizationChecker;
pub use groups::GroupService;
pub use upload::UploadService;
