//! Test helpers for crates that depend on the store traits
//!
//! Enabled for this crate's own tests and, for downstream crates, with the
//! `test-helpers` feature.

mod memory;

pub use memory::InMemoryStore;
