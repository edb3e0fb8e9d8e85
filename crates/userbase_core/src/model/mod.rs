//! Domain model shared by service and repository layers.
//!
//! # Responsibility
//! - Define the user record and its field-level validation.
//!
//! # Invariants
//! - Deletion is a hard delete; `deleted_at` is never interpreted.

pub mod user;
