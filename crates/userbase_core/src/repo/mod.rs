//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the data access contract the service layer depends on.
//! - Isolate SQLite query details from business orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateName`,
//!   `UnexpectedRowCount`) in addition to DB transport errors.

pub mod user_repo;
