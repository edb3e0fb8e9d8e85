//! Core domain logic for the user store.
//! This crate is the single source of truth for user invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::user::{User, UserId, UserValidationError};
pub use repo::user_repo::{
    ErrorKind, RepoError, RepoResult, SqliteUserRepository, UserLookup, UserRepository,
};
pub use service::user_service::{UserService, UserUsecase, DEFAULT_FETCH_LIMIT};

/// Minimal health-check API for wiring checks.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
