//! User domain model.
//!
//! # Responsibility
//! - Define the canonical user record exchanged between service and storage.
//! - Validate required fields before any storage call.
//!
//! # Invariants
//! - `id == 0` means the record has not been persisted yet.
//! - `id` is assigned by storage and never changes afterwards.
//! - `created_at` is set once on creation; `updated_at` moves forward on
//!   every successful update.
//! - `deleted_at` is carried through storage but never interpreted.
//!
//! # See also
//! - docs/architecture/data-model.md

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Storage-assigned user identifier. `0` is the unpersisted sentinel.
pub type UserId = i64;

/// Canonical user record.
///
/// Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Stored as given. Callers targeting real deployments should hash it
    /// before it reaches the repository.
    pub password: String,
    pub updated_at: i64,
    pub created_at: i64,
    /// Present in the schema, not read by any operation.
    pub deleted_at: Option<i64>,
}

/// Validation failures for user records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    EmptyName,
    EmptyEmail,
    EmptyPassword,
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "user name is required"),
            Self::EmptyEmail => write!(f, "user email is required"),
            Self::EmptyPassword => write!(f, "user password is required"),
        }
    }
}

impl Error for UserValidationError {}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}

impl User {
    /// Creates an unpersisted user.
    ///
    /// Timestamps stay zero until storage stamps them.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Returns whether storage has assigned an identifier to this record.
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Checks that required fields carry a non-blank value.
    ///
    /// Field contents are otherwise opaque; email is not shape-checked.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        if self.name.trim().is_empty() {
            return Err(UserValidationError::EmptyName);
        }
        if self.email.trim().is_empty() {
            return Err(UserValidationError::EmptyEmail);
        }
        if self.password.trim().is_empty() {
            return Err(UserValidationError::EmptyPassword);
        }
        Ok(())
    }
}
