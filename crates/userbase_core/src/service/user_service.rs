//! User use-case service.
//!
//! # Responsibility
//! - Apply business rules (default paging, name uniqueness, existence on
//!   delete, update stamping) on top of repository calls.
//! - Stay storage-agnostic: every persistence step goes through
//!   `UserRepository`.
//!
//! # Invariants
//! - `store` never reaches the repository write when the name is taken.
//! - `delete` never reaches the repository write for an unknown id.
//! - Repository errors are returned unchanged.
//!
//! The name and existence checks are check-then-act and not atomic with
//! the following write. The `users.name` unique constraint is the
//! authoritative guard; a concurrent delete surfaces as
//! `UnexpectedRowCount` from the repository.

use crate::model::user::{now_epoch_ms, User, UserId};
use crate::repo::user_repo::{RepoError, RepoResult, UserLookup, UserRepository};
use log::{log, Level};
use std::fmt::Display;

/// Limit applied when callers pass `0` to `fetch`.
pub const DEFAULT_FETCH_LIMIT: i64 = 10;

/// Use-case contract exposed to delivery layers.
///
/// Errors carry the repository taxonomy; map them with `RepoError::kind`.
pub trait UserUsecase {
    /// Lists users ordered by `created_at` ascending.
    ///
    /// `limit == 0` applies `DEFAULT_FETCH_LIMIT`; any other value is passed
    /// to the repository unchanged.
    fn fetch(&self, limit: i64) -> RepoResult<Vec<User>>;

    /// Creates a user after checking the name is free.
    ///
    /// # Contract
    /// - Invalid input fails with `Validation` before any repository call.
    /// - A persisted user with the same name yields `DuplicateName` and no
    ///   insert is attempted.
    /// - A lookup failure other than `NotFound` is returned and no insert is
    ///   attempted.
    /// - Repository write errors, including a late `DuplicateName` from the
    ///   unique constraint, are returned unchanged.
    /// - On success `user.id` carries the storage-assigned id.
    fn store(&self, user: &mut User) -> RepoResult<()>;

    /// Stamps `updated_at` and persists the change.
    ///
    /// # Contract
    /// - `updated_at` is strictly greater than its previous value, even when
    ///   the write fails.
    /// - There is no existence pre-check; a missing id comes back from the
    ///   repository as `UnexpectedRowCount` (Conflict).
    fn update(&self, user: &mut User) -> RepoResult<()>;

    /// Hard-deletes a user that is known to exist.
    ///
    /// # Contract
    /// - An unknown id yields `NotFound` and no delete is attempted.
    /// - Lookup errors are returned and no delete is attempted.
    /// - Delete errors after a successful lookup, such as
    ///   `UnexpectedRowCount` from a concurrent removal, are returned
    ///   unchanged.
    fn delete(&self, id: UserId) -> RepoResult<()>;

    /// Pure delegation to the repository.
    fn get_by_id(&self, id: UserId) -> RepoResult<User>;

    /// Pure delegation to the repository; names match case-sensitively.
    fn get_by_name(&self, name: &str) -> RepoResult<User>;
}

/// Use-case service over one exclusively owned repository.
pub struct UserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> UserService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }
}

impl<R: UserRepository> UserUsecase for UserService<R> {
    fn fetch(&self, limit: i64) -> RepoResult<Vec<User>> {
        let applied_limit = if limit == 0 {
            DEFAULT_FETCH_LIMIT
        } else {
            limit
        };

        let result = self.repo.fetch(applied_limit);
        log_outcome(
            Level::Debug,
            "user_fetch",
            format_args!("applied_limit={applied_limit}"),
            &result,
        );
        result
    }

    fn store(&self, user: &mut User) -> RepoResult<()> {
        let result = self.store_unique(user);
        log_outcome(
            Level::Info,
            "user_store",
            format_args!("user_id={}", user.id),
            &result,
        );
        result
    }

    fn update(&self, user: &mut User) -> RepoResult<()> {
        user.updated_at = next_updated_at(user.updated_at);

        let result = self.repo.update(user);
        log_outcome(
            Level::Info,
            "user_update",
            format_args!("user_id={}", user.id),
            &result,
        );
        result
    }

    fn delete(&self, id: UserId) -> RepoResult<()> {
        let result = self.delete_existing(id);
        log_outcome(
            Level::Info,
            "user_delete",
            format_args!("user_id={id}"),
            &result,
        );
        result
    }

    fn get_by_id(&self, id: UserId) -> RepoResult<User> {
        self.repo.get_by_id(id)
    }

    fn get_by_name(&self, name: &str) -> RepoResult<User> {
        self.repo.get_by_name(name)
    }
}

impl<R: UserRepository> UserService<R> {
    fn store_unique(&self, user: &mut User) -> RepoResult<()> {
        user.validate()?;

        match self.repo.get_by_name(&user.name) {
            Ok(existing) if existing.is_persisted() => {
                Err(RepoError::DuplicateName(user.name.clone()))
            }
            Ok(_) | Err(RepoError::NotFound(_)) => self.repo.store(user),
            Err(err) => Err(err),
        }
    }

    fn delete_existing(&self, id: UserId) -> RepoResult<()> {
        let existing = self.repo.get_by_id(id)?;
        if !existing.is_persisted() {
            return Err(RepoError::NotFound(UserLookup::Id(id)));
        }

        self.repo.delete(id)
    }
}

/// Returns the current time, forced strictly past `previous`.
fn next_updated_at(previous: i64) -> i64 {
    now_epoch_ms().max(previous.saturating_add(1))
}

fn log_outcome<T>(level: Level, event: &str, details: impl Display, result: &RepoResult<T>) {
    match result {
        Ok(_) => log!(level, "event={event} module=service status=ok {details}"),
        Err(err) => log!(
            Level::Warn,
            "event={event} module=service status=error {details} error_kind={:?} error={err}",
            err.kind()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{next_updated_at, UserService, UserUsecase, DEFAULT_FETCH_LIMIT};
    use crate::db::DbError;
    use crate::model::user::User;
    use crate::repo::user_repo::{ErrorKind, RepoError, RepoResult, UserLookup, UserRepository};
    use mockall::mock;

    mock! {
        Repo {}

        impl UserRepository for Repo {
            fn fetch(&self, limit: i64) -> RepoResult<Vec<User>>;
            fn store(&self, user: &mut User) -> RepoResult<()>;
            fn update(&self, user: &User) -> RepoResult<()>;
            fn delete(&self, id: i64) -> RepoResult<()>;
            fn get_by_id(&self, id: i64) -> RepoResult<User>;
            fn get_by_name(&self, name: &str) -> RepoResult<User>;
        }
    }

    fn john() -> User {
        User {
            id: 1234567890,
            created_at: 1_609_459_199_000,
            ..User::new("John Smith", "john.smith@somewhere.com", "secret_password")
        }
    }

    fn storage_failure() -> RepoError {
        RepoError::Db(DbError::Sqlite(rusqlite::Error::InvalidQuery))
    }

    #[test]
    fn fetch_zero_limit_uses_default() {
        let mut repo = MockRepo::new();
        repo.expect_fetch()
            .withf(|limit: &i64| *limit == DEFAULT_FETCH_LIMIT)
            .times(1)
            .returning(|_| Ok(vec![john()]));

        let service = UserService::new(repo);
        let users = service.fetch(0).unwrap();
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn fetch_positive_limit_is_passed_through() {
        let mut repo = MockRepo::new();
        repo.expect_fetch()
            .withf(|limit: &i64| *limit == 1)
            .times(1)
            .returning(|_| Ok(vec![john()]));

        let service = UserService::new(repo);
        assert_eq!(service.fetch(1).unwrap(), vec![john()]);
    }

    #[test]
    fn fetch_propagates_repository_error() {
        let mut repo = MockRepo::new();
        repo.expect_fetch()
            .times(1)
            .returning(|_| Err(storage_failure()));

        let service = UserService::new(repo);
        let err = service.fetch(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn store_new_name_assigns_id() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_name()
            .withf(|name: &str| name == "John Smith")
            .times(1)
            .returning(|name| Err(RepoError::NotFound(UserLookup::Name(name.to_string()))));
        repo.expect_store().times(1).returning(|user: &mut User| {
            user.id = 42;
            Ok(())
        });

        let service = UserService::new(repo);
        let mut user = User::new("John Smith", "john.smith@x.com", "secret");
        service.store(&mut user).unwrap();

        assert_eq!(user.id, 42);
        assert_eq!(user.name, "John Smith");
        assert_eq!(user.email, "john.smith@x.com");
        assert_eq!(user.password, "secret");
    }

    #[test]
    fn store_existing_name_conflicts_without_insert() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_name().times(1).returning(|_| Ok(john()));
        repo.expect_store().never();

        let service = UserService::new(repo);
        let mut user = User::new("John Smith", "other@x.com", "secret");
        let err = service.store(&mut user).unwrap_err();

        assert!(matches!(err, RepoError::DuplicateName(ref name) if name == "John Smith"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(user.id, 0);
    }

    #[test]
    fn store_passes_late_duplicate_name_through() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_name()
            .times(1)
            .returning(|name| Err(RepoError::NotFound(UserLookup::Name(name.to_string()))));
        repo.expect_store()
            .times(1)
            .returning(|user: &mut User| Err(RepoError::DuplicateName(user.name.clone())));

        let service = UserService::new(repo);
        let mut user = User::new("John Smith", "john.smith@x.com", "secret");
        let err = service.store(&mut user).unwrap_err();

        assert!(matches!(err, RepoError::DuplicateName(ref name) if name == "John Smith"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(user.id, 0);
    }

    #[test]
    fn store_treats_unpersisted_lookup_result_as_free_name() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_name()
            .times(1)
            .returning(|_| Ok(User::default()));
        repo.expect_store().times(1).returning(|user: &mut User| {
            user.id = 7;
            Ok(())
        });

        let service = UserService::new(repo);
        let mut user = User::new("John Smith", "john.smith@x.com", "secret");
        service.store(&mut user).unwrap();
        assert_eq!(user.id, 7);
    }

    #[test]
    fn store_propagates_lookup_storage_error() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_name()
            .times(1)
            .returning(|_| Err(storage_failure()));
        repo.expect_store().never();

        let service = UserService::new(repo);
        let mut user = User::new("John Smith", "john.smith@x.com", "secret");
        let err = service.store(&mut user).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn store_rejects_invalid_user_before_any_repository_call() {
        let repo = MockRepo::new();
        let service = UserService::new(repo);

        let mut user = User::new("John Smith", "", "secret");
        let err = service.store(&mut user).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn update_stamps_updated_at_before_delegating() {
        let mut repo = MockRepo::new();
        repo.expect_update()
            .withf(|user: &User| user.updated_at > 0)
            .times(1)
            .returning(|_| Ok(()));

        let service = UserService::new(repo);
        let mut user = john();
        let before = user.updated_at;
        service.update(&mut user).unwrap();

        assert_ne!(user.updated_at, before);
        assert_eq!(user.created_at, john().created_at);
    }

    #[test]
    fn update_passes_conflict_through() {
        let mut repo = MockRepo::new();
        repo.expect_update().times(1).returning(|user: &User| {
            Err(RepoError::UnexpectedRowCount {
                operation: "update",
                id: user.id,
                affected: 0,
            })
        });

        let service = UserService::new(repo);
        let mut user = john();
        user.id = 0;
        let err = service.update(&mut user).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn delete_existing_user_delegates() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_id()
            .withf(|id: &i64| *id == 1234567890)
            .times(1)
            .returning(|_| Ok(john()));
        repo.expect_delete()
            .withf(|id: &i64| *id == 1234567890)
            .times(1)
            .returning(|_| Ok(()));

        let service = UserService::new(repo);
        service.delete(1234567890).unwrap();
    }

    #[test]
    fn delete_passes_concurrent_removal_through() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_id().times(1).returning(|_| Ok(john()));
        repo.expect_delete().times(1).returning(|id| {
            Err(RepoError::UnexpectedRowCount {
                operation: "delete",
                id,
                affected: 0,
            })
        });

        let service = UserService::new(repo);
        let err = service.delete(1234567890).unwrap_err();

        assert!(matches!(
            err,
            RepoError::UnexpectedRowCount {
                operation: "delete",
                id: 1234567890,
                affected: 0,
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn delete_unknown_id_is_not_found_without_delete() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_id()
            .times(1)
            .returning(|id| Err(RepoError::NotFound(UserLookup::Id(id))));
        repo.expect_delete().never();

        let service = UserService::new(repo);
        let err = service.delete(1234567890).unwrap_err();
        assert!(matches!(err, RepoError::NotFound(UserLookup::Id(1234567890))));
    }

    #[test]
    fn delete_empty_lookup_result_is_not_found_without_delete() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_id()
            .times(1)
            .returning(|_| Ok(User::default()));
        repo.expect_delete().never();

        let service = UserService::new(repo);
        let err = service.delete(1234567890).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn delete_propagates_lookup_storage_error() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_id()
            .times(1)
            .returning(|_| Err(storage_failure()));
        repo.expect_delete().never();

        let service = UserService::new(repo);
        let err = service.delete(1234567890).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn lookups_delegate_to_repository() {
        let mut repo = MockRepo::new();
        repo.expect_get_by_id().times(1).returning(|_| Ok(john()));
        repo.expect_get_by_name()
            .times(1)
            .returning(|name| Err(RepoError::NotFound(UserLookup::Name(name.to_string()))));

        let service = UserService::new(repo);
        assert_eq!(service.get_by_id(1234567890).unwrap(), john());
        let err = service.get_by_name("nobody").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn next_updated_at_is_strictly_increasing() {
        let far_future = i64::MAX - 10;
        assert_eq!(next_updated_at(far_future), far_future + 1);
        assert!(next_updated_at(0) > 0);
        assert_eq!(next_updated_at(i64::MAX), i64::MAX);
    }
}
