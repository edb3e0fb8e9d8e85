//! User repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the CRUD contract the user service is written against.
//! - Keep SQL text and row mapping inside the persistence boundary.
//! - Classify driver failures into not-found / conflict / storage errors.
//!
//! # Invariants
//! - All reads go through `fetch_users`, so row mapping exists once.
//! - Writes succeed only when exactly one row is affected.
//! - `users.name` uniqueness violations surface as `DuplicateName`.
//! - Write paths call `User::validate()` before SQL mutations; read paths
//!   do not, so externally written rows stay readable.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::user::{now_epoch_ms, User, UserId, UserValidationError};
use rusqlite::{params, Connection, Params, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const USER_SELECT_SQL: &str = "SELECT
    id,
    name,
    email,
    password,
    updated_at,
    created_at,
    deleted_at
FROM users";

const USER_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "email",
    "password",
    "updated_at",
    "created_at",
    "deleted_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Key used by a lookup that matched no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Id(UserId),
    Name(String),
}

impl Display for UserLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Name(name) => write!(f, "name=`{name}`"),
        }
    }
}

/// Coarse error taxonomy for delivery layers mapping failures outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Storage,
    Validation,
}

/// Errors shared by the user repository and the user service.
#[derive(Debug)]
pub enum RepoError {
    /// Required user fields are missing or malformed.
    Validation(UserValidationError),
    /// Fetch was called with a negative limit.
    InvalidLimit(i64),
    /// Store was called with a record that already carries an id.
    IdAlreadyAssigned(UserId),
    /// Lookup matched zero rows.
    NotFound(UserLookup),
    /// Another user already owns this name.
    DuplicateName(String),
    /// Write touched a row count other than one.
    UnexpectedRowCount {
        operation: &'static str,
        id: UserId,
        affected: usize,
    },
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Persisted row cannot be converted into a valid `User`.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Maps this error onto the not-found / conflict / storage / validation
    /// taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidLimit(_) | Self::IdAlreadyAssigned(_) => {
                ErrorKind::Validation
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateName(_) | Self::UnexpectedRowCount { .. } => ErrorKind::Conflict,
            Self::Db(_)
            | Self::InvalidData(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. } => ErrorKind::Storage,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidLimit(limit) => {
                write!(f, "fetch limit must not be negative, got {limit}")
            }
            Self::IdAlreadyAssigned(id) => write!(f, "user already has id {id}"),
            Self::NotFound(lookup) => write!(f, "user not found: {lookup}"),
            Self::DuplicateName(name) => write!(f, "user name already exists: `{name}`"),
            Self::UnexpectedRowCount {
                operation,
                id,
                affected,
            } => write!(
                f,
                "user {operation} for id {id} affected {affected} rows, expected 1"
            ),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "user repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "user repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "user repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<UserValidationError> for RepoError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository contract for user persistence.
pub trait UserRepository {
    /// Returns up to `limit` users ordered by creation time ascending.
    fn fetch(&self, limit: i64) -> RepoResult<Vec<User>>;
    /// Inserts a new user and writes the assigned id back into `user`.
    fn store(&self, user: &mut User) -> RepoResult<()>;
    /// Persists `name`, `email` and `updated_at` for `user.id`.
    fn update(&self, user: &User) -> RepoResult<()>;
    /// Removes the row for `id`.
    fn delete(&self, id: UserId) -> RepoResult<()>;
    fn get_by_id(&self, id: UserId) -> RepoResult<User>;
    fn get_by_name(&self, name: &str) -> RepoResult<User>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when `PRAGMA user_version` does not match.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` for drifted schemas.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_user_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn fetch_users<P: Params>(&self, sql: &str, params: P) -> RepoResult<Vec<User>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params)?;
        let mut users = Vec::new();

        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }

        Ok(users)
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn fetch(&self, limit: i64) -> RepoResult<Vec<User>> {
        if limit < 0 {
            return Err(RepoError::InvalidLimit(limit));
        }

        self.fetch_users(
            &format!("{USER_SELECT_SQL} ORDER BY created_at ASC, id ASC LIMIT ?1;"),
            [limit],
        )
    }

    fn store(&self, user: &mut User) -> RepoResult<()> {
        user.validate()?;
        if user.is_persisted() {
            return Err(RepoError::IdAlreadyAssigned(user.id));
        }

        let created_at = if user.created_at == 0 {
            now_epoch_ms()
        } else {
            user.created_at
        };

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO users (
                name,
                email,
                password,
                updated_at,
                created_at,
                deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        )?;
        let changed = stmt
            .execute(params![
                user.name.as_str(),
                user.email.as_str(),
                user.password.as_str(),
                created_at,
                created_at,
                user.deleted_at,
            ])
            .map_err(|err| classify_write_error(err, &user.name))?;
        expect_single_row("store", 0, changed)?;

        user.id = self.conn.last_insert_rowid();
        user.created_at = created_at;
        user.updated_at = created_at;
        Ok(())
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        user.validate()?;

        let mut stmt = self.conn.prepare_cached(
            "UPDATE users
             SET
                name = ?1,
                email = ?2,
                updated_at = ?3
             WHERE id = ?4;",
        )?;
        let changed = stmt
            .execute(params![
                user.name.as_str(),
                user.email.as_str(),
                user.updated_at,
                user.id,
            ])
            .map_err(|err| classify_write_error(err, &user.name))?;

        expect_single_row("update", user.id, changed)
    }

    fn delete(&self, id: UserId) -> RepoResult<()> {
        let mut stmt = self.conn.prepare_cached("DELETE FROM users WHERE id = ?1;")?;
        let changed = stmt.execute([id])?;

        expect_single_row("delete", id, changed)
    }

    fn get_by_id(&self, id: UserId) -> RepoResult<User> {
        self.fetch_users(&format!("{USER_SELECT_SQL} WHERE id = ?1 LIMIT 1;"), [id])?
            .into_iter()
            .next()
            .ok_or(RepoError::NotFound(UserLookup::Id(id)))
    }

    fn get_by_name(&self, name: &str) -> RepoResult<User> {
        self.fetch_users(
            &format!("{USER_SELECT_SQL} WHERE name = ?1 LIMIT 1;"),
            [name],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| RepoError::NotFound(UserLookup::Name(name.to_string())))
    }
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let user = User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        password: row.get("password")?,
        updated_at: row.get("updated_at")?,
        created_at: row.get("created_at")?,
        deleted_at: row.get("deleted_at")?,
    };

    // Rows written outside this crate are mapped as-is; only the id sentinel
    // would make a row indistinguishable from an unpersisted record.
    if !user.is_persisted() {
        return Err(RepoError::InvalidData(
            "users.id must be non-zero".to_string(),
        ));
    }

    Ok(user)
}

fn classify_write_error(err: rusqlite::Error, name: &str) -> RepoError {
    // `name` is the only UNIQUE column besides the primary key.
    let unique_violation = matches!(
        &err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    );
    if unique_violation {
        return RepoError::DuplicateName(name.to_string());
    }
    err.into()
}

fn expect_single_row(operation: &'static str, id: UserId, affected: usize) -> RepoResult<()> {
    if affected != 1 {
        return Err(RepoError::UnexpectedRowCount {
            operation,
            id,
            affected,
        });
    }
    Ok(())
}

fn ensure_user_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "users")? {
        return Err(RepoError::MissingRequiredTable("users"));
    }

    for column in USER_COLUMNS {
        if !table_has_column(conn, "users", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "users",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
