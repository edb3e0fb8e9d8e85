//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `userbase_core` linkage.
//! - Optionally exercise logging and storage bootstrap from the environment.
//!
//! # Environment
//! - `USERBASE_LOG_DIR`: absolute directory; enables file logging when set.
//! - `USERBASE_LOG_LEVEL`: log level, defaults to the build-mode default.
//! - `USERBASE_DB_PATH`: SQLite file; when set, lists the first users.

use log::info;
use std::process::ExitCode;
use userbase_core::db::open_db;
use userbase_core::{SqliteUserRepository, UserService, UserUsecase};

fn main() -> ExitCode {
    println!("userbase_core ping={}", userbase_core::ping());
    println!("userbase_core version={}", userbase_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("userbase_cli error={message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    if let Ok(log_dir) = std::env::var("USERBASE_LOG_DIR") {
        let level = std::env::var("USERBASE_LOG_LEVEL")
            .unwrap_or_else(|_| userbase_core::default_log_level().to_string());
        userbase_core::init_logging(&level, &log_dir)?;
    }

    let Ok(db_path) = std::env::var("USERBASE_DB_PATH") else {
        return Ok(());
    };

    let conn = open_db(&db_path).map_err(|err| err.to_string())?;
    let repo = SqliteUserRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let users = UserService::new(repo)
        .fetch(0)
        .map_err(|err| err.to_string())?;

    info!(
        "event=cli_smoke module=cli status=ok user_count={}",
        users.len()
    );
    println!("users count={}", users.len());
    for user in &users {
        println!("user id={} name={} created_at={}", user.id, user.name, user.created_at);
    }
    Ok(())
}
