pub mod meals;
pub mod models;
pub mod runs;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

fn connect_options(url: &str, create: bool) -> Result<SqliteConnectOptions> {
    Ok(SqliteConnectOptions::from_str(url)?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5)))
}

fn is_in_memory(filename: &Path) -> bool {
    filename.as_os_str().is_empty() || filename == Path::new(":memory:")
}

/// Initialize database connection pool, creating the database file if needed
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let options = connect_options(&config.url, true)?;

    // Create data directory if it doesn't exist
    if !is_in_memory(options.get_filename()) {
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Open the index for writing: create it if missing and bring the schema up to date
pub async fn open_index(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = init_pool(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Open an index that a build has already created. Never creates files.
pub async fn open_existing(config: &DatabaseConfig) -> Result<DbPool> {
    let options = connect_options(&config.url, false)?;

    let filename = options.get_filename();
    if !is_in_memory(filename) && !filename.exists() {
        return Err(Error::IndexNotBuilt(format!(
            "no index database at {}",
            filename.display()
        )));
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Map "no such table" failures on read paths to [`Error::IndexNotBuilt`]
pub(crate) fn read_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.message().contains("no such table") => {
            Error::IndexNotBuilt(db.message().to_string())
        }
        _ => Error::Database(err),
    }
}

#[cfg(test)]
pub(crate) async fn test_pool(dir: &Path) -> DbPool {
    let config = DatabaseConfig {
        url: format!("sqlite:{}", dir.join("meals.db").display()),
        max_connections: 5,
        connection_timeout_seconds: 30,
    };
    open_index(&config).await.unwrap()
}
