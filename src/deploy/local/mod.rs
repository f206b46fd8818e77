//! SQLite-backed stand-ins for the remote backends, for offline runs and tests.

pub mod catalog;
pub mod storage;

use std::str::FromStr as _;

use tracing::error;

pub(crate) async fn open_pool(url: &str, ddl: &str) -> Result<sqlx::SqlitePool, sqlx::Error> {
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(url)
        .inspect_err(|error| error!(%error, %url, "Failed to parse local db url"))?
        .create_if_missing(true);
    let pool = sqlx::pool::PoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .inspect_err(|error| error!(%error, %url, "Failed to open local db"))?;
    sqlx::query(ddl)
        .execute(&pool)
        .await
        .inspect_err(|error| error!(%error, %url, "Failed to execute DDL to local db"))?;
    Ok(pool)
}
