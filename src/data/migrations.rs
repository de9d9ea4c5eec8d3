use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS dashboard_cache (
    account TEXT PRIMARY KEY NOT NULL,
    data_version TEXT NOT NULL,
    payload TEXT NOT NULL,
    stored_at TEXT DEFAULT CURRENT_TIMESTAMP
);
";

pub fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch(SCHEMA_V1)?;
    Ok(())
}
