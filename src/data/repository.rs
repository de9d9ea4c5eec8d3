use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppError;

/// A persisted dashboard snapshot, stored as the JSON it was received in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardRow {
    pub data_version: String,
    pub payload: String,
    pub stored_at: String,
}

pub fn get_dashboard(conn: &Connection, account: &str) -> Result<Option<DashboardRow>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT data_version, payload, stored_at
         FROM dashboard_cache WHERE account = ?1",
    )?;

    let row = stmt
        .query_row(params![account], |row| {
            Ok(DashboardRow {
                data_version: row.get(0)?,
                payload: row.get(1)?,
                stored_at: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub fn put_dashboard(
    conn: &Connection,
    account: &str,
    data_version: &str,
    payload: &str,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT OR REPLACE INTO dashboard_cache (account, data_version, payload, stored_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            account,
            data_version,
            payload,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

pub fn delete_dashboard(conn: &Connection, account: &str) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM dashboard_cache WHERE account = ?1",
        params![account],
    )?;
    Ok(count)
}
