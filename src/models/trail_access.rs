use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::AppResult;
use crate::models::program::Program;

#[derive(Debug, Serialize, Clone)]
pub struct TrailAccess {
    pub id: i64,
    pub user_id: i64,
    pub program: Program,
    pub trail_id: String,
    pub trail_number: i64,
    pub first_access: NaiveDateTime,
    pub last_access: NaiveDateTime,
    pub access_count: i64,
}

impl TrailAccess {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TrailAccess {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            program: row.get("program")?,
            trail_id: row.get("trail_id")?,
            trail_number: row.get("trail_number")?,
            first_access: row.get("first_access")?,
            last_access: row.get("last_access")?,
            access_count: row.get("access_count")?,
        })
    }

    /// Insert the first visit or bump the counter of an existing one.
    /// Program and trail number are fixed by the first visit.
    pub fn record(
        conn: &Connection,
        user_id: i64,
        program: Program,
        trail_id: &str,
        trail_number: i64,
    ) -> AppResult<Self> {
        let now = chrono::Utc::now().naive_utc();
        conn.execute(
            "INSERT INTO trail_accesses (user_id, program, trail_id, trail_number, first_access, last_access, access_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)
             ON CONFLICT(user_id, trail_id) DO UPDATE SET
                access_count = access_count + 1,
                last_access = excluded.last_access",
            params![user_id, program, trail_id, trail_number, now],
        )?;
        let access = conn.query_row(
            "SELECT * FROM trail_accesses WHERE user_id = ?1 AND trail_id = ?2",
            params![user_id, trail_id],
            Self::from_row,
        )?;
        Ok(access)
    }

    pub fn is_first_access(&self) -> bool {
        self.access_count == 1
    }

    /// Most recently visited first.
    pub fn recent_for_user(conn: &Connection, user_id: i64, limit: i64) -> AppResult<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM trail_accesses WHERE user_id = ?1
             ORDER BY last_access DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn total_count_for_program(
        conn: &Connection,
        user_id: i64,
        program: Program,
    ) -> AppResult<i64> {
        let total = conn.query_row(
            "SELECT COALESCE(SUM(access_count), 0) FROM trail_accesses WHERE user_id = ?1 AND program = ?2",
            params![user_id, program],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Earliest first visit and latest last visit across all of a user's trails.
    pub fn span_for_user(
        conn: &Connection,
        user_id: i64,
    ) -> AppResult<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        let span = conn.query_row(
            "SELECT MIN(first_access), MAX(last_access) FROM trail_accesses WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(span)
    }
}
