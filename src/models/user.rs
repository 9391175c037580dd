use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::AppResult;

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get("id")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            display_name: row.get("display_name")?,
            is_staff: row.get::<_, i64>("is_staff")? != 0,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> AppResult<Option<User>> {
        let user = conn
            .query_row("SELECT * FROM users WHERE id = ?1", params![id], Self::from_row)
            .optional()?;
        Ok(user)
    }

    /// Emails are matched case-insensitively.
    pub fn get_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
        let user = conn
            .query_row(
                "SELECT * FROM users WHERE lower(email) = lower(?1)",
                params![email.trim()],
                Self::from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn create(
        conn: &Connection,
        email: &str,
        password_hash: &str,
        display_name: &str,
        is_staff: bool,
    ) -> AppResult<i64> {
        let now = chrono::Utc::now().naive_utc();
        conn.execute(
            "INSERT INTO users (email, password_hash, display_name, is_staff, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![email.trim().to_lowercase(), password_hash, display_name, is_staff as i64, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_password(conn: &Connection, id: i64, password_hash: &str) -> AppResult<()> {
        conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;
        Ok(())
    }

    pub fn set_staff(conn: &Connection, id: i64, is_staff: bool) -> AppResult<()> {
        conn.execute(
            "UPDATE users SET is_staff = ?1, is_active = 1 WHERE id = ?2",
            params![is_staff as i64, id],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn set_active(conn: &Connection, id: i64, active: bool) -> AppResult<()> {
        conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![active as i64, id],
        )?;
        Ok(())
    }
}
