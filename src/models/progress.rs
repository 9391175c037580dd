use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppResult;
use crate::models::program::{round_to, Program, TOTAL_TRAILS, TRAILS_PER_PROGRAM};
use crate::models::trail_access::TrailAccess;

/// Decode a JSON TEXT column inside a row mapper.
fn json_column<T: DeserializeOwned>(row: &Row, column: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    let idx = row.as_ref().column_index(column)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[derive(Debug, Serialize, Clone)]
pub struct ProgramProgress {
    pub id: i64,
    pub user_id: i64,
    pub program: Program,
    pub last_accessed_trail: i64,
    /// Distinct trail numbers, ascending.
    pub trails_accessed: Vec<i64>,
    pub total_access_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Serialized form of a program's progress, derived fields included.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProgramProgressView {
    pub program: Program,
    pub progress_percentage: f64,
    pub trails_accessed: Vec<i64>,
    pub last_accessed_trail: i64,
    pub total_access_count: i64,
    pub is_completed: bool,
    pub next_trail: Option<i64>,
    pub updated_at: Option<NaiveDateTime>,
}

impl ProgramProgressView {
    /// What a program looks like before the user has visited any trail.
    pub fn empty(program: Program) -> Self {
        ProgramProgressView {
            program,
            progress_percentage: 0.0,
            trails_accessed: vec![],
            last_accessed_trail: 0,
            total_access_count: 0,
            is_completed: false,
            next_trail: Some(1),
            updated_at: None,
        }
    }
}

impl ProgramProgress {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let mut trails: Vec<i64> = json_column(row, "trails_accessed")?;
        trails.sort_unstable();
        trails.dedup();
        Ok(ProgramProgress {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            program: row.get("program")?,
            last_accessed_trail: row.get("last_accessed_trail")?,
            trails_accessed: trails,
            total_access_count: row.get("total_access_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find(conn: &Connection, user_id: i64, program: Program) -> AppResult<Option<Self>> {
        let progress = conn
            .query_row(
                "SELECT * FROM user_program_progress WHERE user_id = ?1 AND program = ?2",
                params![user_id, program],
                Self::from_row,
            )
            .optional()?;
        Ok(progress)
    }

    pub fn get_or_create(conn: &Connection, user_id: i64, program: Program) -> AppResult<Self> {
        let now = chrono::Utc::now().naive_utc();
        conn.execute(
            "INSERT OR IGNORE INTO user_program_progress (user_id, program, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![user_id, program, now],
        )?;
        let progress = conn.query_row(
            "SELECT * FROM user_program_progress WHERE user_id = ?1 AND program = ?2",
            params![user_id, program],
            Self::from_row,
        )?;
        Ok(progress)
    }

    /// All of a user's program rows in catalog order (PROIND, PRODEPE, PRODEAUTO).
    pub fn list_for_user(conn: &Connection, user_id: i64) -> AppResult<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM user_program_progress WHERE user_id = ?1")?;
        let mut rows = stmt
            .query_map(params![user_id], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.sort_by_key(|p| p.program);
        Ok(rows)
    }

    /// Merge a visited trail into the set. Returns false when it was already there.
    pub fn add_trail(&mut self, trail_number: i64) -> bool {
        self.last_accessed_trail = self.last_accessed_trail.max(trail_number);
        match self.trails_accessed.binary_search(&trail_number) {
            Ok(_) => false,
            Err(pos) => {
                self.trails_accessed.insert(pos, trail_number);
                true
            }
        }
    }

    /// Re-derive the program's visit total from the access ledger.
    pub fn refresh_access_count(&mut self, conn: &Connection) -> AppResult<()> {
        self.total_access_count =
            TrailAccess::total_count_for_program(conn, self.user_id, self.program)?;
        Ok(())
    }

    pub fn save(&mut self, conn: &Connection) -> AppResult<()> {
        self.updated_at = chrono::Utc::now().naive_utc();
        conn.execute(
            "UPDATE user_program_progress
             SET last_accessed_trail = ?1, trails_accessed = ?2, total_access_count = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                self.last_accessed_trail,
                serde_json::to_string(&self.trails_accessed)?,
                self.total_access_count,
                self.updated_at,
                self.id
            ],
        )?;
        Ok(())
    }

    pub fn progress_percentage(&self) -> f64 {
        round_to(
            self.trails_accessed.len() as f64 / TRAILS_PER_PROGRAM as f64 * 100.0,
            1,
        )
    }

    pub fn is_completed(&self) -> bool {
        self.trails_accessed.len() == TRAILS_PER_PROGRAM
    }

    /// Lowest trail number not yet visited.
    pub fn next_trail(&self) -> Option<i64> {
        (1..=TRAILS_PER_PROGRAM as i64).find(|n| !self.trails_accessed.contains(n))
    }

    pub fn view(&self) -> ProgramProgressView {
        ProgramProgressView {
            program: self.program,
            progress_percentage: self.progress_percentage(),
            trails_accessed: self.trails_accessed.clone(),
            last_accessed_trail: self.last_accessed_trail,
            total_access_count: self.total_access_count,
            is_completed: self.is_completed(),
            next_trail: self.next_trail(),
            updated_at: Some(self.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct OverallProgress {
    pub user_id: i64,
    pub total_trails_accessed: i64,
    pub total_access_count: i64,
    pub programs_started: Vec<Program>,
    pub programs_completed: Vec<Program>,
    pub first_access: Option<NaiveDateTime>,
    pub last_access: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Clone)]
pub struct OverallProgressView {
    pub total_trails_accessed: i64,
    pub total_access_count: i64,
    pub overall_percentage: f64,
    pub programs_started: Vec<Program>,
    pub programs_completed: Vec<Program>,
    pub first_access: Option<NaiveDateTime>,
    pub last_access: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

impl OverallProgress {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OverallProgress {
            user_id: row.get("user_id")?,
            total_trails_accessed: row.get("total_trails_accessed")?,
            total_access_count: row.get("total_access_count")?,
            programs_started: json_column(row, "programs_started")?,
            programs_completed: json_column(row, "programs_completed")?,
            first_access: row.get("first_access")?,
            last_access: row.get("last_access")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn get_or_create(conn: &Connection, user_id: i64) -> AppResult<Self> {
        let now = chrono::Utc::now().naive_utc();
        conn.execute(
            "INSERT OR IGNORE INTO user_overall_progress (user_id, created_at, updated_at)
             VALUES (?1, ?2, ?2)",
            params![user_id, now],
        )?;
        let overall = conn.query_row(
            "SELECT * FROM user_overall_progress WHERE user_id = ?1",
            params![user_id],
            Self::from_row,
        )?;
        Ok(overall)
    }

    /// Rebuild every counter from the user's program rows and access ledger, then persist.
    pub fn update_stats(&mut self, conn: &Connection) -> AppResult<()> {
        let programs = ProgramProgress::list_for_user(conn, self.user_id)?;

        self.total_trails_accessed = 0;
        self.total_access_count = 0;
        self.programs_started.clear();
        self.programs_completed.clear();

        for progress in &programs {
            self.total_trails_accessed += progress.trails_accessed.len() as i64;
            self.total_access_count += progress.total_access_count;
            if !progress.trails_accessed.is_empty() {
                self.programs_started.push(progress.program);
            }
            if progress.is_completed() {
                self.programs_completed.push(progress.program);
            }
        }

        let (first, last) = TrailAccess::span_for_user(conn, self.user_id)?;
        self.first_access = first.or(self.first_access);
        self.last_access = last.or(self.last_access);
        self.updated_at = chrono::Utc::now().naive_utc();

        conn.execute(
            "UPDATE user_overall_progress
             SET total_trails_accessed = ?1, total_access_count = ?2, programs_started = ?3,
                 programs_completed = ?4, first_access = ?5, last_access = ?6, updated_at = ?7
             WHERE user_id = ?8",
            params![
                self.total_trails_accessed,
                self.total_access_count,
                serde_json::to_string(&self.programs_started)?,
                serde_json::to_string(&self.programs_completed)?,
                self.first_access,
                self.last_access,
                self.updated_at,
                self.user_id
            ],
        )?;
        Ok(())
    }

    pub fn overall_percentage(&self) -> f64 {
        round_to(
            self.total_trails_accessed as f64 / TOTAL_TRAILS as f64 * 100.0,
            1,
        )
    }

    pub fn view(&self) -> OverallProgressView {
        OverallProgressView {
            total_trails_accessed: self.total_trails_accessed,
            total_access_count: self.total_access_count,
            overall_percentage: self.overall_percentage(),
            programs_started: self.programs_started.clone(),
            programs_completed: self.programs_completed.clone(),
            first_access: self.first_access,
            last_access: self.last_access,
            updated_at: self.updated_at,
        }
    }
}
