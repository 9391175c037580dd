use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::AppResult;
use crate::models::program::{Difficulty, Program};

#[derive(Debug, Serialize, Clone)]
pub struct ChallengeCompletion {
    pub id: i64,
    pub user_id: i64,
    pub program: Program,
    pub trail_number: i64,
    pub difficulty: Difficulty,
    pub challenge_id: Option<i64>,
    pub score: Option<f64>,
    pub attempts: i64,
    pub completion_time_seconds: Option<i64>,
    pub completed_at: NaiveDateTime,
}

/// Validated input for recording a challenge result.
#[derive(Debug, Clone)]
pub struct NewCompletion {
    pub program: Program,
    pub trail_number: i64,
    pub difficulty: Difficulty,
    pub score: f64,
    pub challenge_id: Option<i64>,
    pub completion_time_seconds: Option<i64>,
}

impl ChallengeCompletion {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ChallengeCompletion {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            program: row.get("program")?,
            trail_number: row.get("trail_number")?,
            difficulty: row.get("difficulty")?,
            challenge_id: row.get("challenge_id")?,
            score: row.get("score")?,
            attempts: row.get("attempts")?,
            completion_time_seconds: row.get("completion_time_seconds")?,
            completed_at: row.get("completed_at")?,
        })
    }

    /// Record a completion keyed by (user, program, trail, difficulty).
    /// The first call inserts and wins; later calls only bump `attempts`.
    /// Returns the stored row and whether it was created by this call.
    pub fn record(conn: &Connection, user_id: i64, input: &NewCompletion) -> AppResult<(Self, bool)> {
        let now = chrono::Utc::now().naive_utc();
        let inserted = conn.execute(
            "INSERT INTO challenge_completions
                (user_id, program, trail_number, difficulty, challenge_id, score, attempts, completion_time_seconds, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)
             ON CONFLICT(user_id, program, trail_number, difficulty) DO NOTHING",
            params![
                user_id,
                input.program,
                input.trail_number,
                input.difficulty,
                input.challenge_id,
                input.score,
                input.completion_time_seconds,
                now
            ],
        )?;
        let created = inserted == 1;

        if !created {
            conn.execute(
                "UPDATE challenge_completions SET attempts = attempts + 1
                 WHERE user_id = ?1 AND program = ?2 AND trail_number = ?3 AND difficulty = ?4",
                params![user_id, input.program, input.trail_number, input.difficulty],
            )?;
        }

        let completion = conn.query_row(
            "SELECT * FROM challenge_completions
             WHERE user_id = ?1 AND program = ?2 AND trail_number = ?3 AND difficulty = ?4",
            params![user_id, input.program, input.trail_number, input.difficulty],
            Self::from_row,
        )?;
        Ok((completion, created))
    }

    pub fn count_for_user(conn: &Connection, user_id: i64) -> AppResult<i64> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM challenge_completions WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}
