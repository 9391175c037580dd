use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppResult;
use crate::models::program::Program;

/// One submitted answer. Only `is_correct` is interpreted; everything else
/// the client sends is kept verbatim in the stored answer list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CertificateAnswer {
    #[serde(default)]
    pub is_correct: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Clone)]
pub struct CertificateTest {
    pub id: i64,
    pub user_id: i64,
    pub program: Program,
    pub track: String,
    pub score: f64,
    pub correct_answers: i64,
    pub total_questions: i64,
    pub passed: bool,
    pub answers: Vec<CertificateAnswer>,
    pub started_at: NaiveDateTime,
    pub completed_at: NaiveDateTime,
}

/// Validated submission.
#[derive(Debug, Clone)]
pub struct NewCertificateTest {
    pub program: Program,
    pub track: String,
    pub score: f64,
    pub passed: bool,
    pub answers: Vec<CertificateAnswer>,
}

pub fn count_correct(answers: &[CertificateAnswer]) -> i64 {
    answers.iter().filter(|a| a.is_correct).count() as i64
}

impl CertificateTest {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let raw: String = row.get("answers")?;
        let answers = serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
        Ok(CertificateTest {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            program: row.get("program")?,
            track: row.get("track")?,
            score: row.get("score")?,
            correct_answers: row.get("correct_answers")?,
            total_questions: row.get("total_questions")?,
            passed: row.get::<_, i64>("passed")? != 0,
            answers,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn create(conn: &Connection, user_id: i64, input: &NewCertificateTest) -> AppResult<Self> {
        let now = chrono::Utc::now().naive_utc();
        let correct_answers = count_correct(&input.answers);
        let total_questions = input.answers.len() as i64;

        conn.execute(
            "INSERT INTO certificate_tests
                (user_id, program, track, score, correct_answers, total_questions, passed, answers, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                user_id,
                input.program,
                input.track,
                input.score,
                correct_answers,
                total_questions,
                input.passed as i64,
                serde_json::to_string(&input.answers)?,
                now
            ],
        )?;

        Ok(CertificateTest {
            id: conn.last_insert_rowid(),
            user_id,
            program: input.program,
            track: input.track.clone(),
            score: input.score,
            correct_answers,
            total_questions,
            passed: input.passed,
            answers: input.answers.clone(),
            started_at: now,
            completed_at: now,
        })
    }

    /// Newest first; `passed_only` restricts to approved tests.
    pub fn list_for_user(conn: &Connection, user_id: i64, passed_only: bool) -> AppResult<Vec<Self>> {
        let sql = if passed_only {
            "SELECT * FROM certificate_tests WHERE user_id = ?1 AND passed = 1
             ORDER BY completed_at DESC, id DESC"
        } else {
            "SELECT * FROM certificate_tests WHERE user_id = ?1
             ORDER BY completed_at DESC, id DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let tests = stmt
            .query_map(params![user_id], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tests)
    }

    pub fn status_label(&self) -> &'static str {
        if self.passed {
            "passed"
        } else {
            "failed"
        }
    }

    pub fn certificate_id(&self) -> String {
        format!("{}-{}", self.program, self.track)
    }
}
