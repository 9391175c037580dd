//! Certificate exam log. Independent of trails and badges.

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::certificate::{
    CertificateAnswer, CertificateTest, NewCertificateTest,
};
use crate::models::program::{round_to, Program};

const TRACK_MAX_LEN: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct CertificateTestForm {
    pub program: Option<String>,
    pub track: Option<String>,
    pub score: Option<f64>,
    pub passed: Option<bool>,
    pub answers: Option<Vec<CertificateAnswer>>,
}

impl CertificateTestForm {
    /// `passed` is taken as submitted; answer counts are derived on insert.
    pub fn validate(self) -> AppResult<NewCertificateTest> {
        let mut errors = FieldErrors::new();

        let program = match self.program.as_deref().map(str::parse::<Program>) {
            None => {
                errors.add("program", "This field is required.");
                None
            }
            Some(Err(e)) => {
                errors.add("program", e.to_string());
                None
            }
            Some(Ok(p)) => Some(p),
        };

        let track = self.track.as_deref().map(str::trim).unwrap_or_default().to_string();
        if track.is_empty() {
            errors.add("track", "This field is required.");
        } else if track.chars().count() > TRACK_MAX_LEN {
            errors.add(
                "track",
                format!("Ensure this field has no more than {} characters.", TRACK_MAX_LEN),
            );
        }

        match self.score {
            None => errors.add("score", "This field is required."),
            Some(s) if !s.is_finite() || !(0.0..=100.0).contains(&s) => {
                errors.add("score", "Ensure this value is between 0 and 100.")
            }
            Some(_) => {}
        }

        if self.passed.is_none() {
            errors.add("passed", "This field is required.");
        }
        if self.answers.is_none() {
            errors.add("answers", "This field is required.");
        }

        match (program, self.score, self.passed, self.answers) {
            (Some(program), Some(score), Some(passed), Some(answers)) if errors.is_empty() => {
                Ok(NewCertificateTest {
                    program,
                    track,
                    score: round_to(score, 2),
                    passed,
                    answers,
                })
            }
            _ => Err(AppError::Validation(errors)),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SubmissionOutcome {
    pub test_id: i64,
    pub score: f64,
    pub correct_answers: i64,
    pub total_questions: i64,
    pub passed: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct CertificateView {
    pub id: i64,
    pub program: Program,
    pub track: String,
    pub score: f64,
    pub correct_answers: i64,
    pub total_questions: i64,
    pub passed: bool,
    pub completed_at: NaiveDateTime,
    pub status: &'static str,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserCertificates {
    pub certificates: Vec<CertificateView>,
    pub total_certificates: usize,
    pub passed_certificates: usize,
    pub failed_certificates: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct CompletedCertificateView {
    pub program: Program,
    pub track: String,
    pub score: f64,
    pub completed_at: NaiveDateTime,
    pub certificate_id: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct CompletedCertificates {
    pub completed_certificates: Vec<CompletedCertificateView>,
    pub total_completed: usize,
}

pub fn submit_certificate_test(
    conn: &mut Connection,
    user_id: i64,
    input: &NewCertificateTest,
) -> AppResult<SubmissionOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let test = CertificateTest::create(&tx, user_id, input)?;
    tx.commit()?;

    log::info!(
        "user {} {} certificate {} ({}/{})",
        user_id,
        test.status_label(),
        test.certificate_id(),
        test.correct_answers,
        test.total_questions
    );

    Ok(SubmissionOutcome {
        test_id: test.id,
        score: test.score,
        correct_answers: test.correct_answers,
        total_questions: test.total_questions,
        passed: test.passed,
    })
}

pub fn user_certificates(conn: &Connection, user_id: i64) -> AppResult<UserCertificates> {
    let tests = CertificateTest::list_for_user(conn, user_id, false)?;
    let passed = tests.iter().filter(|t| t.passed).count();

    Ok(UserCertificates {
        total_certificates: tests.len(),
        passed_certificates: passed,
        failed_certificates: tests.len() - passed,
        certificates: tests
            .into_iter()
            .map(|t| CertificateView {
                status: t.status_label(),
                id: t.id,
                program: t.program,
                track: t.track,
                score: t.score,
                correct_answers: t.correct_answers,
                total_questions: t.total_questions,
                passed: t.passed,
                completed_at: t.completed_at,
            })
            .collect(),
    })
}

pub fn completed_certificates(conn: &Connection, user_id: i64) -> AppResult<CompletedCertificates> {
    let tests = CertificateTest::list_for_user(conn, user_id, true)?;

    Ok(CompletedCertificates {
        total_completed: tests.len(),
        completed_certificates: tests
            .into_iter()
            .map(|t| CompletedCertificateView {
                certificate_id: t.certificate_id(),
                program: t.program,
                track: t.track,
                score: t.score,
                completed_at: t.completed_at,
            })
            .collect(),
    })
}
