//! Trail visits and the progress rollups derived from them.
//!
//! A visit writes the access ledger, merges the trail into the program's
//! visited set and rebuilds the user's overall summary, all inside one
//! immediate transaction.

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::challenge::ChallengeCompletion;
use crate::models::program::{is_valid_trail_number, Program};
use crate::models::progress::{
    OverallProgress, OverallProgressView, ProgramProgress, ProgramProgressView,
};
use crate::models::trail_access::TrailAccess;

const TRAIL_ID_MAX_LEN: usize = 100;
const RECENT_ACCESS_LIMIT: i64 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct TrackTrailAccessForm {
    pub program: Option<String>,
    pub trail_id: Option<String>,
    pub trail_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrailVisit {
    pub program: Program,
    pub trail_id: String,
    pub trail_number: i64,
}

impl TrackTrailAccessForm {
    pub fn validate(&self) -> AppResult<TrailVisit> {
        let mut errors = FieldErrors::new();

        let program = match self.program.as_deref() {
            None => {
                errors.add("program", "This field is required.");
                None
            }
            Some(p) => match p.parse::<Program>() {
                Ok(p) => Some(p),
                Err(e) => {
                    errors.add("program", e.to_string());
                    None
                }
            },
        };

        let trail_id = self.trail_id.as_deref().map(str::trim).unwrap_or_default();
        if trail_id.is_empty() {
            errors.add("trail_id", "This field is required.");
        } else if trail_id.chars().count() > TRAIL_ID_MAX_LEN {
            errors.add(
                "trail_id",
                format!("Ensure this field has no more than {} characters.", TRAIL_ID_MAX_LEN),
            );
        }

        match self.trail_number {
            None => errors.add("trail_number", "This field is required."),
            Some(n) if !is_valid_trail_number(n) => {
                errors.add("trail_number", "Ensure this value is between 1 and 4.")
            }
            Some(_) => {}
        }

        match (program, self.trail_number) {
            (Some(program), Some(trail_number)) if errors.is_empty() => Ok(TrailVisit {
                program,
                trail_id: trail_id.to_string(),
                trail_number,
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct AccessSummary {
    pub trail_id: String,
    pub access_count: i64,
    pub is_first_access: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct TrackOutcome {
    pub trail_access: AccessSummary,
    pub program_progress: ProgramProgressView,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserProgressSnapshot {
    pub program_progress: Vec<ProgramProgressView>,
    pub overall_progress: OverallProgressView,
    pub recent_accesses: Vec<TrailAccess>,
    pub total_challenges_completed: i64,
}

/// Record a visit and recompute the program and overall rollups.
pub fn track_trail_access(
    conn: &mut Connection,
    user_id: i64,
    visit: &TrailVisit,
) -> AppResult<TrackOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let access = TrailAccess::record(
        &tx,
        user_id,
        visit.program,
        &visit.trail_id,
        visit.trail_number,
    )?;

    // the access row keeps its first-visit program; progress follows the request
    let mut progress = ProgramProgress::get_or_create(&tx, user_id, visit.program)?;
    let newly_visited = progress.add_trail(visit.trail_number);
    progress.refresh_access_count(&tx)?;
    progress.save(&tx)?;

    let mut overall = OverallProgress::get_or_create(&tx, user_id)?;
    overall.update_stats(&tx)?;

    tx.commit()?;

    if newly_visited {
        log::info!(
            "user {} reached trail {} of {} ({}%)",
            user_id,
            visit.trail_number,
            visit.program,
            progress.progress_percentage()
        );
    }

    Ok(TrackOutcome {
        trail_access: AccessSummary {
            is_first_access: access.is_first_access(),
            trail_id: access.trail_id,
            access_count: access.access_count,
        },
        program_progress: progress.view(),
    })
}

/// Every program row, the refreshed overall summary and recent activity.
pub fn user_snapshot(conn: &mut Connection, user_id: i64) -> AppResult<UserProgressSnapshot> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let programs = ProgramProgress::list_for_user(&tx, user_id)?;
    let mut overall = OverallProgress::get_or_create(&tx, user_id)?;
    overall.update_stats(&tx)?;
    let recent = TrailAccess::recent_for_user(&tx, user_id, RECENT_ACCESS_LIMIT)?;
    let challenges = ChallengeCompletion::count_for_user(&tx, user_id)?;

    tx.commit()?;

    Ok(UserProgressSnapshot {
        program_progress: programs.iter().map(ProgramProgress::view).collect(),
        overall_progress: overall.view(),
        recent_accesses: recent,
        total_challenges_completed: challenges,
    })
}

/// One program's progress, or the zeroed default when it was never visited.
pub fn program_snapshot(
    conn: &Connection,
    user_id: i64,
    program: Program,
) -> AppResult<ProgramProgressView> {
    Ok(ProgramProgress::find(conn, user_id, program)?
        .map(|p| p.view())
        .unwrap_or_else(|| ProgramProgressView::empty(program)))
}
