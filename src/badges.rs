//! Challenge completions, badge minting and badge statistics.

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::badge::{BadgeDefinition, EarnedBadge, UserBadge};
use crate::models::badge_stats::UserBadgeStats;
use crate::models::challenge::{ChallengeCompletion, NewCompletion};
use crate::models::program::{
    is_valid_trail_number, round_to, BadgeType, Difficulty, Program, BADGES_PER_PROGRAM,
};

#[derive(Debug, Default, Deserialize)]
pub struct CompleteChallengeForm {
    pub program: Option<String>,
    pub trail_number: Option<i64>,
    pub difficulty: Option<String>,
    pub score: Option<f64>,
    pub challenge_id: Option<i64>,
    pub completion_time_seconds: Option<i64>,
}

fn parse_choice<T: std::str::FromStr>(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => {
            errors.add(field, "This field is required.");
            None
        }
        Some(v) => v
            .parse::<T>()
            .map_err(|e| errors.add(field, e.to_string()))
            .ok(),
    }
}

impl CompleteChallengeForm {
    pub fn validate(&self) -> AppResult<NewCompletion> {
        let mut errors = FieldErrors::new();

        let program = parse_choice::<Program>(&mut errors, "program", self.program.as_deref());
        let difficulty =
            parse_choice::<Difficulty>(&mut errors, "difficulty", self.difficulty.as_deref());

        match self.trail_number {
            None => errors.add("trail_number", "This field is required."),
            Some(n) if !is_valid_trail_number(n) => {
                errors.add("trail_number", "Ensure this value is between 1 and 4.")
            }
            Some(_) => {}
        }

        match self.score {
            None => errors.add("score", "This field is required."),
            Some(s) if !s.is_finite() || !(0.0..=100.0).contains(&s) => {
                errors.add("score", "Ensure this value is between 0 and 100.")
            }
            Some(_) => {}
        }

        if matches!(self.challenge_id, Some(id) if id < 0) {
            errors.add("challenge_id", "Ensure this value is greater than or equal to 0.");
        }
        if matches!(self.completion_time_seconds, Some(t) if t < 0) {
            errors.add(
                "completion_time_seconds",
                "Ensure this value is greater than or equal to 0.",
            );
        }

        match (program, difficulty, self.trail_number, self.score) {
            (Some(program), Some(difficulty), Some(trail_number), Some(score))
                if errors.is_empty() =>
            {
                Ok(NewCompletion {
                    program,
                    trail_number,
                    difficulty,
                    score: round_to(score, 2),
                    challenge_id: self.challenge_id,
                    completion_time_seconds: self.completion_time_seconds,
                })
            }
            _ => Err(AppError::Validation(errors)),
        }
    }
}

/// Catalog fields shared by every badge payload.
#[derive(Debug, Serialize, Clone)]
pub struct BadgeView {
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub image_path: String,
    #[serde(rename = "type")]
    pub badge_type: BadgeType,
    pub program: Program,
    pub trail_number: i64,
    pub difficulty: Difficulty,
}

impl BadgeView {
    fn new(def: &BadgeDefinition, config: &AppConfig) -> Self {
        BadgeView {
            name: def.name.clone(),
            description: def.description.clone(),
            image_url: def.image_url(config),
            image_path: def.badge_image.clone(),
            badge_type: def.badge_type,
            program: def.program,
            trail_number: def.trail_number,
            difficulty: def.difficulty,
        }
    }
}

/// A badge the user holds; `id` is the award, not the definition.
#[derive(Debug, Serialize, Clone)]
pub struct EarnedBadgeView {
    pub id: i64,
    #[serde(flatten)]
    pub badge: BadgeView,
    pub earned_at: NaiveDateTime,
    pub score: Option<f64>,
}

impl EarnedBadgeView {
    fn new(earned: &EarnedBadge, config: &AppConfig) -> Self {
        EarnedBadgeView {
            id: earned.id,
            badge: BadgeView::new(&earned.definition, config),
            earned_at: earned.earned_at,
            score: earned.score,
        }
    }
}

/// A catalog entry still open to the user; `id` is the definition.
#[derive(Debug, Serialize, Clone)]
pub struct AvailableBadgeView {
    pub id: i64,
    #[serde(flatten)]
    pub badge: BadgeView,
}

#[derive(Debug, Serialize, Clone)]
pub struct CompletionOutcome {
    pub completion_id: i64,
    pub is_first_completion: bool,
    pub badge_earned: Option<EarnedBadgeView>,
    pub score: Option<f64>,
    pub attempts: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserBadges {
    pub badges: Vec<EarnedBadgeView>,
    pub stats: UserBadgeStats,
}

#[derive(Debug, Serialize, Clone)]
pub struct AvailableBadges {
    pub available_badges: Vec<AvailableBadgeView>,
    pub total_available: usize,
    pub total_possible: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProgramBadgeStats {
    pub program: Program,
    pub badges_earned: i64,
    pub total_possible: usize,
    pub percentage: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct BadgeStatsReport {
    pub overall_stats: UserBadgeStats,
    pub program_stats: Vec<ProgramBadgeStats>,
}

/// Record a challenge result. Only the first completion of a key can mint a badge.
pub fn complete_challenge(
    conn: &mut Connection,
    config: &AppConfig,
    user_id: i64,
    input: &NewCompletion,
) -> AppResult<CompletionOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let (completion, created) = ChallengeCompletion::record(&tx, user_id, input)?;

    let mut badge_earned = None;
    if created {
        match BadgeDefinition::find_active(&tx, input.program, input.trail_number, input.difficulty)? {
            Some(def) => {
                let badge = UserBadge::create(&tx, user_id, def.id, completion.id)?;
                UserBadgeStats::refreshed(&tx, user_id)?;
                log::info!("user {} earned badge '{}'", user_id, def.name);
                badge_earned = Some(EarnedBadgeView {
                    id: badge.id,
                    badge: BadgeView::new(&def, config),
                    earned_at: badge.earned_at,
                    score: completion.score,
                });
            }
            None => log::warn!(
                "no active badge for {} T{} {}; completion recorded without award",
                input.program,
                input.trail_number,
                input.difficulty
            ),
        }
    }

    tx.commit()?;

    Ok(CompletionOutcome {
        completion_id: completion.id,
        is_first_completion: created,
        badge_earned,
        score: completion.score,
        attempts: completion.attempts,
    })
}

/// Earned badges (newest first) with freshly recomputed stats.
pub fn user_badges(conn: &mut Connection, config: &AppConfig, user_id: i64) -> AppResult<UserBadges> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let earned = UserBadge::list_for_user(&tx, user_id)?;
    let stats = UserBadgeStats::refreshed(&tx, user_id)?;
    tx.commit()?;

    Ok(UserBadges {
        badges: earned.iter().map(|b| EarnedBadgeView::new(b, config)).collect(),
        stats,
    })
}

/// Active catalog entries the user has not earned yet.
pub fn available_badges(
    conn: &Connection,
    config: &AppConfig,
    user_id: i64,
) -> AppResult<AvailableBadges> {
    let earned = UserBadge::earned_definition_ids(conn, user_id)?;
    let available: Vec<AvailableBadgeView> = BadgeDefinition::list_active(conn)?
        .into_iter()
        .filter(|def| !earned.contains(&def.id))
        .map(|def| AvailableBadgeView {
            id: def.id,
            badge: BadgeView::new(&def, config),
        })
        .collect();

    Ok(AvailableBadges {
        total_available: available.len(),
        available_badges: available,
        total_possible: BadgeDefinition::count_active(conn)?,
    })
}

pub fn program_badge_stats(stats: &UserBadgeStats) -> Vec<ProgramBadgeStats> {
    Program::ALL
        .iter()
        .map(|&program| {
            let earned = stats.for_program(program);
            ProgramBadgeStats {
                program,
                badges_earned: earned,
                total_possible: BADGES_PER_PROGRAM,
                percentage: round_to(earned as f64 / BADGES_PER_PROGRAM as f64 * 100.0, 1),
            }
        })
        .collect()
}

pub fn badge_stats(conn: &mut Connection, user_id: i64) -> AppResult<BadgeStatsReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let stats = UserBadgeStats::refreshed(&tx, user_id)?;
    tx.commit()?;

    Ok(BadgeStatsReport {
        program_stats: program_badge_stats(&stats),
        overall_stats: stats,
    })
}
