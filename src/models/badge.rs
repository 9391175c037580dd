use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::models::program::{BadgeType, Difficulty, Program, TRAILS_PER_PROGRAM};

pub const DEFAULT_BADGE_IMAGE: &str = "badges/default.jpg";

#[derive(Debug, Serialize, Clone)]
pub struct BadgeDefinition {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub program: Program,
    pub trail_number: i64,
    pub difficulty: Difficulty,
    pub badge_type: BadgeType,
    pub badge_image: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// A catalog entry before it has a row id.
#[derive(Debug, Clone)]
pub struct NewBadgeDefinition {
    pub name: String,
    pub description: String,
    pub program: Program,
    pub trail_number: i64,
    pub difficulty: Difficulty,
    pub badge_type: BadgeType,
    pub badge_image: String,
}

/// `badges/{program}_t{trail}_{badge_type}.png`, lower-cased.
pub fn badge_image_path(program: Program, trail_number: i64, badge_type: BadgeType) -> String {
    format!(
        "badges/{}_t{}_{}.png",
        program.as_str().to_lowercase(),
        trail_number,
        badge_type.as_str().to_lowercase()
    )
}

/// Public URL for a stored image path, or the default artwork if the file is missing.
pub fn resolve_image_url(config: &AppConfig, relative: &str) -> String {
    let on_disk = Path::new(&config.media_root).join(relative);
    if on_disk.is_file() {
        format!("{}{}", config.media_url(), relative)
    } else {
        format!("{}{}", config.media_url(), DEFAULT_BADGE_IMAGE)
    }
}

/// The full catalog: every program x trail x difficulty.
pub fn badge_catalog() -> Vec<NewBadgeDefinition> {
    let mut defs = Vec::with_capacity(36);
    for program in Program::ALL {
        for trail in 1..=TRAILS_PER_PROGRAM as i64 {
            for difficulty in Difficulty::ALL {
                let badge_type = difficulty.badge_type();
                defs.push(NewBadgeDefinition {
                    name: format!("{} T{} - {}", program, trail, difficulty.label()),
                    description: format!(
                        "Earned by completing the {} challenge of trail {} in the {} program",
                        difficulty.label().to_lowercase(),
                        trail,
                        program
                    ),
                    program,
                    trail_number: trail,
                    difficulty,
                    badge_type,
                    badge_image: badge_image_path(program, trail, badge_type),
                });
            }
        }
    }
    defs
}

impl BadgeDefinition {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(BadgeDefinition {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            program: row.get("program")?,
            trail_number: row.get("trail_number")?,
            difficulty: row.get("difficulty")?,
            badge_type: row.get("badge_type")?,
            badge_image: row.get("badge_image")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    pub fn image_url(&self, config: &AppConfig) -> String {
        resolve_image_url(config, &self.badge_image)
    }

    /// Active definition for a challenge key, if the catalog has one.
    pub fn find_active(
        conn: &Connection,
        program: Program,
        trail_number: i64,
        difficulty: Difficulty,
    ) -> AppResult<Option<Self>> {
        let def = conn
            .query_row(
                "SELECT * FROM badge_definitions
                 WHERE program = ?1 AND trail_number = ?2 AND difficulty = ?3 AND is_active = 1",
                params![program, trail_number, difficulty],
                Self::from_row,
            )
            .optional()?;
        Ok(def)
    }

    /// Active definitions ordered by program, trail and tier.
    pub fn list_active(conn: &Connection) -> AppResult<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM badge_definitions WHERE is_active = 1")?;
        let mut defs = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        defs.sort_by_key(|d| (d.program, d.trail_number, d.difficulty));
        Ok(defs)
    }

    pub fn count_active(conn: &Connection) -> AppResult<i64> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM badge_definitions WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn count(conn: &Connection) -> AppResult<i64> {
        let n = conn.query_row("SELECT COUNT(*) FROM badge_definitions", [], |row| row.get(0))?;
        Ok(n)
    }

    #[cfg(test)]
    pub fn set_active(conn: &Connection, id: i64, active: bool) -> AppResult<()> {
        conn.execute(
            "UPDATE badge_definitions SET is_active = ?1 WHERE id = ?2",
            params![active as i64, id],
        )?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct UserBadge {
    pub id: i64,
    pub user_id: i64,
    pub badge_definition_id: i64,
    pub challenge_completion_id: i64,
    pub earned_at: NaiveDateTime,
}

/// An awarded badge joined with its definition and the score that earned it.
#[derive(Debug, Clone)]
pub struct EarnedBadge {
    pub id: i64,
    pub definition: BadgeDefinition,
    pub earned_at: NaiveDateTime,
    pub score: Option<f64>,
}

impl UserBadge {
    pub fn create(
        conn: &Connection,
        user_id: i64,
        badge_definition_id: i64,
        challenge_completion_id: i64,
    ) -> AppResult<Self> {
        let now = chrono::Utc::now().naive_utc();
        conn.execute(
            "INSERT INTO user_badges (user_id, badge_definition_id, challenge_completion_id, earned_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, badge_definition_id, challenge_completion_id, now],
        )?;
        Ok(UserBadge {
            id: conn.last_insert_rowid(),
            user_id,
            badge_definition_id,
            challenge_completion_id,
            earned_at: now,
        })
    }

    /// Newest first.
    pub fn list_for_user(conn: &Connection, user_id: i64) -> AppResult<Vec<EarnedBadge>> {
        let mut stmt = conn.prepare(
            "SELECT bd.*, ub.id AS user_badge_id, ub.earned_at AS earned_at, cc.score AS completion_score
             FROM user_badges ub
             JOIN badge_definitions bd ON bd.id = ub.badge_definition_id
             JOIN challenge_completions cc ON cc.id = ub.challenge_completion_id
             WHERE ub.user_id = ?1
             ORDER BY ub.earned_at DESC, ub.id DESC",
        )?;
        let badges = stmt
            .query_map(params![user_id], |row| {
                Ok(EarnedBadge {
                    id: row.get("user_badge_id")?,
                    definition: BadgeDefinition::from_row(row)?,
                    earned_at: row.get("earned_at")?,
                    score: row.get("completion_score")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(badges)
    }

    pub fn earned_definition_ids(conn: &Connection, user_id: i64) -> AppResult<Vec<i64>> {
        let mut stmt =
            conn.prepare("SELECT badge_definition_id FROM user_badges WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    #[cfg(test)]
    pub fn count_for_user(conn: &Connection, user_id: i64) -> AppResult<i64> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM user_badges WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}
