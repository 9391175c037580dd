use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::AppResult;
use crate::models::badge::{EarnedBadge, UserBadge};
use crate::models::program::{round_to, BadgeType, Program, TOTAL_BADGES};

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct UserBadgeStats {
    #[serde(skip)]
    pub user_id: i64,
    pub bronze_badges: i64,
    pub silver_badges: i64,
    pub gold_badges: i64,
    pub total_badges: i64,
    pub proind_badges: i64,
    pub prodepe_badges: i64,
    pub prodeauto_badges: i64,
    pub completion_percentage: f64,
    pub first_badge_earned: Option<NaiveDateTime>,
    pub last_badge_earned: Option<NaiveDateTime>,
}

impl UserBadgeStats {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(UserBadgeStats {
            user_id: row.get("user_id")?,
            bronze_badges: row.get("bronze_badges")?,
            silver_badges: row.get("silver_badges")?,
            gold_badges: row.get("gold_badges")?,
            total_badges: row.get("total_badges")?,
            proind_badges: row.get("proind_badges")?,
            prodepe_badges: row.get("prodepe_badges")?,
            prodeauto_badges: row.get("prodeauto_badges")?,
            completion_percentage: row.get("completion_percentage")?,
            first_badge_earned: row.get("first_badge_earned")?,
            last_badge_earned: row.get("last_badge_earned")?,
        })
    }

    pub fn get_or_create(conn: &Connection, user_id: i64) -> AppResult<Self> {
        let now = chrono::Utc::now().naive_utc();
        conn.execute(
            "INSERT OR IGNORE INTO user_badge_stats (user_id, updated_at) VALUES (?1, ?2)",
            params![user_id, now],
        )?;
        let stats = conn.query_row(
            "SELECT * FROM user_badge_stats WHERE user_id = ?1",
            params![user_id],
            Self::from_row,
        )?;
        Ok(stats)
    }

    /// Counters derived from a set of awarded badges.
    pub fn tally(user_id: i64, badges: &[EarnedBadge]) -> Self {
        let mut stats = UserBadgeStats {
            user_id,
            ..Default::default()
        };

        for badge in badges {
            match badge.definition.badge_type {
                BadgeType::Bronze => stats.bronze_badges += 1,
                BadgeType::Silver => stats.silver_badges += 1,
                BadgeType::Gold => stats.gold_badges += 1,
            }
            match badge.definition.program {
                Program::Proind => stats.proind_badges += 1,
                Program::Prodepe => stats.prodepe_badges += 1,
                Program::Prodeauto => stats.prodeauto_badges += 1,
            }
        }

        stats.total_badges = stats.bronze_badges + stats.silver_badges + stats.gold_badges;
        stats.completion_percentage =
            round_to(stats.total_badges as f64 / TOTAL_BADGES as f64 * 100.0, 2);
        stats.first_badge_earned = badges.iter().map(|b| b.earned_at).min();
        stats.last_badge_earned = badges.iter().map(|b| b.earned_at).max();
        stats
    }

    /// Full rescan of the user's badges, persisted over the previous row.
    pub fn update_stats(&mut self, conn: &Connection) -> AppResult<()> {
        let badges = UserBadge::list_for_user(conn, self.user_id)?;
        *self = Self::tally(self.user_id, &badges);

        let now = chrono::Utc::now().naive_utc();
        conn.execute(
            "UPDATE user_badge_stats
             SET bronze_badges = ?1, silver_badges = ?2, gold_badges = ?3, total_badges = ?4,
                 proind_badges = ?5, prodepe_badges = ?6, prodeauto_badges = ?7,
                 completion_percentage = ?8, first_badge_earned = ?9, last_badge_earned = ?10,
                 updated_at = ?11
             WHERE user_id = ?12",
            params![
                self.bronze_badges,
                self.silver_badges,
                self.gold_badges,
                self.total_badges,
                self.proind_badges,
                self.prodepe_badges,
                self.prodeauto_badges,
                self.completion_percentage,
                self.first_badge_earned,
                self.last_badge_earned,
                now,
                self.user_id
            ],
        )?;
        Ok(())
    }

    /// Fetch-or-create then rescan; what every read path uses.
    pub fn refreshed(conn: &Connection, user_id: i64) -> AppResult<Self> {
        let mut stats = Self::get_or_create(conn, user_id)?;
        stats.update_stats(conn)?;
        Ok(stats)
    }

    pub fn for_program(&self, program: Program) -> i64 {
        match program {
            Program::Proind => self.proind_badges,
            Program::Prodepe => self.prodepe_badges,
            Program::Prodeauto => self.prodeauto_badges,
        }
    }
}
