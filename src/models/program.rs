use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

pub const TRAILS_PER_PROGRAM: usize = 4;
pub const TOTAL_TRAILS: usize = TRAILS_PER_PROGRAM * Program::ALL.len();
pub const BADGES_PER_PROGRAM: usize = TRAILS_PER_PROGRAM * Difficulty::ALL.len();
pub const TOTAL_BADGES: usize = BADGES_PER_PROGRAM * Program::ALL.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Program {
    Proind,
    Prodepe,
    Prodeauto,
}

impl Program {
    pub const ALL: [Program; 3] = [Program::Proind, Program::Prodepe, Program::Prodeauto];

    pub fn as_str(&self) -> &'static str {
        match self {
            Program::Proind => "PROIND",
            Program::Prodepe => "PRODEPE",
            Program::Prodeauto => "PRODEAUTO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    /// Tier awarded for a challenge of this difficulty.
    pub fn badge_type(&self) -> BadgeType {
        match self {
            Difficulty::Easy => BadgeType::Bronze,
            Difficulty::Medium => BadgeType::Silver,
            Difficulty::Hard => BadgeType::Gold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BadgeType {
    Bronze,
    Silver,
    Gold,
}

impl BadgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeType::Bronze => "BRONZE",
            BadgeType::Silver => "SILVER",
            BadgeType::Gold => "GOLD",
        }
    }
}

pub fn is_valid_trail_number(n: i64) -> bool {
    (1..=TRAILS_PER_PROGRAM as i64).contains(&n)
}

/// Error for a string that names none of the enum's variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidChoice(pub String);

impl fmt::Display for InvalidChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" is not a valid choice.", self.0)
    }
}

// Shared plumbing: case-insensitive parsing, Display, and TEXT column mapping.
macro_rules! text_enum {
    ($ty:ident) => {
        impl FromStr for $ty {
            type Err = InvalidChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_uppercase();
                <$ty>::variants()
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| InvalidChoice(s.to_string()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: InvalidChoice| FromSqlError::Other(e.to_string().into()))
            }
        }
    };
}

impl Program {
    fn variants() -> &'static [Program] {
        &Program::ALL
    }
}

impl Difficulty {
    fn variants() -> &'static [Difficulty] {
        &Difficulty::ALL
    }
}

impl BadgeType {
    fn variants() -> &'static [BadgeType] {
        &[BadgeType::Bronze, BadgeType::Silver, BadgeType::Gold]
    }
}

text_enum!(Program);
text_enum!(Difficulty);
text_enum!(BadgeType);

/// Round to `places` decimal digits, the way percentages are reported.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
