//! Domain types shared by the store, the service layer and the HTTP surface.
//!
//! Serialized shapes use camelCase field names because the front end reads
//! them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PoolError;
use crate::grading::grade_pick;

/// One side of a game. Used for a pick's chosen side and a game's winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = PoolError;

    /// Accepts `home`/`away` in any case, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "home" => Ok(Side::Home),
            "away" => Ok(Side::Away),
            other => Err(PoolError::validation(format!(
                "side must be \"home\" or \"away\", got {other:?}"
            ))),
        }
    }
}

/// Canonical game status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    #[default]
    Scheduled,
    InProgress,
    Final,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in-progress",
            GameStatus::Final => "final",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, GameStatus::Final)
    }

    /// Strict parse of a stored status value.
    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(GameStatus::Scheduled),
            "in-progress" => Some(GameStatus::InProgress),
            "final" => Some(GameStatus::Final),
            _ => None,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickStatus {
    Correct,
    Incorrect,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub id: Uuid,
    pub label: String,
    pub year: i32,
    pub sports_data_season_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Week {
    pub id: Uuid,
    #[serde(skip)]
    pub season_id: Uuid,
    pub number: i32,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub is_commissioner: bool,
}

/// Embedded team descriptor stored alongside each game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub code: String,
    pub name: String,
    pub location: String,
}

/// A persisted game row.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub id: Uuid,
    pub week_id: Uuid,
    pub game_key: String,
    pub kickoff: Option<DateTime<Utc>>,
    pub status: GameStatus,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub home_team: TeamInfo,
    pub away_team: TeamInfo,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub winner: Option<Side>,
    pub payload: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// A pick as stored: who picked which side of which game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRecord {
    pub member_id: Uuid,
    pub game_id: Uuid,
    pub chosen_side: Side,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePick {
    pub member_id: Uuid,
    pub chosen_side: Side,
    pub status: PickStatus,
}

impl GamePick {
    pub fn graded(member_id: Uuid, chosen_side: Side, game: &GameRecord) -> Self {
        Self {
            member_id,
            chosen_side,
            status: grade_pick(game.status, game.winner, chosen_side),
        }
    }
}

/// A game as presented on the weekly page, picks embedded and graded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub id: Uuid,
    pub game_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kickoff: Option<DateTime<Utc>>,
    pub location: String,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub channel: String,
    pub home: TeamInfo,
    pub away: TeamInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Side>,
    pub picks: Vec<GamePick>,
}

impl GameView {
    pub fn new(game: GameRecord, picks: Vec<GamePick>) -> Self {
        Self {
            id: game.id,
            game_key: game.game_key,
            kickoff: game.kickoff,
            location: game.location.unwrap_or_default(),
            status: game.status,
            channel: game.channel.unwrap_or_default(),
            home: game.home_team,
            away: game.away_team,
            home_score: game.home_score,
            away_score: game.away_score,
            winner: game.winner,
            picks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TieBreaker {
    pub member_id: Uuid,
    pub week_number: i32,
    pub points: i32,
}

/// The declared outcome of a week. At most one per week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekResult {
    pub season_week_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_member_id: Option<Uuid>,
    pub declared_by_member_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub declared_at: DateTime<Utc>,
}

/// Validated input for a week declaration. Every field replaces the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekDeclaration {
    pub winner_member_id: Option<Uuid>,
    pub declared_by_member_id: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RecordSummary {
    pub wins: u32,
    pub losses: u32,
}

/// A member with their aggregated standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStanding {
    pub id: Uuid,
    pub name: String,
    pub is_commissioner: bool,
    pub season_record: RecordSummary,
    pub last_week_record: RecordSummary,
    pub weeks_won: u32,
    pub tie_breakers: std::collections::BTreeMap<i32, i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    pub season: Season,
    pub weeks: Vec<Week>,
    pub active_week: Week,
    pub members: Vec<MemberStanding>,
    pub games: Vec<GameView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_result: Option<WeekResult>,
}
