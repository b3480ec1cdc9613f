//! Merge rules for folding provider snapshots into stored games.
//!
//! Two fields are guarded on conflict: a stored `final` status is never
//! replaced, and a stored winner is only replaced by another winner. Every
//! other column takes the snapshot's value.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{PoolError, Result};
use crate::models::{GameRecord, GameStatus, Side, TeamInfo};
use crate::sportsdata::GameSnapshot;
use crate::teams;

/// One snapshot resolved into the columns the store writes.
#[derive(Debug, Clone, PartialEq)]
pub struct GameUpsert {
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
    pub payload: serde_json::Value,
}

impl GameUpsert {
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Self {
        let payload = serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null);

        Self {
            game_key: snapshot.game_key.trim().to_string(),
            kickoff: snapshot.kickoff,
            status: snapshot.status,
            channel: non_empty(&snapshot.channel),
            location: non_empty(&snapshot.location),
            home_team: teams::lookup(&snapshot.home_team),
            away_team: teams::lookup(&snapshot.away_team),
            home_score: snapshot.home_score,
            away_score: snapshot.away_score,
            winner: derive_winner(snapshot.status, snapshot.home_score, snapshot.away_score),
            payload,
        }
    }
}

/// The side with the strictly higher score of a final game. Ties, missing
/// scores and unfinished games yield no winner.
pub fn derive_winner(
    status: GameStatus,
    home_score: Option<i32>,
    away_score: Option<i32>,
) -> Option<Side> {
    if !status.is_final() {
        return None;
    }
    match (home_score, away_score) {
        (Some(home), Some(away)) if home > away => Some(Side::Home),
        (Some(home), Some(away)) if away > home => Some(Side::Away),
        _ => None,
    }
}

/// Merge an upsert into the existing row for its game key, or build a new row.
pub fn merge(
    existing: Option<GameRecord>,
    week_id: Uuid,
    upsert: &GameUpsert,
    now: DateTime<Utc>,
) -> Result<GameRecord> {
    if upsert.game_key.is_empty() {
        return Err(PoolError::validation("snapshot is missing a game key"));
    }

    let merged = match existing {
        None => GameRecord {
            id: Uuid::new_v4(),
            week_id,
            game_key: upsert.game_key.clone(),
            kickoff: upsert.kickoff,
            status: upsert.status,
            channel: upsert.channel.clone(),
            location: upsert.location.clone(),
            home_team: upsert.home_team.clone(),
            away_team: upsert.away_team.clone(),
            home_score: upsert.home_score,
            away_score: upsert.away_score,
            winner: upsert.winner,
            payload: Some(upsert.payload.clone()),
            updated_at: now,
        },
        Some(current) => GameRecord {
            id: current.id,
            week_id,
            game_key: current.game_key,
            kickoff: upsert.kickoff,
            status: if current.status.is_final() {
                current.status
            } else {
                upsert.status
            },
            channel: upsert.channel.clone(),
            location: upsert.location.clone(),
            home_team: upsert.home_team.clone(),
            away_team: upsert.away_team.clone(),
            home_score: upsert.home_score,
            away_score: upsert.away_score,
            winner: upsert.winner.or(current.winner),
            payload: Some(upsert.payload.clone()),
            updated_at: now,
        },
    };

    Ok(merged)
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
