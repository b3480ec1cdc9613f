//! Persistence contract for the pool.
//!
//! `PgStore` is the production implementation. Every read goes to storage;
//! nothing is cached in process.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    GameRecord, Member, PickRecord, Season, Side, WeekDeclaration, WeekResult, Week,
};
use crate::reconcile::GameUpsert;
use crate::standings::{PickOutcome, TieBreakerEntry};

#[cfg(test)]
pub(crate) mod memory;
mod postgres;

pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_seasons(&self) -> Result<Vec<Season>>;

    /// Fails with `SeasonNotFound`.
    async fn get_season(&self, season_id: Uuid) -> Result<Season>;

    /// Fails with `SeasonNotFound`.
    async fn get_season_by_key(&self, sports_key: &str) -> Result<Season>;

    /// Weeks of a season ordered by number.
    async fn list_weeks(&self, season_id: Uuid) -> Result<Vec<Week>>;

    /// Fails with `WeekNotFound`.
    async fn get_week(&self, season_id: Uuid, number: i32) -> Result<Week>;

    async fn current_week(&self, season_id: Uuid) -> Result<Option<i32>>;

    async fn set_current_week(&self, season_id: Uuid, number: i32) -> Result<()>;

    /// Every member, ordered by name.
    async fn list_members(&self) -> Result<Vec<Member>>;

    /// Every pick of the season joined with its game's status and winner.
    async fn pick_outcomes(&self, season_id: Uuid) -> Result<Vec<PickOutcome>>;

    /// Winner member of every week result in the season that names one.
    async fn week_winners(&self, season_id: Uuid) -> Result<Vec<Uuid>>;

    async fn tie_breakers(&self, season_id: Uuid) -> Result<Vec<TieBreakerEntry>>;

    /// Games of a week ordered by kickoff (unscheduled last), then game key.
    async fn list_games(&self, week_id: Uuid) -> Result<Vec<GameRecord>>;

    /// Picks on the games of a week.
    async fn list_picks(&self, week_id: Uuid) -> Result<Vec<PickRecord>>;

    /// Fails with `GameNotFound`.
    async fn find_game(&self, game_key: &str) -> Result<GameRecord>;

    /// Insert or replace a member's pick for a game. Fails with `MemberNotFound`.
    async fn upsert_pick(&self, member_id: Uuid, game_id: Uuid, side: Side) -> Result<PickRecord>;

    /// Remove a member's pick on a game of the given week. Returns whether a
    /// pick was removed.
    async fn delete_pick(&self, member_id: Uuid, week_id: Uuid, game_key: &str) -> Result<bool>;

    /// Fails with `MemberNotFound`.
    async fn upsert_tie_breaker(&self, member_id: Uuid, week_id: Uuid, points: i32) -> Result<()>;

    /// Set or clear a game's winner. Setting one also marks the game final.
    /// Fails with `GameNotFound` when the key is not in the week.
    async fn set_game_winner(
        &self,
        week_id: Uuid,
        game_key: &str,
        winner: Option<Side>,
    ) -> Result<GameRecord>;

    async fn get_week_result(&self, week_id: Uuid) -> Result<Option<WeekResult>>;

    /// Full-replace upsert of the week's result; `declared_at` is always refreshed.
    async fn declare_week_result(
        &self,
        week_id: Uuid,
        declaration: &WeekDeclaration,
    ) -> Result<WeekResult>;

    /// Merge a batch of snapshots into the week atomically. Returns the number
    /// of games written; nothing is written if any merge fails.
    async fn reconcile_week(&self, week_id: Uuid, upserts: &[GameUpsert]) -> Result<usize>;

    async fn ensure_member(&self, name: &str, is_commissioner: bool) -> Result<Member>;

    async fn ensure_season(&self, sports_key: &str, label: &str, year: i32) -> Result<Season>;

    async fn ensure_week(&self, season_id: Uuid, number: i32, label: &str) -> Result<Week>;
}
