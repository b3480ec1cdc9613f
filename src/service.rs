//! Operations exposed to the request layer.
//!
//! Inputs arrive as loosely-typed strings and are validated here before any
//! storage call. Page assembly lives here too, along with the one side effect
//! a read may trigger: a sync of a week that has no games yet.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PoolError, Result};
use crate::models::{
    GamePick, GameView, PageData, Season, Side, TieBreaker, Week, WeekDeclaration, WeekResult,
};
use crate::reconcile::GameUpsert;
use crate::sportsdata::{ProviderError, SportsProvider};
use crate::standings::{self, SeasonRows};
use crate::store::Store;

/// Outcome of an explicit sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub week: i32,
    pub synced_games: usize,
}

/// Raw week-declaration input.
#[derive(Debug, Clone, Default)]
pub struct DeclareInput {
    pub winner_member_id: Option<String>,
    pub declared_by_member_id: String,
    pub notes: Option<String>,
}

pub struct PoolService {
    store: Arc<dyn Store>,
    provider: Option<Arc<dyn SportsProvider>>,
    auto_sync: bool,
}

impl PoolService {
    /// `provider` is `None` when no API key is configured.
    pub fn new(
        store: Arc<dyn Store>,
        provider: Option<Arc<dyn SportsProvider>>,
        auto_sync: bool,
    ) -> Self {
        Self {
            store,
            provider,
            auto_sync,
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn list_seasons(&self) -> Result<Vec<Season>> {
        self.store.list_seasons().await
    }

    pub async fn list_weeks(&self, season_id: &str) -> Result<Vec<Week>> {
        let season_id = parse_id(season_id, "season id")?;
        self.store.get_season(season_id).await?;
        self.store.list_weeks(season_id).await
    }

    /// Assemble the weekly page. When the resolved week has no games and
    /// automatic sync is on, one sync is attempted first; its failure is
    /// logged and the unsynced page is returned.
    pub async fn page_data(&self, season_id: &str, week: i32) -> Result<PageData> {
        let season_id = parse_id(season_id, "season id")?;
        let page = self.assemble_page(season_id, week).await?;
        self.sync_if_empty(page).await
    }

    async fn sync_if_empty(&self, page: PageData) -> Result<PageData> {
        if !page.games.is_empty() || !self.auto_sync || self.provider.is_none() {
            return Ok(page);
        }

        match self.sync_resolved(&page.season, &page.active_week).await {
            Ok(0) => Ok(page),
            Ok(_) => {
                match self
                    .assemble_page(page.season.id, page.active_week.number)
                    .await
                {
                    Ok(reloaded) => Ok(reloaded),
                    Err(e) => {
                        warn!("Failed to reload page after sync: {}", e);
                        Ok(page)
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Automatic sync for {} week {} failed: {}",
                    page.season.sports_data_season_key, page.active_week.number, e
                );
                Ok(page)
            }
        }
    }

    async fn assemble_page(&self, season_id: Uuid, requested_week: i32) -> Result<PageData> {
        let season = self.store.get_season(season_id).await?;
        let weeks = self.store.list_weeks(season_id).await?;
        let active_week = resolve_active_week(&weeks, requested_week)
            .ok_or_else(|| PoolError::SeasonHasNoWeeks(season_id.to_string()))?
            .clone();

        let records = self.store.list_games(active_week.id).await?;
        let mut picks_by_game: HashMap<Uuid, Vec<GamePick>> = HashMap::new();
        let picks = self.store.list_picks(active_week.id).await?;
        for game in &records {
            for pick in picks.iter().filter(|p| p.game_id == game.id) {
                picks_by_game
                    .entry(game.id)
                    .or_default()
                    .push(GamePick::graded(pick.member_id, pick.chosen_side, game));
            }
        }
        let games = records
            .into_iter()
            .map(|game| {
                let picks = picks_by_game.remove(&game.id).unwrap_or_default();
                GameView::new(game, picks)
            })
            .collect();

        let rows = SeasonRows {
            outcomes: self.store.pick_outcomes(season_id).await?,
            week_winners: self.store.week_winners(season_id).await?,
            tie_breakers: self.store.tie_breakers(season_id).await?,
        };
        let members = standings::compute(
            self.store.list_members().await?,
            &rows,
            active_week.number,
        );
        let week_result = self.store.get_week_result(active_week.id).await?;

        Ok(PageData {
            season,
            weeks,
            active_week,
            members,
            games,
            week_result,
        })
    }

    /// Record a member's pick and return it graded against the game's state.
    pub async fn upsert_pick(
        &self,
        season_id: &str,
        week: i32,
        member_id: &str,
        game_key: &str,
        side: &str,
    ) -> Result<GamePick> {
        let season_id = parse_id(season_id, "season id")?;
        validate_week(week)?;
        let member_id = parse_id(member_id, "member id")?;
        let game_key = required(game_key, "game key")?;
        let side: Side = side.parse()?;

        let week = self.store.get_week(season_id, week).await?;
        let game = self.store.find_game(game_key).await?;
        if game.week_id != week.id {
            return Err(PoolError::GameNotFound(game_key.to_string()));
        }

        let pick = self.store.upsert_pick(member_id, game.id, side).await?;
        Ok(GamePick::graded(pick.member_id, pick.chosen_side, &game))
    }

    /// Returns whether a pick existed.
    pub async fn delete_pick(
        &self,
        season_id: &str,
        week: i32,
        member_id: &str,
        game_key: &str,
    ) -> Result<bool> {
        let season_id = parse_id(season_id, "season id")?;
        validate_week(week)?;
        let member_id = parse_id(member_id, "member id")?;
        let game_key = required(game_key, "game key")?;

        let week = self.store.get_week(season_id, week).await?;
        self.store.delete_pick(member_id, week.id, game_key).await
    }

    pub async fn upsert_tie_breaker(
        &self,
        season_id: &str,
        week: i32,
        member_id: &str,
        points: i32,
    ) -> Result<TieBreaker> {
        let season_id = parse_id(season_id, "season id")?;
        validate_week(week)?;
        let member_id = parse_id(member_id, "member id")?;
        if points < 0 {
            return Err(PoolError::validation(format!(
                "points must not be negative, got {points}"
            )));
        }

        let week = self.store.get_week(season_id, week).await?;
        self.store
            .upsert_tie_breaker(member_id, week.id, points)
            .await?;
        Ok(TieBreaker {
            member_id,
            week_number: week.number,
            points,
        })
    }

    /// Set a game's winner by hand. A blank or missing winner clears it.
    pub async fn set_game_winner(
        &self,
        season_id: &str,
        week: i32,
        game_key: &str,
        winner: Option<&str>,
    ) -> Result<GameView> {
        let season_id = parse_id(season_id, "season id")?;
        validate_week(week)?;
        let game_key = required(game_key, "game key")?;
        let winner = match winner.map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<Side>()?),
        };

        let week = self.store.get_week(season_id, week).await?;
        let game = self.store.set_game_winner(week.id, game_key, winner).await?;
        info!("Game {} winner set to {:?}", game.game_key, game.winner);

        let picks = self
            .store
            .list_picks(week.id)
            .await?
            .into_iter()
            .filter(|p| p.game_id == game.id)
            .map(|p| GamePick::graded(p.member_id, p.chosen_side, &game))
            .collect();
        Ok(GameView::new(game, picks))
    }

    /// Declare (or re-declare) the winner of a week. Every call replaces the
    /// stored result.
    pub async fn declare_week_winner(
        &self,
        season_id: &str,
        week: i32,
        input: DeclareInput,
    ) -> Result<WeekResult> {
        let season_id = parse_id(season_id, "season id")?;
        validate_week(week)?;
        let declared_by_member_id = parse_id(&input.declared_by_member_id, "declaring member id")?;
        let winner_member_id = match input.winner_member_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(parse_id(value, "winner member id")?),
        };
        let declaration = WeekDeclaration {
            winner_member_id,
            declared_by_member_id,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
        };

        let week = self.store.get_week(season_id, week).await?;
        let result = self
            .store
            .declare_week_result(week.id, &declaration)
            .await?;
        info!(
            "Week {} winner declared by {}",
            week.number, result.declared_by_member_id
        );
        Ok(result)
    }

    /// Fetch the week from the provider and reconcile it into storage.
    pub async fn sync_week(&self, season_id: &str, week: i32) -> Result<SyncSummary> {
        if self.provider.is_none() {
            return Err(PoolError::ProviderNotConfigured);
        }
        let season_id = parse_id(season_id, "season id")?;
        validate_week(week)?;

        let season = self.store.get_season(season_id).await?;
        let week = self.store.get_week(season_id, week).await?;
        let synced_games = self.sync_resolved(&season, &week).await?;

        Ok(SyncSummary {
            week: week.number,
            synced_games,
        })
    }

    async fn sync_resolved(&self, season: &Season, week: &Week) -> Result<usize> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(PoolError::ProviderNotConfigured)?;
        let season_key = season.sports_data_season_key.trim();
        if season_key.is_empty() {
            return Err(PoolError::SeasonKeyMissing(season.id.to_string()));
        }

        let records = provider
            .scores_by_week(season_key, week.number)
            .await
            .map_err(upstream)?;
        let upserts: Vec<GameUpsert> = records
            .iter()
            .map(|record| GameUpsert::from_snapshot(&record.to_snapshot()))
            .collect();

        self.store.reconcile_week(week.id, &upserts).await
    }

    /// The season's active week, defaulting to 1 when none is stored.
    pub async fn current_week(&self, season_id: &str) -> Result<i32> {
        let season_id = parse_id(season_id, "season id")?;
        self.store.get_season(season_id).await?;
        let stored = self.store.current_week(season_id).await?;
        Ok(stored.filter(|w| *w > 0).unwrap_or(1))
    }

    pub async fn set_current_week(&self, season_id: Uuid, week: i32) -> Result<()> {
        validate_week(week)?;
        self.store.set_current_week(season_id, week).await
    }

    /// Ask the provider for the league's current week and store it on the
    /// season with the given provider key.
    pub async fn refresh_current_week(&self, season_key: &str) -> Result<i32> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(PoolError::ProviderNotConfigured)?;
        let season = self.store.get_season_by_key(season_key).await?;
        let week = provider.current_week().await.map_err(upstream)?;
        self.set_current_week(season.id, week).await?;
        info!(
            "Current week for {} set to {}",
            season.sports_data_season_key, week
        );
        Ok(week)
    }
}

/// Pick the week a page shows: the first week for non-positive requests, the
/// exact match when present, otherwise the last week of the season.
pub fn resolve_active_week(weeks: &[Week], requested: i32) -> Option<&Week> {
    if requested <= 0 {
        return weeks.first();
    }
    weeks.iter().find(|w| w.number == requested).or_else(|| {
        debug!("Week {} not found, falling back to last week", requested);
        weeks.last()
    })
}

fn upstream(err: ProviderError) -> PoolError {
    PoolError::Upstream(err.to_string())
}

fn validate_week(week: i32) -> Result<()> {
    if week <= 0 {
        return Err(PoolError::validation(format!(
            "week must be positive, got {week}"
        )));
    }
    Ok(())
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PoolError::validation(format!("{field} is required")));
    }
    Ok(value)
}

fn parse_id(value: &str, field: &str) -> Result<Uuid> {
    let value = required(value, field)?;
    Uuid::parse_str(value).map_err(|_| PoolError::validation(format!("{field} is not a valid id")))
}
