//! In-memory `Store` for unit tests. Enforces the same keys and references
//! as the Postgres schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::Store;
use crate::error::{PoolError, Result};
use crate::models::{
    GameRecord, Member, PickRecord, Season, Side, WeekDeclaration, WeekResult, Week,
};
use crate::reconcile::{self, GameUpsert};
use crate::standings::{PickOutcome, TieBreakerEntry};

#[derive(Default)]
struct State {
    seasons: Vec<Season>,
    current_weeks: HashMap<Uuid, i32>,
    weeks: Vec<Week>,
    members: Vec<Member>,
    games: HashMap<String, GameRecord>,
    picks: HashMap<(Uuid, Uuid), StoredPick>,
    tie_breakers: HashMap<(Uuid, Uuid), i32>,
    results: HashMap<Uuid, WeekResult>,
}

#[derive(Clone)]
struct StoredPick {
    record: PickRecord,
    created_at: DateTime<Utc>,
}

impl State {
    fn member_exists(&self, id: Uuid) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    fn week(&self, week_id: Uuid) -> Option<&Week> {
        self.weeks.iter().find(|w| w.id == week_id)
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
    reconcile_calls: Mutex<usize>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of `reconcile_week` calls, successful or not.
    pub(crate) fn reconcile_calls(&self) -> usize {
        *self.reconcile_calls.lock().unwrap()
    }

    pub(crate) fn game_count(&self) -> usize {
        self.state.lock().unwrap().games.len()
    }

    pub(crate) fn result_count(&self) -> usize {
        self.state.lock().unwrap().results.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_seasons(&self) -> Result<Vec<Season>> {
        let mut seasons = self.state.lock().unwrap().seasons.clone();
        seasons.sort_by(|a, b| b.year.cmp(&a.year));
        Ok(seasons)
    }

    async fn get_season(&self, season_id: Uuid) -> Result<Season> {
        let state = self.state.lock().unwrap();
        state
            .seasons
            .iter()
            .find(|s| s.id == season_id)
            .cloned()
            .ok_or_else(|| PoolError::SeasonNotFound(season_id.to_string()))
    }

    async fn get_season_by_key(&self, sports_key: &str) -> Result<Season> {
        let state = self.state.lock().unwrap();
        state
            .seasons
            .iter()
            .find(|s| s.sports_data_season_key == sports_key.trim())
            .cloned()
            .ok_or_else(|| PoolError::SeasonNotFound(sports_key.to_string()))
    }

    async fn list_weeks(&self, season_id: Uuid) -> Result<Vec<Week>> {
        let state = self.state.lock().unwrap();
        let mut weeks: Vec<Week> = state
            .weeks
            .iter()
            .filter(|w| w.season_id == season_id)
            .cloned()
            .collect();
        weeks.sort_by_key(|w| w.number);
        Ok(weeks)
    }

    async fn get_week(&self, season_id: Uuid, number: i32) -> Result<Week> {
        let state = self.state.lock().unwrap();
        state
            .weeks
            .iter()
            .find(|w| w.season_id == season_id && w.number == number)
            .cloned()
            .ok_or_else(|| PoolError::WeekNotFound {
                season: season_id.to_string(),
                week: number,
            })
    }

    async fn current_week(&self, season_id: Uuid) -> Result<Option<i32>> {
        Ok(self.state.lock().unwrap().current_weeks.get(&season_id).copied())
    }

    async fn set_current_week(&self, season_id: Uuid, number: i32) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .current_weeks
            .insert(season_id, number);
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<Member>> {
        let mut members = self.state.lock().unwrap().members.clone();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    async fn pick_outcomes(&self, season_id: Uuid) -> Result<Vec<PickOutcome>> {
        let state = self.state.lock().unwrap();
        let mut outcomes = Vec::new();
        for pick in state.picks.values().map(|p| &p.record) {
            let Some(game) = state.games.values().find(|g| g.id == pick.game_id) else {
                continue;
            };
            let Some(week) = state.week(game.week_id) else {
                continue;
            };
            if week.season_id != season_id {
                continue;
            }
            outcomes.push(PickOutcome {
                member_id: pick.member_id,
                week_number: week.number,
                chosen_side: pick.chosen_side,
                status: game.status,
                winner: game.winner,
            });
        }
        Ok(outcomes)
    }

    async fn week_winners(&self, season_id: Uuid) -> Result<Vec<Uuid>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .results
            .values()
            .filter(|r| state.week(r.season_week_id).map(|w| w.season_id) == Some(season_id))
            .filter_map(|r| r.winner_member_id)
            .collect())
    }

    async fn tie_breakers(&self, season_id: Uuid) -> Result<Vec<TieBreakerEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tie_breakers
            .iter()
            .filter_map(|(&(member_id, week_id), &points)| {
                let week = state.week(week_id)?;
                (week.season_id == season_id).then_some(TieBreakerEntry {
                    member_id,
                    week_number: week.number,
                    points,
                })
            })
            .collect())
    }

    async fn list_games(&self, week_id: Uuid) -> Result<Vec<GameRecord>> {
        let state = self.state.lock().unwrap();
        let mut games: Vec<GameRecord> = state
            .games
            .values()
            .filter(|g| g.week_id == week_id)
            .cloned()
            .collect();
        games.sort_by(|a, b| {
            (a.kickoff.is_none(), a.kickoff, &a.game_key)
                .cmp(&(b.kickoff.is_none(), b.kickoff, &b.game_key))
        });
        Ok(games)
    }

    async fn list_picks(&self, week_id: Uuid) -> Result<Vec<PickRecord>> {
        let state = self.state.lock().unwrap();
        let mut picks: Vec<&StoredPick> = state
            .picks
            .values()
            .filter(|p| {
                state
                    .games
                    .values()
                    .any(|g| g.id == p.record.game_id && g.week_id == week_id)
            })
            .collect();
        picks.sort_by_key(|p| (p.created_at, p.record.member_id));
        Ok(picks.into_iter().map(|p| p.record.clone()).collect())
    }

    async fn find_game(&self, game_key: &str) -> Result<GameRecord> {
        self.state
            .lock()
            .unwrap()
            .games
            .get(game_key)
            .cloned()
            .ok_or_else(|| PoolError::GameNotFound(game_key.to_string()))
    }

    async fn upsert_pick(&self, member_id: Uuid, game_id: Uuid, side: Side) -> Result<PickRecord> {
        let mut state = self.state.lock().unwrap();
        if !state.member_exists(member_id) {
            return Err(PoolError::MemberNotFound(member_id.to_string()));
        }
        let now = Utc::now();
        let pick = PickRecord {
            member_id,
            game_id,
            chosen_side: side,
            updated_at: now,
        };
        let created_at = state
            .picks
            .get(&(member_id, game_id))
            .map_or(now, |p| p.created_at);
        state.picks.insert(
            (member_id, game_id),
            StoredPick {
                record: pick.clone(),
                created_at,
            },
        );
        Ok(pick)
    }

    async fn delete_pick(&self, member_id: Uuid, week_id: Uuid, game_key: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(game_id) = state
            .games
            .get(game_key)
            .filter(|g| g.week_id == week_id)
            .map(|g| g.id)
        else {
            return Ok(false);
        };
        Ok(state.picks.remove(&(member_id, game_id)).is_some())
    }

    async fn upsert_tie_breaker(&self, member_id: Uuid, week_id: Uuid, points: i32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.member_exists(member_id) {
            return Err(PoolError::MemberNotFound(member_id.to_string()));
        }
        state.tie_breakers.insert((member_id, week_id), points);
        Ok(())
    }

    async fn set_game_winner(
        &self,
        week_id: Uuid,
        game_key: &str,
        winner: Option<Side>,
    ) -> Result<GameRecord> {
        let mut state = self.state.lock().unwrap();
        let game = state
            .games
            .get_mut(game_key)
            .filter(|g| g.week_id == week_id)
            .ok_or_else(|| PoolError::GameNotFound(game_key.to_string()))?;
        game.winner = winner;
        if winner.is_some() {
            game.status = crate::models::GameStatus::Final;
        }
        game.updated_at = Utc::now();
        Ok(game.clone())
    }

    async fn get_week_result(&self, week_id: Uuid) -> Result<Option<WeekResult>> {
        Ok(self.state.lock().unwrap().results.get(&week_id).cloned())
    }

    async fn declare_week_result(
        &self,
        week_id: Uuid,
        declaration: &WeekDeclaration,
    ) -> Result<WeekResult> {
        let mut state = self.state.lock().unwrap();
        for id in std::iter::once(declaration.declared_by_member_id)
            .chain(declaration.winner_member_id)
        {
            if !state.member_exists(id) {
                return Err(PoolError::MemberNotFound(id.to_string()));
            }
        }
        let result = WeekResult {
            season_week_id: week_id,
            winner_member_id: declaration.winner_member_id,
            declared_by_member_id: declaration.declared_by_member_id,
            notes: declaration.notes.clone(),
            declared_at: Utc::now(),
        };
        state.results.insert(week_id, result.clone());
        Ok(result)
    }

    async fn reconcile_week(&self, week_id: Uuid, upserts: &[GameUpsert]) -> Result<usize> {
        *self.reconcile_calls.lock().unwrap() += 1;
        let mut state = self.state.lock().unwrap();
        let mut games = state.games.clone();
        let now = Utc::now();
        for upsert in upserts {
            let existing = games.get(&upsert.game_key).cloned();
            let game = reconcile::merge(existing, week_id, upsert, now)?;
            games.insert(game.game_key.clone(), game);
        }
        state.games = games;
        Ok(upserts.len())
    }

    async fn ensure_member(&self, name: &str, is_commissioner: bool) -> Result<Member> {
        let mut state = self.state.lock().unwrap();
        if let Some(member) = state.members.iter_mut().find(|m| m.name == name) {
            member.is_commissioner = is_commissioner;
            return Ok(member.clone());
        }
        let member = Member {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_commissioner,
        };
        state.members.push(member.clone());
        Ok(member)
    }

    async fn ensure_season(&self, sports_key: &str, label: &str, year: i32) -> Result<Season> {
        let mut state = self.state.lock().unwrap();
        if let Some(season) = state
            .seasons
            .iter()
            .find(|s| s.sports_data_season_key == sports_key)
        {
            return Ok(season.clone());
        }
        let season = Season {
            id: Uuid::new_v4(),
            label: label.to_string(),
            year,
            sports_data_season_key: sports_key.to_string(),
        };
        state.seasons.push(season.clone());
        Ok(season)
    }

    async fn ensure_week(&self, season_id: Uuid, number: i32, label: &str) -> Result<Week> {
        let mut state = self.state.lock().unwrap();
        if let Some(week) = state
            .weeks
            .iter_mut()
            .find(|w| w.season_id == season_id && w.number == number)
        {
            week.label = label.to_string();
            return Ok(week.clone());
        }
        let week = Week {
            id: Uuid::new_v4(),
            season_id,
            number,
            label: label.to_string(),
            starts_at: None,
            ends_at: None,
        };
        state.weeks.push(week.clone());
        Ok(week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{score, seeded};
    use std::time::Duration;

    #[tokio::test]
    async fn picks_keep_their_first_entry_order() {
        let seed = seeded().await;
        let store = seed.store;
        let week = seed.weeks[0].id;
        let upsert = GameUpsert::from_snapshot(&score("G1", "Scheduled", None, None).to_snapshot());
        store.reconcile_week(week, &[upsert]).await.unwrap();
        let game_id = store.find_game("G1").await.unwrap().id;

        store.upsert_pick(seed.alice.id, game_id, Side::Home).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.upsert_pick(seed.bob.id, game_id, Side::Away).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.upsert_pick(seed.alice.id, game_id, Side::Away).await.unwrap();

        let picks = store.list_picks(week).await.unwrap();
        let order: Vec<Uuid> = picks.iter().map(|p| p.member_id).collect();
        assert_eq!(order, vec![seed.alice.id, seed.bob.id]);
        assert_eq!(picks[0].chosen_side, Side::Away);
    }
}
