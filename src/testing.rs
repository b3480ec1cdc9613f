//! Shared fixtures for unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::models::{Member, Season, Week};
use crate::sportsdata::{ProviderError, ScoreRecord, SportsProvider};
use crate::store::memory::MemoryStore;
use crate::store::Store;

/// Canned provider. Fails every call when `fail` is set; never answers when
/// `stall` is set.
pub(crate) struct StubProvider {
    pub records: Vec<ScoreRecord>,
    pub current: i32,
    pub fail: bool,
    pub stall: bool,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn with_records(records: Vec<ScoreRecord>) -> Self {
        Self {
            records,
            current: 1,
            fail: false,
            stall: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_records(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::with_records(Vec::new())
        }
    }

    fn outage(&self) -> ProviderError {
        ProviderError::Status {
            status: 503,
            body: "service unavailable".into(),
        }
    }
}

#[async_trait]
impl SportsProvider for StubProvider {
    async fn scores_by_week(
        &self,
        _season_key: &str,
        _week: i32,
    ) -> Result<Vec<ScoreRecord>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(self.outage());
        }
        Ok(self.records.clone())
    }

    async fn current_week(&self) -> Result<i32, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(self.outage());
        }
        Ok(self.current)
    }
}

pub(crate) fn score(
    key: &str,
    status: &str,
    home_score: Option<i32>,
    away_score: Option<i32>,
) -> ScoreRecord {
    ScoreRecord {
        game_key: Some(key.to_string()),
        season: Some(2024),
        week: Some(1),
        date_time_utc: Some("2024-09-06T00:20:00Z".to_string()),
        channel: Some("NBC".to_string()),
        home_team: Some("KC".to_string()),
        away_team: Some("BAL".to_string()),
        home_score,
        away_score,
        status: Some(status.to_string()),
        ..Default::default()
    }
}

pub(crate) struct Seeded {
    pub store: Arc<MemoryStore>,
    pub season: Season,
    pub weeks: Vec<Week>,
    pub alice: Member,
    pub bob: Member,
}

/// A 2024 regular season with 18 weeks and two members.
pub(crate) async fn seeded() -> Seeded {
    let store = Arc::new(MemoryStore::new());
    let season = store
        .ensure_season("2024REG", "2024 Regular Season", 2024)
        .await
        .unwrap();
    let mut weeks = Vec::new();
    for number in 1..=18 {
        weeks.push(
            store
                .ensure_week(season.id, number, &format!("Week {number}"))
                .await
                .unwrap(),
        );
    }
    let alice = store.ensure_member("Alice", true).await.unwrap();
    let bob = store.ensure_member("Bob", false).await.unwrap();

    Seeded {
        store,
        season,
        weeks,
        alice,
        bob,
    }
}
