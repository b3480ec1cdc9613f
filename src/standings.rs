//! Per-member standings derived from raw pick, game and week rows.
//!
//! Everything here is pure: the store loads the rows, this module folds them.

use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::grading::grade_pick;
use crate::models::{GameStatus, Member, MemberStanding, PickStatus, RecordSummary, Side};

/// A member's pick joined with the state of its game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOutcome {
    pub member_id: Uuid,
    pub week_number: i32,
    pub chosen_side: Side,
    pub status: GameStatus,
    pub winner: Option<Side>,
}

/// A tie-breaker guess keyed by week number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieBreakerEntry {
    pub member_id: Uuid,
    pub week_number: i32,
    pub points: i32,
}

/// Season rows the aggregates are computed from.
#[derive(Debug, Default)]
pub struct SeasonRows {
    pub outcomes: Vec<PickOutcome>,
    /// Winner of every week result in the season that names one.
    pub week_winners: Vec<Uuid>,
    pub tie_breakers: Vec<TieBreakerEntry>,
}

impl RecordSummary {
    fn tally(&mut self, outcome: &PickOutcome) {
        match grade_pick(outcome.status, outcome.winner, outcome.chosen_side) {
            PickStatus::Correct => self.wins += 1,
            PickStatus::Incorrect => self.losses += 1,
            PickStatus::Pending => {}
        }
    }
}

/// Build standings for every member, ordered by name.
///
/// `active_week` is the week the page is showing; the last-week record covers
/// `active_week - 1` and stays zero when that is below week 1.
pub fn compute(members: Vec<Member>, rows: &SeasonRows, active_week: i32) -> Vec<MemberStanding> {
    let mut standings: Vec<MemberStanding> = members
        .into_iter()
        .map(|m| MemberStanding {
            id: m.id,
            name: m.name,
            is_commissioner: m.is_commissioner,
            season_record: RecordSummary::default(),
            last_week_record: RecordSummary::default(),
            weeks_won: 0,
            tie_breakers: BTreeMap::new(),
        })
        .collect();
    standings.sort_by(|a, b| a.name.cmp(&b.name));

    let index: HashMap<Uuid, usize> = standings
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, i))
        .collect();

    let last_week = active_week - 1;
    for outcome in &rows.outcomes {
        let Some(&i) = index.get(&outcome.member_id) else {
            continue;
        };
        standings[i].season_record.tally(outcome);
        if last_week >= 1 && outcome.week_number == last_week {
            standings[i].last_week_record.tally(outcome);
        }
    }

    for winner in &rows.week_winners {
        if let Some(&i) = index.get(winner) {
            standings[i].weeks_won += 1;
        }
    }

    for entry in &rows.tie_breakers {
        if let Some(&i) = index.get(&entry.member_id) {
            standings[i].tie_breakers.insert(entry.week_number, entry.points);
        }
    }

    standings
}
