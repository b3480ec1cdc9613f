//! Seeds the reference data the pages need: the member roster, the configured
//! season, and its regular-season weeks. Safe to run on every start.

use tracing::info;

use crate::error::{PoolError, Result};
use crate::models::Season;
use crate::store::Store;

pub const REGULAR_SEASON_WEEKS: i32 = 18;

#[derive(Debug)]
pub struct BootstrapSummary {
    pub members: usize,
    pub season: Season,
    pub weeks: usize,
}

pub async fn run(
    store: &dyn Store,
    season_key: &str,
    members: &[String],
    commissioner: Option<&str>,
) -> Result<BootstrapSummary> {
    let members = ensure_members(store, members, commissioner).await?;

    let season_key = season_key.trim();
    if season_key.is_empty() {
        return Err(PoolError::validation("season key must be provided"));
    }
    let (year, label) = season_label(season_key)?;
    let season = match store.get_season_by_key(season_key).await {
        Ok(season) => season,
        Err(e) if e.is_not_found() => store.ensure_season(season_key, &label, year).await?,
        Err(e) => return Err(e),
    };

    for number in 1..=REGULAR_SEASON_WEEKS {
        store
            .ensure_week(season.id, number, &format!("Week {number}"))
            .await?;
    }

    info!(
        "Bootstrap complete: {} members, season {} with {} weeks",
        members, season.label, REGULAR_SEASON_WEEKS
    );

    Ok(BootstrapSummary {
        members,
        season,
        weeks: REGULAR_SEASON_WEEKS as usize,
    })
}

async fn ensure_members(
    store: &dyn Store,
    members: &[String],
    commissioner: Option<&str>,
) -> Result<usize> {
    let names: Vec<&str> = members
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return Err(PoolError::validation(
            "at least one family member must be configured",
        ));
    }

    for name in &names {
        let is_commissioner =
            commissioner.is_some_and(|c| c.trim().eq_ignore_ascii_case(name));
        store.ensure_member(name, is_commissioner).await?;
    }
    Ok(names.len())
}

/// Split a provider season key such as `2024REG` into its year and a
/// display label.
pub fn season_label(season_key: &str) -> Result<(i32, String)> {
    let digits = season_key
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 {
        return Err(PoolError::validation(format!(
            "season key {season_key:?} does not start with a year"
        )));
    }

    let year: i32 = season_key[..digits].parse().map_err(|_| {
        PoolError::validation(format!("invalid season year in key {season_key:?}"))
    })?;

    let suffix = season_key[digits..].trim().to_uppercase();
    let label = match suffix.as_str() {
        "" | "REG" => format!("{year} Regular Season"),
        "POST" => format!("{year} Postseason"),
        "PRE" => format!("{year} Preseason"),
        other => format!("{year} {other}"),
    };
    Ok((year, label))
}
