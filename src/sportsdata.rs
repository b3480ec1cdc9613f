//! SportsData.io NFL client and snapshot normalization.
//!
//! The provider hands back loosely-typed score records. `ScoreRecord::to_snapshot`
//! turns one into the canonical `GameSnapshot` the reconciler consumes; it does
//! no I/O and never fails.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::GameStatus;

pub const DEFAULT_BASE_URL: &str = "https://api.sportsdata.io/v3/nfl";

/// Longest slice of an error body kept in `ProviderError::Status`.
const MAX_ERROR_BODY: usize = 4096;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("invalid provider request: {0}")]
    InvalidRequest(String),

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The two calls the pool needs from a sports data provider.
#[async_trait]
pub trait SportsProvider: Send + Sync {
    /// Every game of one week of a season, in provider form.
    async fn scores_by_week(
        &self,
        season_key: &str,
        week: i32,
    ) -> Result<Vec<ScoreRecord>, ProviderError>;

    /// The league's currently active week number.
    async fn current_week(&self) -> Result<i32, ProviderError>;
}

/// Raw ScoresByWeek record.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ScoreRecord {
    #[serde(rename = "GameKey")]
    pub game_key: Option<String>,
    #[serde(rename = "Season")]
    pub season: Option<i32>,
    #[serde(rename = "Week")]
    pub week: Option<i32>,
    #[serde(rename = "DateTime")]
    pub date_time: Option<String>,
    #[serde(rename = "DateTimeUTC")]
    pub date_time_utc: Option<String>,
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Channel")]
    pub channel: Option<String>,
    #[serde(rename = "HomeTeam")]
    pub home_team: Option<String>,
    #[serde(rename = "AwayTeam")]
    pub away_team: Option<String>,
    #[serde(rename = "HomeScore")]
    pub home_score: Option<i32>,
    #[serde(rename = "AwayScore")]
    pub away_score: Option<i32>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "StadiumDetails")]
    pub stadium: Option<StadiumDetails>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct StadiumDetails {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
}

/// Canonical, provider-agnostic view of one game at sync time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game_key: String,
    pub season: i32,
    pub week: i32,
    pub kickoff: Option<DateTime<Utc>>,
    pub channel: String,
    pub location: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: GameStatus,
}

impl ScoreRecord {
    pub fn to_snapshot(&self) -> GameSnapshot {
        let kickoff = first_non_empty(&[
            self.date_time_utc.as_deref(),
            self.date_time.as_deref(),
            self.date.as_deref(),
        ])
        .and_then(parse_kickoff);

        let location = match &self.stadium {
            Some(stadium) => compose_location(stadium.name.as_deref(), stadium.city.as_deref()),
            None => String::new(),
        };

        GameSnapshot {
            game_key: self.game_key.clone().unwrap_or_default(),
            season: self.season.unwrap_or_default(),
            week: self.week.unwrap_or_default(),
            kickoff,
            channel: self.channel.clone().unwrap_or_default(),
            location,
            home_team: self.home_team.clone().unwrap_or_default(),
            away_team: self.away_team.clone().unwrap_or_default(),
            home_score: self.home_score,
            away_score: self.away_score,
            status: normalize_status(self.status.as_deref().unwrap_or_default()),
        }
    }
}

/// Map the provider's free-form status onto the canonical vocabulary.
pub fn normalize_status(raw: &str) -> GameStatus {
    match raw.trim().to_lowercase().as_str() {
        "inprogress" | "in-progress" | "in progress" | "playing" => GameStatus::InProgress,
        "final" | "complete" | "completed" => GameStatus::Final,
        _ => GameStatus::Scheduled,
    }
}

/// Parse an offset-qualified timestamp, or a bare local timestamp read as UTC.
pub fn parse_kickoff(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// `"<stadium> (<city>)"`, or whichever half is present.
pub fn compose_location(name: Option<&str>, city: Option<&str>) -> String {
    let name = name.map(str::trim).filter(|s| !s.is_empty());
    let city = city.map(str::trim).filter(|s| !s.is_empty());
    match (name, city) {
        (Some(name), Some(city)) => format!("{name} ({city})"),
        (Some(name), None) => name.to_string(),
        (None, Some(city)) => city.to_string(),
        (None, None) => String::new(),
    }
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|value| !value.trim().is_empty())
}

/// HTTP client for the SportsData.io NFL feed.
pub struct SportsDataClient {
    api_key: String,
    base_url: String,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl SportsDataClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        requests_per_minute: u32,
    ) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()?;

        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            api_key,
            base_url: base_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/scores/json/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("api key must be provided".into()));
        }

        self.rate_limiter.until_ready().await;

        let response = self
            .http_client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("key", &self.api_key)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SportsProvider for SportsDataClient {
    async fn scores_by_week(
        &self,
        season_key: &str,
        week: i32,
    ) -> Result<Vec<ScoreRecord>, ProviderError> {
        let season_key = season_key.trim();
        if season_key.is_empty() {
            return Err(ProviderError::InvalidRequest("season key must be provided".into()));
        }
        if week <= 0 {
            return Err(ProviderError::InvalidRequest(format!(
                "week must be positive, got {week}"
            )));
        }

        let url = self.endpoint(&format!("ScoresByWeek/{season_key}/{week}"));
        let records: Vec<ScoreRecord> = self.get_json(&url).await?;

        info!(
            "Fetched {} games for {} week {} from SportsData",
            records.len(),
            season_key,
            week
        );
        Ok(records)
    }

    async fn current_week(&self) -> Result<i32, ProviderError> {
        let url = self.endpoint("CurrentWeek");
        let week: i32 = self.get_json(&url).await?;
        debug!("SportsData reports current week {}", week);
        Ok(week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_vocabulary_is_normalized() {
        for raw in ["InProgress", "in-progress", "In Progress", "PLAYING"] {
            assert_eq!(normalize_status(raw), GameStatus::InProgress, "{raw}");
        }
        for raw in ["Final", "complete", "Completed", " final "] {
            assert_eq!(normalize_status(raw), GameStatus::Final, "{raw}");
        }
        for raw in ["Scheduled", "Postponed", "F/OT", ""] {
            assert_eq!(normalize_status(raw), GameStatus::Scheduled, "{raw}");
        }
    }

    #[test]
    fn kickoff_accepts_offset_and_bare_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 9, 6, 0, 20, 0).unwrap();
        assert_eq!(parse_kickoff("2024-09-06T00:20:00Z"), Some(expected));
        assert_eq!(parse_kickoff("2024-09-05T20:20:00-04:00"), Some(expected));
        assert_eq!(parse_kickoff("2024-09-06T00:20:00"), Some(expected));
        assert_eq!(parse_kickoff("next thursday"), None);
        assert_eq!(parse_kickoff("   "), None);
    }

    #[test]
    fn kickoff_prefers_utc_candidate() {
        let record = ScoreRecord {
            date_time_utc: Some("2024-09-06T00:20:00".into()),
            date_time: Some("2024-09-05T20:20:00".into()),
            date: Some("2024-09-05T00:00:00".into()),
            ..Default::default()
        };
        let snapshot = record.to_snapshot();
        assert_eq!(
            snapshot.kickoff,
            Some(Utc.with_ymd_and_hms(2024, 9, 6, 0, 20, 0).unwrap())
        );
    }

    #[test]
    fn kickoff_skips_empty_candidates() {
        let record = ScoreRecord {
            date_time_utc: Some(String::new()),
            date_time: None,
            date: Some("2024-09-08T00:00:00".into()),
            ..Default::default()
        };
        assert_eq!(
            record.to_snapshot().kickoff,
            Some(Utc.with_ymd_and_hms(2024, 9, 8, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn location_composition() {
        assert_eq!(
            compose_location(Some("Arrowhead Stadium"), Some("Kansas City")),
            "Arrowhead Stadium (Kansas City)"
        );
        assert_eq!(compose_location(Some("Lambeau Field"), None), "Lambeau Field");
        assert_eq!(compose_location(None, Some("Green Bay")), "Green Bay");
        assert_eq!(compose_location(Some(" "), None), "");
        assert_eq!(compose_location(None, None), "");
    }

    #[test]
    fn provider_payload_normalizes() {
        let body = r#"[{
            "GameKey": "202410114",
            "Season": 2024,
            "Week": 1,
            "DateTime": "2024-09-05T20:20:00",
            "DateTimeUTC": "2024-09-06T00:20:00",
            "Channel": "NBC",
            "HomeTeam": "KC",
            "AwayTeam": "BAL",
            "HomeScore": 27,
            "AwayScore": 20,
            "Status": "Final",
            "StadiumDetails": {"Name": "GEHA Field at Arrowhead Stadium", "City": "Kansas City", "State": "MO", "Country": "USA"}
        }, {
            "GameKey": "202410115",
            "Season": 2024,
            "Week": 1,
            "HomeTeam": "PHI",
            "AwayTeam": "GB",
            "HomeScore": null,
            "AwayScore": null,
            "Status": "Scheduled",
            "StadiumDetails": null
        }]"#;

        let records: Vec<ScoreRecord> = serde_json::from_str(body).unwrap();
        let first = records[0].to_snapshot();
        assert_eq!(first.game_key, "202410114");
        assert_eq!(first.status, GameStatus::Final);
        assert_eq!(first.location, "GEHA Field at Arrowhead Stadium (Kansas City)");
        assert_eq!(first.channel, "NBC");
        assert_eq!((first.home_score, first.away_score), (Some(27), Some(20)));

        let second = records[1].to_snapshot();
        assert_eq!(second.kickoff, None);
        assert_eq!(second.location, "");
        assert_eq!(second.channel, "");
        assert_eq!(second.home_score, None);
    }

    #[tokio::test]
    async fn invalid_requests_fail_before_any_io() {
        let client = SportsDataClient::new("key".into(), None, 30).unwrap();
        let err = client.scores_by_week("", 1).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        let err = client.scores_by_week("2024REG", 0).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client =
            SportsDataClient::new("key".into(), Some("http://localhost:9/v3/nfl/".into()), 30)
                .unwrap();
        assert_eq!(
            client.endpoint("ScoresByWeek/2024REG/3"),
            "http://localhost:9/v3/nfl/scores/json/ScoresByWeek/2024REG/3"
        );
    }
}
