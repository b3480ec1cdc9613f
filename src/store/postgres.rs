use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::Store;
use crate::error::{DbContext, PoolError, Result};
use crate::models::{
    GameRecord, GameStatus, Member, PickRecord, Season, Side, TeamInfo, WeekDeclaration,
    WeekResult, Week,
};
use crate::reconcile::{self, GameUpsert};
use crate::standings::{PickOutcome, TieBreakerEntry};

const GAME_COLUMNS: &str = "id, season_week_id, game_key, kickoff, status, channel, location, \
     home_team, away_team, home_score, away_score, winner, sportsdata_payload, updated_at";

const WEEK_COLUMNS: &str = "id, season_id, number, label, starts_at, ends_at";

const SEASON_COLUMNS: &str = "id, label, season_year, sportsdata_season_key";

const INSERT_NEW_GAME: &str = r#"
    INSERT INTO games (
        id, season_week_id, game_key, kickoff, status, channel, location,
        home_team, away_team, home_score, away_score, winner,
        sportsdata_payload, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT (game_key) DO NOTHING
"#;

const UPDATE_GAME: &str = r#"
    UPDATE games SET
        season_week_id = $2,
        game_key = $3,
        kickoff = $4,
        status = $5,
        channel = $6,
        location = $7,
        home_team = $8,
        away_team = $9,
        home_score = $10,
        away_score = $11,
        winner = $12,
        sportsdata_payload = $13,
        updated_at = $14
    WHERE id = $1
"#;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SeasonRow {
    id: Uuid,
    label: String,
    season_year: i32,
    sportsdata_season_key: String,
}

impl From<SeasonRow> for Season {
    fn from(row: SeasonRow) -> Self {
        Season {
            id: row.id,
            label: row.label,
            year: row.season_year,
            sports_data_season_key: row.sportsdata_season_key,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WeekRow {
    id: Uuid,
    season_id: Uuid,
    number: i32,
    label: String,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
}

impl From<WeekRow> for Week {
    fn from(row: WeekRow) -> Self {
        Week {
            id: row.id,
            season_id: row.season_id,
            number: row.number,
            label: row.label,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GameRow {
    id: Uuid,
    season_week_id: Uuid,
    game_key: String,
    kickoff: Option<DateTime<Utc>>,
    status: String,
    channel: Option<String>,
    location: Option<String>,
    home_team: Json<TeamInfo>,
    away_team: Json<TeamInfo>,
    home_score: Option<i32>,
    away_score: Option<i32>,
    winner: Option<String>,
    sportsdata_payload: Option<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GameRow> for GameRecord {
    type Error = PoolError;

    fn try_from(row: GameRow) -> Result<Self> {
        Ok(GameRecord {
            id: row.id,
            week_id: row.season_week_id,
            status: parse_status(&row.status, "game status")?,
            winner: row
                .winner
                .as_deref()
                .map(|w| parse_side(w, "game winner"))
                .transpose()?,
            game_key: row.game_key,
            kickoff: row.kickoff,
            channel: row.channel,
            location: row.location,
            home_team: row.home_team.0,
            away_team: row.away_team.0,
            home_score: row.home_score,
            away_score: row.away_score,
            payload: row.sportsdata_payload,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WeekResultRow {
    season_week_id: Uuid,
    winner_member_id: Option<Uuid>,
    declared_by_member_id: Uuid,
    notes: Option<String>,
    declared_at: DateTime<Utc>,
}

impl From<WeekResultRow> for WeekResult {
    fn from(row: WeekResultRow) -> Self {
        WeekResult {
            season_week_id: row.season_week_id,
            winner_member_id: row.winner_member_id,
            declared_by_member_id: row.declared_by_member_id,
            notes: row.notes,
            declared_at: row.declared_at,
        }
    }
}

fn parse_status(value: &str, context: &'static str) -> Result<GameStatus> {
    GameStatus::from_stored(value).ok_or_else(|| PoolError::Corrupt {
        context,
        message: format!("unknown status {value:?}"),
    })
}

fn parse_side(value: &str, context: &'static str) -> Result<Side> {
    value.parse().map_err(|_| PoolError::Corrupt {
        context,
        message: format!("unknown side {value:?}"),
    })
}

/// Map a foreign-key violation on a member reference to `MemberNotFound`.
fn member_reference(err: sqlx::Error, member: String, context: &'static str) -> PoolError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() {
            return PoolError::MemberNotFound(member);
        }
    }
    PoolError::Database {
        context,
        source: err,
    }
}

/// Run a game write bound as `($1..$14)` in `GAME_COLUMNS` order. Returns
/// the affected row count.
async fn write_game(
    conn: &mut PgConnection,
    statement: &str,
    game: &GameRecord,
    context: &'static str,
) -> Result<u64> {
    let result = sqlx::query(statement)
        .bind(game.id)
        .bind(game.week_id)
        .bind(&game.game_key)
        .bind(game.kickoff)
        .bind(game.status.as_str())
        .bind(game.channel.as_deref())
        .bind(game.location.as_deref())
        .bind(Json(&game.home_team))
        .bind(Json(&game.away_team))
        .bind(game.home_score)
        .bind(game.away_score)
        .bind(game.winner.map(|w| w.as_str()))
        .bind(&game.payload)
        .bind(game.updated_at)
        .execute(conn)
        .await
        .db_context(context)?;

    Ok(result.rows_affected())
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool, retrying with exponential backoff.
    pub async fn connect(url: &str, max_retries: u32) -> anyhow::Result<Self> {
        let mut attempt = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => {
                    info!("Connected to PostgreSQL");
                    return Ok(Self::new(pool));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(anyhow!(
                            "Failed to connect to database after {} attempts: {}",
                            max_retries,
                            e
                        ));
                    }
                    warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }

    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_seasons(&self) -> Result<Vec<Season>> {
        let rows: Vec<SeasonRow> = sqlx::query_as(&format!(
            "SELECT {SEASON_COLUMNS} FROM seasons ORDER BY season_year DESC, created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .db_context("list seasons")?;

        Ok(rows.into_iter().map(Season::from).collect())
    }

    async fn get_season(&self, season_id: Uuid) -> Result<Season> {
        let row: Option<SeasonRow> =
            sqlx::query_as(&format!("SELECT {SEASON_COLUMNS} FROM seasons WHERE id = $1"))
                .bind(season_id)
                .fetch_optional(&self.pool)
                .await
                .db_context("get season")?;

        row.map(Season::from)
            .ok_or_else(|| PoolError::SeasonNotFound(season_id.to_string()))
    }

    async fn get_season_by_key(&self, sports_key: &str) -> Result<Season> {
        let sports_key = sports_key.trim();
        let row: Option<SeasonRow> = sqlx::query_as(&format!(
            "SELECT {SEASON_COLUMNS} FROM seasons WHERE sportsdata_season_key = $1"
        ))
        .bind(sports_key)
        .fetch_optional(&self.pool)
        .await
        .db_context("get season by key")?;

        row.map(Season::from)
            .ok_or_else(|| PoolError::SeasonNotFound(sports_key.to_string()))
    }

    async fn list_weeks(&self, season_id: Uuid) -> Result<Vec<Week>> {
        let rows: Vec<WeekRow> = sqlx::query_as(&format!(
            "SELECT {WEEK_COLUMNS} FROM season_weeks WHERE season_id = $1 ORDER BY number ASC"
        ))
        .bind(season_id)
        .fetch_all(&self.pool)
        .await
        .db_context("list weeks")?;

        Ok(rows.into_iter().map(Week::from).collect())
    }

    async fn get_week(&self, season_id: Uuid, number: i32) -> Result<Week> {
        let row: Option<WeekRow> = sqlx::query_as(&format!(
            "SELECT {WEEK_COLUMNS} FROM season_weeks WHERE season_id = $1 AND number = $2"
        ))
        .bind(season_id)
        .bind(number)
        .fetch_optional(&self.pool)
        .await
        .db_context("get week")?;

        row.map(Week::from).ok_or_else(|| PoolError::WeekNotFound {
            season: season_id.to_string(),
            week: number,
        })
    }

    async fn current_week(&self, season_id: Uuid) -> Result<Option<i32>> {
        sqlx::query_scalar("SELECT current_week FROM season_settings WHERE season_id = $1")
            .bind(season_id)
            .fetch_optional(&self.pool)
            .await
            .db_context("get current week")
    }

    async fn set_current_week(&self, season_id: Uuid, number: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO season_settings (season_id, current_week)
            VALUES ($1, $2)
            ON CONFLICT (season_id) DO UPDATE SET
                current_week = EXCLUDED.current_week,
                updated_at = now()
            "#,
        )
        .bind(season_id)
        .bind(number)
        .execute(&self.pool)
        .await
        .db_context("set current week")?;
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<Member>> {
        let rows: Vec<(Uuid, String, bool)> =
            sqlx::query_as("SELECT id, name, is_commissioner FROM family_members ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await
                .db_context("list members")?;

        Ok(rows
            .into_iter()
            .map(|(id, name, is_commissioner)| Member {
                id,
                name,
                is_commissioner,
            })
            .collect())
    }

    async fn pick_outcomes(&self, season_id: Uuid) -> Result<Vec<PickOutcome>> {
        let rows: Vec<(Uuid, i32, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT p.member_id, w.number, p.chosen_side, g.status, g.winner
            FROM picks p
                JOIN games g ON g.id = p.game_id
                JOIN season_weeks w ON w.id = g.season_week_id
            WHERE w.season_id = $1
            "#,
        )
        .bind(season_id)
        .fetch_all(&self.pool)
        .await
        .db_context("season pick outcomes")?;

        rows.into_iter()
            .map(|(member_id, week_number, chosen, status, winner)| {
                Ok(PickOutcome {
                    member_id,
                    week_number,
                    chosen_side: parse_side(&chosen, "pick side")?,
                    status: parse_status(&status, "game status")?,
                    winner: winner
                        .as_deref()
                        .map(|w| parse_side(w, "game winner"))
                        .transpose()?,
                })
            })
            .collect()
    }

    async fn week_winners(&self, season_id: Uuid) -> Result<Vec<Uuid>> {
        sqlx::query_scalar(
            r#"
            SELECT wr.winner_member_id
            FROM week_results wr
                JOIN season_weeks w ON w.id = wr.season_week_id
            WHERE w.season_id = $1
                AND wr.winner_member_id IS NOT NULL
            "#,
        )
        .bind(season_id)
        .fetch_all(&self.pool)
        .await
        .db_context("weeks won")
    }

    async fn tie_breakers(&self, season_id: Uuid) -> Result<Vec<TieBreakerEntry>> {
        let rows: Vec<(Uuid, i32, i32)> = sqlx::query_as(
            r#"
            SELECT tb.member_id, w.number, tb.points
            FROM tie_breakers tb
                JOIN season_weeks w ON w.id = tb.season_week_id
            WHERE w.season_id = $1
            "#,
        )
        .bind(season_id)
        .fetch_all(&self.pool)
        .await
        .db_context("tie breakers")?;

        Ok(rows
            .into_iter()
            .map(|(member_id, week_number, points)| TieBreakerEntry {
                member_id,
                week_number,
                points,
            })
            .collect())
    }

    async fn list_games(&self, week_id: Uuid) -> Result<Vec<GameRecord>> {
        let rows: Vec<GameRow> = sqlx::query_as(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE season_week_id = $1 \
             ORDER BY kickoff ASC NULLS LAST, game_key ASC"
        ))
        .bind(week_id)
        .fetch_all(&self.pool)
        .await
        .db_context("list games")?;

        rows.into_iter().map(GameRecord::try_from).collect()
    }

    async fn list_picks(&self, week_id: Uuid) -> Result<Vec<PickRecord>> {
        let rows: Vec<(Uuid, Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT p.member_id, p.game_id, p.chosen_side, p.updated_at
            FROM picks p
                JOIN games g ON g.id = p.game_id
            WHERE g.season_week_id = $1
            ORDER BY p.created_at ASC, p.member_id ASC
            "#,
        )
        .bind(week_id)
        .fetch_all(&self.pool)
        .await
        .db_context("list picks")?;

        rows.into_iter()
            .map(|(member_id, game_id, side, updated_at)| {
                Ok(PickRecord {
                    member_id,
                    game_id,
                    chosen_side: parse_side(&side, "pick side")?,
                    updated_at,
                })
            })
            .collect()
    }

    async fn find_game(&self, game_key: &str) -> Result<GameRecord> {
        let row: Option<GameRow> =
            sqlx::query_as(&format!("SELECT {GAME_COLUMNS} FROM games WHERE game_key = $1"))
                .bind(game_key)
                .fetch_optional(&self.pool)
                .await
                .db_context("find game")?;

        row.map(GameRecord::try_from)
            .transpose()?
            .ok_or_else(|| PoolError::GameNotFound(game_key.to_string()))
    }

    async fn upsert_pick(&self, member_id: Uuid, game_id: Uuid, side: Side) -> Result<PickRecord> {
        let (updated_at,): (DateTime<Utc>,) = sqlx::query_as(
            r#"
            INSERT INTO picks (member_id, game_id, chosen_side)
            VALUES ($1, $2, $3)
            ON CONFLICT (member_id, game_id) DO UPDATE SET
                chosen_side = EXCLUDED.chosen_side,
                updated_at = now()
            RETURNING updated_at
            "#,
        )
        .bind(member_id)
        .bind(game_id)
        .bind(side.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| member_reference(e, member_id.to_string(), "upsert pick"))?;

        Ok(PickRecord {
            member_id,
            game_id,
            chosen_side: side,
            updated_at,
        })
    }

    async fn delete_pick(&self, member_id: Uuid, week_id: Uuid, game_key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM picks p
            USING games g
            WHERE p.game_id = g.id
                AND p.member_id = $1
                AND g.game_key = $2
                AND g.season_week_id = $3
            "#,
        )
        .bind(member_id)
        .bind(game_key)
        .bind(week_id)
        .execute(&self.pool)
        .await
        .db_context("delete pick")?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_tie_breaker(&self, member_id: Uuid, week_id: Uuid, points: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tie_breakers (member_id, season_week_id, points)
            VALUES ($1, $2, $3)
            ON CONFLICT (member_id, season_week_id) DO UPDATE SET
                points = EXCLUDED.points,
                updated_at = now()
            "#,
        )
        .bind(member_id)
        .bind(week_id)
        .bind(points)
        .execute(&self.pool)
        .await
        .map_err(|e| member_reference(e, member_id.to_string(), "upsert tie breaker"))?;
        Ok(())
    }

    async fn set_game_winner(
        &self,
        week_id: Uuid,
        game_key: &str,
        winner: Option<Side>,
    ) -> Result<GameRecord> {
        let row: Option<GameRow> = sqlx::query_as(&format!(
            r#"
            UPDATE games SET
                winner = $3,
                status = CASE WHEN $3::text IS NOT NULL THEN 'final' ELSE status END,
                updated_at = now()
            WHERE season_week_id = $1 AND game_key = $2
            RETURNING {GAME_COLUMNS}
            "#
        ))
        .bind(week_id)
        .bind(game_key)
        .bind(winner.map(|w| w.as_str()))
        .fetch_optional(&self.pool)
        .await
        .db_context("update game winner")?;

        row.map(GameRecord::try_from)
            .transpose()?
            .ok_or_else(|| PoolError::GameNotFound(game_key.to_string()))
    }

    async fn get_week_result(&self, week_id: Uuid) -> Result<Option<WeekResult>> {
        let row: Option<WeekResultRow> = sqlx::query_as(
            r#"
            SELECT season_week_id, winner_member_id, declared_by_member_id, notes, declared_at
            FROM week_results
            WHERE season_week_id = $1
            "#,
        )
        .bind(week_id)
        .fetch_optional(&self.pool)
        .await
        .db_context("get week result")?;

        Ok(row.map(WeekResult::from))
    }

    async fn declare_week_result(
        &self,
        week_id: Uuid,
        declaration: &WeekDeclaration,
    ) -> Result<WeekResult> {
        let row: WeekResultRow = sqlx::query_as(
            r#"
            INSERT INTO week_results (season_week_id, winner_member_id, declared_by_member_id, notes, declared_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (season_week_id) DO UPDATE SET
                winner_member_id = EXCLUDED.winner_member_id,
                declared_by_member_id = EXCLUDED.declared_by_member_id,
                notes = EXCLUDED.notes,
                declared_at = now()
            RETURNING season_week_id, winner_member_id, declared_by_member_id, notes, declared_at
            "#,
        )
        .bind(week_id)
        .bind(declaration.winner_member_id)
        .bind(declaration.declared_by_member_id)
        .bind(declaration.notes.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let members = match declaration.winner_member_id {
                Some(winner) => format!("{} or {}", declaration.declared_by_member_id, winner),
                None => declaration.declared_by_member_id.to_string(),
            };
            member_reference(e, members, "declare week winner")
        })?;

        Ok(row.into())
    }

    async fn reconcile_week(&self, week_id: Uuid, upserts: &[GameUpsert]) -> Result<usize> {
        if upserts.is_empty() {
            return Ok(0);
        }

        // Concurrent batches lock rows in the same order.
        let mut ordered: Vec<&GameUpsert> = upserts.iter().collect();
        ordered.sort_by(|a, b| a.game_key.cmp(&b.game_key));

        let mut tx = self.pool.begin().await.db_context("sync week begin")?;
        let now = Utc::now();

        for upsert in ordered {
            let fresh = reconcile::merge(None, week_id, upsert, now)?;
            let inserted =
                write_game(&mut *tx, INSERT_NEW_GAME, &fresh, "sync week insert game").await?;
            if inserted > 0 {
                continue;
            }

            // The key exists, possibly just committed by a concurrent batch.
            let existing: GameRow = sqlx::query_as(&format!(
                "SELECT {GAME_COLUMNS} FROM games WHERE game_key = $1 FOR UPDATE"
            ))
            .bind(&upsert.game_key)
            .fetch_one(&mut *tx)
            .await
            .db_context("sync week lock game")?;

            let game = reconcile::merge(Some(GameRecord::try_from(existing)?), week_id, upsert, now)?;
            write_game(&mut *tx, UPDATE_GAME, &game, "sync week update game").await?;
        }

        tx.commit().await.db_context("sync week commit")?;
        info!("Reconciled {} games into week {}", upserts.len(), week_id);
        Ok(upserts.len())
    }

    async fn ensure_member(&self, name: &str, is_commissioner: bool) -> Result<Member> {
        let (id, name, is_commissioner): (Uuid, String, bool) = sqlx::query_as(
            r#"
            INSERT INTO family_members (id, name, is_commissioner)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET is_commissioner = EXCLUDED.is_commissioner
            RETURNING id, name, is_commissioner
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(is_commissioner)
        .fetch_one(&self.pool)
        .await
        .db_context("upsert family member")?;

        Ok(Member {
            id,
            name,
            is_commissioner,
        })
    }

    async fn ensure_season(&self, sports_key: &str, label: &str, year: i32) -> Result<Season> {
        let row: SeasonRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO seasons (id, label, season_year, sportsdata_season_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sportsdata_season_key) DO UPDATE SET
                sportsdata_season_key = EXCLUDED.sportsdata_season_key
            RETURNING {SEASON_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(label)
        .bind(year)
        .bind(sports_key)
        .fetch_one(&self.pool)
        .await
        .db_context("ensure season")?;

        Ok(row.into())
    }

    async fn ensure_week(&self, season_id: Uuid, number: i32, label: &str) -> Result<Week> {
        let row: WeekRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO season_weeks (id, season_id, number, label)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (season_id, number) DO UPDATE SET label = EXCLUDED.label
            RETURNING {WEEK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(season_id)
        .bind(number)
        .bind(label)
        .fetch_one(&self.pool)
        .await
        .db_context("ensure week")?;

        Ok(row.into())
    }
}
