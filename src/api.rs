//! HTTP surface over `PoolService`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::error;

use crate::error::{ErrorKind, PoolError};
use crate::models::PageData;
use crate::scheduler::HealthState;
use crate::service::{DeclareInput, PoolService, SyncSummary};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PoolService>,
    pub health: HealthState,
}

type ApiResult<T = Json<Value>> = Result<T, PoolError>;

impl IntoResponse for PoolError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/seasons", get(list_seasons))
        .route("/api/seasons/:season_id/weeks", get(list_weeks))
        .route("/api/seasons/:season_id/current-week", get(current_week))
        .route("/api/seasons/:season_id/weeks/:week", get(page_data))
        .route(
            "/api/seasons/:season_id/weeks/:week/picks",
            post(upsert_pick).delete(delete_pick),
        )
        .route(
            "/api/seasons/:season_id/weeks/:week/tie-breaker",
            post(upsert_tie_breaker),
        )
        .route(
            "/api/seasons/:season_id/weeks/:week/games/:game_key/winner",
            post(set_game_winner),
        )
        .route(
            "/api/seasons/:season_id/weeks/:week/winner",
            post(declare_week_winner),
        )
        .route("/api/seasons/:season_id/weeks/:week/sync", post(sync_week))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::LINK])
        .max_age(Duration::from_secs(300));

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if allowed.is_empty() {
        // Credentials cannot be combined with a wildcard origin.
        layer.allow_origin(Any)
    } else {
        layer
            .allow_origin(AllowOrigin::list(allowed))
            .allow_credentials(true)
    }
}

fn parse_week(raw: &str) -> Result<i32, PoolError> {
    raw.trim()
        .parse()
        .map_err(|_| PoolError::validation("weekNumber must be an integer"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PickRequest {
    member_id: String,
    game_key: String,
    side: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PickTarget {
    member_id: String,
    game_key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TieBreakerRequest {
    member_id: String,
    points: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WinnerRequest {
    winner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DeclareRequest {
    winner_member_id: Option<String>,
    declared_by_member_id: String,
    notes: Option<String>,
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let last_run = state.health.last_run_time.read().await;
    let last_week = state.health.last_week.read().await;
    let errors = state.health.error_count.read().await;

    let status = if *errors > 5 { "degraded" } else { "ok" };

    let http_status = if *errors > 10 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        http_status,
        Json(json!({
            "service": "pickem-api",
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
            "last_week_refresh": last_run.map(|t| t.to_rfc3339()),
            "current_week": *last_week,
            "consecutive_errors": *errors
        })),
    )
}

async fn list_seasons(State(state): State<AppState>) -> ApiResult {
    let seasons = state.service.list_seasons().await?;
    Ok(Json(json!({ "seasons": seasons })))
}

async fn list_weeks(State(state): State<AppState>, Path(season_id): Path<String>) -> ApiResult {
    let weeks = state.service.list_weeks(&season_id).await?;
    Ok(Json(json!({ "weeks": weeks })))
}

async fn current_week(State(state): State<AppState>, Path(season_id): Path<String>) -> ApiResult {
    let week = state.service.current_week(&season_id).await?;
    Ok(Json(json!({ "currentWeek": week })))
}

async fn page_data(
    State(state): State<AppState>,
    Path((season_id, week)): Path<(String, String)>,
) -> ApiResult<Json<PageData>> {
    let page = state
        .service
        .page_data(&season_id, parse_week(&week)?)
        .await?;
    Ok(Json(page))
}

async fn upsert_pick(
    State(state): State<AppState>,
    Path((season_id, week)): Path<(String, String)>,
    Json(req): Json<PickRequest>,
) -> ApiResult {
    let pick = state
        .service
        .upsert_pick(
            &season_id,
            parse_week(&week)?,
            &req.member_id,
            &req.game_key,
            &req.side,
        )
        .await?;
    Ok(Json(json!({ "pick": pick })))
}

/// Member and game may come from a JSON body or the query string.
async fn delete_pick(
    State(state): State<AppState>,
    Path((season_id, week)): Path<(String, String)>,
    Query(query): Query<PickTarget>,
    body: Bytes,
) -> ApiResult {
    let mut target = if body.iter().all(u8::is_ascii_whitespace) {
        PickTarget::default()
    } else {
        serde_json::from_slice::<PickTarget>(&body)
            .map_err(|e| PoolError::validation(format!("invalid request body: {e}")))?
    };
    if target.member_id.trim().is_empty() {
        target.member_id = query.member_id;
    }
    if target.game_key.trim().is_empty() {
        target.game_key = query.game_key;
    }

    let removed = state
        .service
        .delete_pick(
            &season_id,
            parse_week(&week)?,
            &target.member_id,
            &target.game_key,
        )
        .await?;
    Ok(Json(json!({ "removed": removed })))
}

async fn upsert_tie_breaker(
    State(state): State<AppState>,
    Path((season_id, week)): Path<(String, String)>,
    Json(req): Json<TieBreakerRequest>,
) -> ApiResult {
    let tie_breaker = state
        .service
        .upsert_tie_breaker(&season_id, parse_week(&week)?, &req.member_id, req.points)
        .await?;
    Ok(Json(json!({ "tieBreaker": tie_breaker })))
}

async fn set_game_winner(
    State(state): State<AppState>,
    Path((season_id, week, game_key)): Path<(String, String, String)>,
    Json(req): Json<WinnerRequest>,
) -> ApiResult {
    let game = state
        .service
        .set_game_winner(
            &season_id,
            parse_week(&week)?,
            &game_key,
            req.winner.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "game": game })))
}

async fn declare_week_winner(
    State(state): State<AppState>,
    Path((season_id, week)): Path<(String, String)>,
    Json(req): Json<DeclareRequest>,
) -> ApiResult {
    let input = DeclareInput {
        winner_member_id: req.winner_member_id,
        declared_by_member_id: req.declared_by_member_id,
        notes: req.notes,
    };
    let result = state
        .service
        .declare_week_winner(&season_id, parse_week(&week)?, input)
        .await?;
    Ok(Json(json!({ "weekResult": result })))
}

async fn sync_week(
    State(state): State<AppState>,
    Path((season_id, week)): Path<(String, String)>,
) -> ApiResult<Json<SyncSummary>> {
    let summary = state
        .service
        .sync_week(&season_id, parse_week(&week)?)
        .await?;
    Ok(Json(summary))
}
