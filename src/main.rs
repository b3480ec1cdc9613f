//! Family NFL pick'em pool API
//!
//! Serves the weekly pick pages, keeps game scores in sync with SportsData.io
//! and refreshes the season's current week on a weekly schedule.

use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::sync::Arc;
use tracing::{error, info, warn};

use pickem_api::api::{self, AppState};
use pickem_api::bootstrap;
use pickem_api::config::Config;
use pickem_api::scheduler::{CurrentWeekJob, HealthState};
use pickem_api::service::PoolService;
use pickem_api::sportsdata::{SportsDataClient, SportsProvider};
use pickem_api::store::{PgStore, Store};

const DB_CONNECT_RETRIES: u32 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // Local development reads .env; deployments set real variables.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pickem_api=info".parse()?),
        )
        .init();

    info!("Pick'em pool API v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let store = Arc::new(PgStore::connect(&config.database_url, DB_CONNECT_RETRIES).await?);
    store.migrate().await.context("failed to apply migrations")?;

    match config.season_key.as_deref() {
        Some(season_key) => {
            bootstrap::run(
                store.as_ref(),
                season_key,
                &config.family_members,
                config.commissioner_name.as_deref(),
            )
            .await
            .context("bootstrap failed")?;
        }
        None => warn!("SPORTS_SEASON_KEY not set; skipping bootstrap"),
    }

    let provider: Option<Arc<dyn SportsProvider>> = match &config.sports_api_key {
        Some(key) => Some(Arc::new(SportsDataClient::new(
            key.clone(),
            Some(config.sports_api_base_url.clone()),
            config.requests_per_minute,
        )?)),
        None => {
            warn!("SPORTS_API_KEY not set; score sync is disabled");
            None
        }
    };

    let service = Arc::new(PoolService::new(
        store.clone() as Arc<dyn Store>,
        provider,
        config.sync_enabled,
    ));
    let health = HealthState::new();

    let job = CurrentWeekJob::new(
        service.clone(),
        config.season_key.clone().unwrap_or_default(),
        health.clone(),
    )
    .start();

    let app = api::router(
        AppState {
            service,
            health,
        },
        &config.cors_allow_origins,
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Pick'em API listening on {}", addr);

    let server = axum::serve(listener, app).into_future();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {:?}", e);
            }
        }
        _ = ctrl_c => {
            info!("Shutting down...");
        }
    }

    if let Some(job) = job {
        job.stop().await;
    }
    store.close().await;

    Ok(())
}
