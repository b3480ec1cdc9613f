use anyhow::{anyhow, Result};
use std::env;

use crate::sportsdata::DEFAULT_BASE_URL;

/// Service configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// `None` disables every provider call.
    pub sports_api_key: Option<String>,
    pub sports_api_base_url: String,
    pub season_key: Option<String>,
    /// Sync a week from the provider when its page is read with no games.
    pub sync_enabled: bool,
    pub requests_per_minute: u32,
    /// Empty allows any origin.
    pub cors_allow_origins: Vec<String>,
    pub family_members: Vec<String>,
    pub commissioner_name: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = var("DATABASE_URL")
            .or_else(|| var("SUPABASE_DB_URL"))
            .ok_or_else(|| anyhow!("DATABASE_URL (or SUPABASE_DB_URL) is required"))?;

        let sports_api_key = match var("SPORTS_API_KEY") {
            Some(key) if is_placeholder(&key) => {
                return Err(anyhow!(
                    "SPORTS_API_KEY appears to be a placeholder value; replace with your real key"
                ))
            }
            other => other,
        };

        let sync_enabled = match var("SPORTS_SYNC_ENABLED") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow!("invalid SPORTS_SYNC_ENABLED value: {raw:?}"))?,
            None => false,
        };

        Ok(Self {
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            database_url,
            sports_api_key,
            sports_api_base_url: var("SPORTS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            season_key: var("SPORTS_SEASON_KEY"),
            sync_enabled,
            requests_per_minute: var("SPORTS_API_REQUESTS_PER_MINUTE")
                .and_then(|v| v.parse().ok())
                .filter(|rpm| *rpm > 0)
                .unwrap_or(30),
            cors_allow_origins: split_list(var("API_CORS_ALLOW_ORIGINS")),
            family_members: split_list(var("FAMILY_MEMBERS")),
            commissioner_name: var("COMMISSIONER_NAME"),
        })
    }
}

// Sample keys from docs and .env templates.
fn is_placeholder(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("change_me") || key.contains("your_") || key.starts_with("sample")
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Some(true),
        "0" | "f" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
