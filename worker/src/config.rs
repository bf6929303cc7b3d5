use std::{env, time::Duration};

use anyhow::{Context, Result};

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL of the currency quotation provider.
    pub quote_api_base: String,
    /// Base URL of the series provider (inflation, country risk, UVA, rates).
    pub series_api_base: String,
    pub provider_timeout: Duration,
    pub check_max_concurrency: usize,
    pub resend_api_key: Option<String>,
    pub email_from: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set for the alert checker")?,
            quote_api_base: env::var("QUOTE_API_BASE")
                .unwrap_or_else(|_| "https://dolarapi.com".to_string()),
            series_api_base: env::var("SERIES_API_BASE")
                .unwrap_or_else(|_| "https://api.argentinadatos.com".to_string()),
            provider_timeout: parse_duration_seconds("PROVIDER_TIMEOUT_SECS", 10),
            check_max_concurrency: parse_usize("CHECK_MAX_CONCURRENCY", 8),
            resend_api_key: env::var("RESEND_API_KEY").ok().filter(|v| !v.is_empty()),
            email_from: env::var("ALERT_EMAIL_FROM")
                .unwrap_or_else(|_| "alerts@localhost".to_string()),
        })
    }
}

fn parse_duration_seconds(key: &str, default: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default))
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
