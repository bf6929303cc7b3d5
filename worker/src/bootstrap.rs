use std::sync::Arc;

use anyhow::Result;
use notifier::Sender;
use sqlx::PgPool;
use tracing::warn;

use crate::{
    config::AppConfig,
    repositories::PostgresAlertRepository,
    services::{AlertChecker, HttpIndicatorResolver},
};

pub type Checker = AlertChecker<PostgresAlertRepository, HttpIndicatorResolver, Sender>;

pub async fn build_checker(config: &AppConfig) -> Result<Arc<Checker>> {
    let pool = PgPool::connect(&config.database_url).await?;
    sqlx::migrate!("../migrations").run(&pool).await?;

    let alert_repo = Arc::new(PostgresAlertRepository::new(pool));
    let resolver = Arc::new(HttpIndicatorResolver::new(
        config.quote_api_base.clone(),
        config.series_api_base.clone(),
        config.provider_timeout,
    )?);
    let sender = match config.resend_api_key.as_deref() {
        Some(api_key) => {
            let http_client = reqwest::Client::builder()
                .timeout(config.provider_timeout)
                .build()?;
            Sender::resend(api_key, config.email_from.clone(), http_client)
        }
        None => {
            warn!("RESEND_API_KEY not set; alert emails will be skipped");
            Sender::Disabled
        }
    };

    Ok(Arc::new(AlertChecker::new(
        alert_repo,
        resolver,
        Arc::new(sender),
        config.check_max_concurrency,
    )))
}
