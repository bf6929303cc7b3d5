use worker::{bootstrap::build_checker, config::AppConfig, telemetry};

/// One run per invocation; scheduling is the host's concern (cron, systemd
/// timer, ...). Already-committed trigger transitions survive a mid-run
/// termination, so the next run simply continues with whatever is left.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;

    let config = AppConfig::from_env()?;
    let checker = build_checker(&config).await?;

    tracing::info!("alert checker starting");
    checker.run_all_checks().await;

    Ok(())
}
