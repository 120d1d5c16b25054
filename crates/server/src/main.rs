mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use pizzabot_core::config::{AppConfig, LoadOptions};

/// `RUST_LOG` wins over `logging.level` when set.
fn init_logging(config: &AppConfig) {
    use pizzabot_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let transport = app.runner.transport_name();

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.agent_runtime.clone(), transport),
    )
    .await?;

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let runner = app.runner;
    let mut polling = tokio::spawn(async move { runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        transport,
        "pizzabot-server started"
    );

    let finished = tokio::select! {
        result = &mut polling => Some(result),
        signal = wait_for_shutdown() => {
            signal?;
            None
        }
    };

    match finished {
        Some(Ok(Ok(()))) => {
            tracing::warn!(
                event_name = "system.server.polling_stopped",
                correlation_id = "runtime",
                "chat update stream closed; health endpoint stays up until shutdown"
            );
            wait_for_shutdown().await?;
        }
        Some(Ok(Err(error))) => {
            tracing::error!(
                event_name = "system.server.polling_failed",
                correlation_id = "runtime",
                error = %error,
                "chat polling loop gave up; exiting so a supervisor can restart the bot"
            );
            return Err(error);
        }
        Some(Err(error)) => {
            tracing::error!(
                event_name = "system.server.polling_failed",
                correlation_id = "runtime",
                error = %error,
                "chat polling task panicked"
            );
            return Err(error.into());
        }
        None => {
            polling.abort();
            if tokio::time::timeout(grace, polling).await.is_err() {
                tracing::warn!(
                    event_name = "system.server.shutdown_timeout",
                    correlation_id = "shutdown",
                    grace_secs = grace.as_secs(),
                    "polling task did not stop within the grace period"
                );
            }
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        active_sessions = app.agent_runtime.active_sessions().await,
        "pizzabot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
