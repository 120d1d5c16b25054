use std::sync::Arc;
use std::time::Duration;

use pizzabot_agent::{AgentRuntime, NluError, WitNluClient};
use pizzabot_core::config::{AppConfig, ConfigError};
use pizzabot_core::flows::ConversationEngine;
use pizzabot_telegram::{
    chat_dispatcher, ChatTransport, NoopTransport, PollingRunner, ReconnectPolicy,
    TelegramTransport, TransportError,
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: Arc<AgentRuntime>,
    pub runner: PollingRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("language service client setup failed: {0}")]
    Nlu(#[from] NluError),
    #[error("telegram transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let catalog = Arc::new(config.build_catalog()?);
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        correlation_id = "bootstrap",
        pizzas = catalog.len(),
        "pizza catalog loaded"
    );

    let engine = ConversationEngine::new(catalog, config.engine_settings());
    let nlu = WitNluClient::new(&config.nlu)?;
    let agent_runtime = Arc::new(AgentRuntime::new(
        Arc::new(nlu),
        engine,
        config.conversation.session_scope,
    ));

    let transport: Arc<dyn ChatTransport> = if config.telegram.bot_token.expose_secret().is_empty()
    {
        Arc::new(NoopTransport)
    } else {
        Arc::new(TelegramTransport::new(&config.telegram)?)
    };
    let runner = PollingRunner::new(
        transport,
        chat_dispatcher(agent_runtime.clone()),
        ReconnectPolicy::default(),
    )
    .with_reply_delay(Duration::from_millis(config.conversation.reply_delay_ms));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        transport = runner.transport_name(),
        nlu = agent_runtime.nlu_provider(),
        session_scope = ?config.conversation.session_scope,
        "application bootstrap complete"
    );

    Ok(Application { config, agent_runtime, runner })
}
