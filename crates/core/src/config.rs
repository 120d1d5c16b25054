use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, DEFAULT_MENU_INGREDIENT};
use crate::domain::pizza::Pizza;
use crate::flows::engine::{EngineSettings, DEFAULT_DELIVERY_ETA_MINUTES};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub nlu: NluConfig,
    pub conversation: ConversationConfig,
    pub catalog: CatalogConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NluConfig {
    pub access_token: SecretString,
    pub base_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub reply_delay_ms: u64,
    pub delivery_eta_minutes: u32,
    pub default_ingredient: String,
    pub session_scope: SessionScope,
}

#[derive(Clone, Debug, Default)]
pub struct CatalogConfig {
    pub pizzas: Vec<PizzaConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PizzaConfig {
    pub name: String,
    pub ingredients: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How inbound chats map onto conversations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    /// Every chat shares one conversation.
    Global,
    PerChat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub telegram_bot_token: Option<String>,
    pub nlu_access_token: Option<String>,
    pub nlu_base_url: Option<String>,
    pub log_level: Option<String>,
    pub session_scope: Option<SessionScope>,
    pub reply_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    /// Skip credential checks for commands that never talk to Telegram or the NLU service.
    pub offline: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
            },
            nlu: NluConfig {
                access_token: String::new().into(),
                base_url: "https://api.wit.ai".to_string(),
                api_version: "20170307".to_string(),
                timeout_secs: 10,
            },
            conversation: ConversationConfig {
                reply_delay_ms: 700,
                delivery_eta_minutes: DEFAULT_DELIVERY_ETA_MINUTES,
                default_ingredient: DEFAULT_MENU_INGREDIENT.to_string(),
                session_scope: SessionScope::Global,
            },
            catalog: CatalogConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for SessionScope {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "global" => Ok(Self::Global),
            "per_chat" => Ok(Self::PerChat),
            other => Err(ConfigError::Validation(format!(
                "unsupported session scope `{other}` (expected global|per_chat)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pizzabot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        if options.offline {
            config.validate_offline()?;
        } else {
            config.validate()?;
        }

        Ok(config)
    }

    /// Menu from `[catalog]`, or the standard menu when none is configured.
    pub fn build_catalog(&self) -> Result<Catalog, ConfigError> {
        if self.catalog.pizzas.is_empty() {
            return Ok(Catalog::default());
        }

        let pizzas = self
            .catalog
            .pizzas
            .iter()
            .map(|pizza| Pizza::new(pizza.name.clone(), pizza.ingredients.iter().cloned()))
            .collect();
        Catalog::new(pizzas).map_err(|error| ConfigError::Validation(format!("catalog: {error}")))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_ingredient: self.conversation.default_ingredient.clone(),
            delivery_eta_minutes: self.conversation.delivery_eta_minutes,
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telegram) = patch.telegram {
            if let Some(bot_token_value) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token_value);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(nlu) = patch.nlu {
            if let Some(access_token_value) = nlu.access_token {
                self.nlu.access_token = secret_value(access_token_value);
            }
            if let Some(base_url) = nlu.base_url {
                self.nlu.base_url = base_url;
            }
            if let Some(api_version) = nlu.api_version {
                self.nlu.api_version = api_version;
            }
            if let Some(timeout_secs) = nlu.timeout_secs {
                self.nlu.timeout_secs = timeout_secs;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(reply_delay_ms) = conversation.reply_delay_ms {
                self.conversation.reply_delay_ms = reply_delay_ms;
            }
            if let Some(delivery_eta_minutes) = conversation.delivery_eta_minutes {
                self.conversation.delivery_eta_minutes = delivery_eta_minutes;
            }
            if let Some(default_ingredient) = conversation.default_ingredient {
                self.conversation.default_ingredient = default_ingredient;
            }
            if let Some(session_scope) = conversation.session_scope {
                self.conversation.session_scope = session_scope;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(pizzas) = catalog.pizzas {
                self.catalog.pizzas = pizzas;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let bot_token =
            read_env("PIZZABOT_TELEGRAM_BOT_TOKEN").or_else(|| read_env("telegram_access_token"));
        if let Some(value) = bot_token {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("PIZZABOT_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("PIZZABOT_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("PIZZABOT_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        let access_token =
            read_env("PIZZABOT_NLU_ACCESS_TOKEN").or_else(|| read_env("wit_access_token"));
        if let Some(value) = access_token {
            self.nlu.access_token = secret_value(value);
        }
        if let Some(value) = read_env("PIZZABOT_NLU_BASE_URL") {
            self.nlu.base_url = value;
        }
        if let Some(value) = read_env("PIZZABOT_NLU_API_VERSION") {
            self.nlu.api_version = value;
        }
        if let Some(value) = read_env("PIZZABOT_NLU_TIMEOUT_SECS") {
            self.nlu.timeout_secs = parse_u64("PIZZABOT_NLU_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PIZZABOT_CONVERSATION_REPLY_DELAY_MS") {
            self.conversation.reply_delay_ms =
                parse_u64("PIZZABOT_CONVERSATION_REPLY_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("PIZZABOT_CONVERSATION_DELIVERY_ETA_MINUTES") {
            self.conversation.delivery_eta_minutes =
                parse_u32("PIZZABOT_CONVERSATION_DELIVERY_ETA_MINUTES", &value)?;
        }
        if let Some(value) = read_env("PIZZABOT_CONVERSATION_DEFAULT_INGREDIENT") {
            self.conversation.default_ingredient = value;
        }
        if let Some(value) = read_env("PIZZABOT_CONVERSATION_SESSION_SCOPE") {
            self.conversation.session_scope = value.parse()?;
        }

        if let Some(value) = read_env("PIZZABOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PIZZABOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("PIZZABOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("PIZZABOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PIZZABOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("PIZZABOT_LOGGING_LEVEL").or_else(|| read_env("PIZZABOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PIZZABOT_LOGGING_FORMAT").or_else(|| read_env("PIZZABOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(bot_token);
        }
        if let Some(access_token) = overrides.nlu_access_token {
            self.nlu.access_token = secret_value(access_token);
        }
        if let Some(base_url) = overrides.nlu_base_url {
            self.nlu.base_url = base_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(session_scope) = overrides.session_scope {
            self.conversation.session_scope = session_scope;
        }
        if let Some(reply_delay_ms) = overrides.reply_delay_ms {
            self.conversation.reply_delay_ms = reply_delay_ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_telegram_token(&self.telegram)?;
        validate_nlu_token(&self.nlu)?;
        self.validate_offline()
    }

    fn validate_offline(&self) -> Result<(), ConfigError> {
        validate_telegram(&self.telegram)?;
        validate_nlu(&self.nlu)?;
        validate_conversation(&self.conversation)?;
        self.build_catalog()?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pizzabot.toml"), PathBuf::from("config/pizzabot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_telegram_token(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let bot_token = telegram.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Ask @BotFather for a token with /newbot or /token"
                .to_string(),
        ));
    }

    let well_formed = bot_token
        .split_once(':')
        .map(|(bot_id, secret)| {
            !bot_id.is_empty() && bot_id.chars().all(|ch| ch.is_ascii_digit()) && !secret.is_empty()
        })
        .unwrap_or(false);
    if !well_formed {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_nlu_token(nlu: &NluConfig) -> Result<(), ConfigError> {
    if nlu.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "nlu.access_token is required. Copy the server access token from your Wit.ai app settings"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    validate_http_url("telegram.api_base_url", &telegram.api_base_url)?;
    if telegram.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 0..=50".to_string(),
        ));
    }
    Ok(())
}

fn validate_nlu(nlu: &NluConfig) -> Result<(), ConfigError> {
    validate_http_url("nlu.base_url", &nlu.base_url)?;
    if nlu.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("nlu.api_version must not be empty".to_string()));
    }
    if nlu.timeout_secs == 0 || nlu.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "nlu.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.reply_delay_ms > 10_000 {
        return Err(ConfigError::Validation(
            "conversation.reply_delay_ms must be at most 10000".to_string(),
        ));
    }
    if conversation.delivery_eta_minutes == 0 {
        return Err(ConfigError::Validation(
            "conversation.delivery_eta_minutes must be greater than zero".to_string(),
        ));
    }
    if conversation.default_ingredient.trim().is_empty() {
        return Err(ConfigError::Validation(
            "conversation.default_ingredient must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telegram: Option<TelegramPatch>,
    nlu: Option<NluPatch>,
    conversation: Option<ConversationPatch>,
    catalog: Option<CatalogPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NluPatch {
    access_token: Option<String>,
    base_url: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    reply_delay_ms: Option<u64>,
    delivery_eta_minutes: Option<u32>,
    default_ingredient: Option<String>,
    session_scope: Option<SessionScope>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    pizzas: Option<Vec<PizzaConfig>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
