use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pizzabot_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use super::offline_options;

pub fn run(config_path: Option<&Path>) -> String {
    let config = match AppConfig::load(offline_options(config_path)) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let catalog_summary = if config.catalog.pizzas.is_empty() {
        "standard menu (5 pizzas)".to_string()
    } else {
        let names: Vec<&str> =
            config.catalog.pizzas.iter().map(|pizza| pizza.name.as_str()).collect();
        format!("{} pizzas: {}", names.len(), names.join(", "))
    };

    let fields = vec![
        field(
            "telegram.bot_token",
            redact_bot_token(config.telegram.bot_token.expose_secret()),
            &["PIZZABOT_TELEGRAM_BOT_TOKEN", "telegram_access_token"],
        ),
        field(
            "telegram.api_base_url",
            config.telegram.api_base_url.clone(),
            &["PIZZABOT_TELEGRAM_API_BASE_URL"],
        ),
        field(
            "telegram.poll_timeout_secs",
            config.telegram.poll_timeout_secs.to_string(),
            &["PIZZABOT_TELEGRAM_POLL_TIMEOUT_SECS"],
        ),
        field(
            "nlu.access_token",
            redact_secret(config.nlu.access_token.expose_secret()),
            &["PIZZABOT_NLU_ACCESS_TOKEN", "wit_access_token"],
        ),
        field("nlu.base_url", config.nlu.base_url.clone(), &["PIZZABOT_NLU_BASE_URL"]),
        field("nlu.api_version", config.nlu.api_version.clone(), &["PIZZABOT_NLU_API_VERSION"]),
        field("nlu.timeout_secs", config.nlu.timeout_secs.to_string(), &["PIZZABOT_NLU_TIMEOUT_SECS"]),
        field(
            "conversation.reply_delay_ms",
            config.conversation.reply_delay_ms.to_string(),
            &["PIZZABOT_CONVERSATION_REPLY_DELAY_MS"],
        ),
        field(
            "conversation.delivery_eta_minutes",
            config.conversation.delivery_eta_minutes.to_string(),
            &["PIZZABOT_CONVERSATION_DELIVERY_ETA_MINUTES"],
        ),
        field(
            "conversation.default_ingredient",
            config.conversation.default_ingredient.clone(),
            &["PIZZABOT_CONVERSATION_DEFAULT_INGREDIENT"],
        ),
        field(
            "conversation.session_scope",
            format!("{:?}", config.conversation.session_scope),
            &["PIZZABOT_CONVERSATION_SESSION_SCOPE"],
        ),
        field("catalog.pizzas", catalog_summary, &[]),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["PIZZABOT_SERVER_BIND_ADDRESS"],
        ),
        field(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["PIZZABOT_SERVER_HEALTH_CHECK_PORT"],
        ),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["PIZZABOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["PIZZABOT_LOGGING_LEVEL", "PIZZABOT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["PIZZABOT_LOGGING_FORMAT", "PIZZABOT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("pizzabot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/pizzabot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) =
        env_keys.iter().find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()))
    {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the public bot id and hides the secret half.
fn redact_bot_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
