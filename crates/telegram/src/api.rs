use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use pizzabot_core::config::TelegramConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::events::{ChatEnvelope, ChatEvent, CommandEvent, TextMessageEvent};
use crate::polling::{ChatTransport, TransportError};

/// Extra time on top of the long-poll timeout before the HTTP client gives up.
const REQUEST_GRACE_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
}

/// Maps one Bot API update onto the transport-neutral envelope.
pub fn envelope_from_update(update: Update) -> ChatEnvelope {
    let event = match update.message {
        Some(Message { chat, from, text: Some(text), .. }) => {
            match CommandEvent::parse(chat.id, &text) {
                Some(command) => ChatEvent::Command(command),
                None => ChatEvent::TextMessage(TextMessageEvent {
                    chat_id: chat.id,
                    user_id: from.map(|user| user.id),
                    text,
                }),
            }
        }
        Some(_) => ChatEvent::Unsupported { event_type: "message.non_text".to_owned() },
        None => ChatEvent::Unsupported {
            event_type: update.other.keys().next().cloned().unwrap_or_else(|| "unknown".to_owned()),
        },
    };

    ChatEnvelope { update_id: update.update_id, event }
}

#[derive(Debug, Default)]
struct PollState {
    offset: Option<i64>,
    pending: VecDeque<ChatEnvelope>,
}

/// Telegram Bot API over HTTPS long polling.
pub struct TelegramTransport {
    client: Client,
    api_base_url: String,
    bot_token: SecretString,
    poll_timeout_secs: u64,
    state: Mutex<PollState>,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + REQUEST_GRACE_SECS))
            .build()
            .map_err(|error| TransportError::Connect(redact(error)))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            state: Mutex::new(PollState::default()),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token.expose_secret())
    }

    async fn call<T>(&self, method: &str, body: Value) -> Result<T, String>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(redact)?;
        let status = response.status();
        let payload = response.text().await.map_err(redact)?;

        let decoded: ApiResponse<T> = serde_json::from_str(&payload)
            .map_err(|error| format!("{method} returned status {status}: {error}"))?;

        match decoded {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { error_code, description, .. } => Err(format!(
                "{method} failed ({}): {}",
                error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description.unwrap_or_else(|| "no description".to_owned())
            )),
        }
    }

    fn poll_body(offset: Option<i64>, timeout_secs: u64, limit: Option<u32>) -> Value {
        let mut body = json!({ "timeout": timeout_secs, "allowed_updates": ["message"] });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        if let Some(limit) = limit {
            body["limit"] = json!(limit);
        }
        body
    }
}

fn redact(error: reqwest::Error) -> String {
    error.without_url().to_string()
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let bot: BotUser =
            self.call("getMe", json!({})).await.map_err(TransportError::Connect)?;
        info!(
            bot_id = bot.id,
            bot_username = bot.username.as_deref().unwrap_or("unknown"),
            "telegram bot identity confirmed"
        );
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        let mut state = self.state.lock().await;
        loop {
            if let Some(envelope) = state.pending.pop_front() {
                return Ok(Some(envelope));
            }

            let updates: Vec<Update> = self
                .call("getUpdates", Self::poll_body(state.offset, self.poll_timeout_secs, None))
                .await
                .map_err(TransportError::Receive)?;
            debug!(count = updates.len(), offset = ?state.offset, "telegram poll returned");
            state.pending.extend(updates.into_iter().map(envelope_from_update));
        }
    }

    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let next = update_id + 1;
        state.offset = Some(state.offset.map_or(next, |offset| offset.max(next)));
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
        let _: bool = self
            .call("sendChatAction", json!({ "chat_id": chat_id, "action": "typing" }))
            .await
            .map_err(TransportError::Send)?;
        Ok(())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        let _: Value = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await
            .map_err(TransportError::Send)?;
        Ok(())
    }

    /// Confirms the acknowledged offset with the server so processed updates
    /// are not delivered again after a restart.
    async fn disconnect(&self) -> Result<(), TransportError> {
        let state = self.state.lock().await;
        if state.offset.is_none() {
            return Ok(());
        }

        let _: Vec<Update> = self
            .call("getUpdates", Self::poll_body(state.offset, 0, Some(1)))
            .await
            .map_err(TransportError::Disconnect)?;
        Ok(())
    }
}
