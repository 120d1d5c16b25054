use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use pizzabot_agent::AgentRuntime;
use thiserror::Error;
use tracing::warn;

pub const START_REPLY: &str = "Ready for action.";
pub const HELP_REPLY: &str =
    "Ask me for the menu or tell me which pizzas you want. Say bye to start over.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub update_id: i64,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Command(CommandEvent),
    TextMessage(TextMessageEvent),
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::Command(_) => ChatEventType::Command,
            Self::TextMessage(_) => ChatEventType::TextMessage,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Command(event) => Some(event.chat_id),
            Self::TextMessage(event) => Some(event.chat_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    Command,
    TextMessage,
    Unsupported,
}

/// A `/command` message. `name` has the slash and any `@botname` suffix removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEvent {
    pub chat_id: i64,
    pub name: String,
    pub args: String,
}

impl CommandEvent {
    /// Parses `/name@bot args`; `None` when `text` is not a command.
    pub fn parse(chat_id: i64, text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        Some(Self { chat_id, name, args: args.trim().to_owned() })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub chat_id: i64,
    pub user_id: Option<i64>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn for_update(update_id: i64) -> Self {
        Self { correlation_id: format!("update-{update_id}") }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Reply lines for one chat, delivered in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyBatch {
    pub chat_id: i64,
    pub lines: Vec<String>,
}

impl ReplyBatch {
    pub fn new(chat_id: i64, lines: Vec<String>) -> Self {
        Self { chat_id, lines }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(ReplyBatch),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("text message handler failure: {0}")]
    TextMessage(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher wired with the command handler and `service` for free text.
pub fn chat_dispatcher<S>(service: S) -> EventDispatcher
where
    S: MessageService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(CommandHandler);
    dispatcher.register(TextMessageHandler::new(service));
    dispatcher
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CommandHandler;

#[async_trait]
impl EventHandler for CommandHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Command
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Command(command) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = match command.name.as_str() {
            "start" => START_REPLY,
            "help" => HELP_REPLY,
            _ => return Ok(HandlerResult::Ignored),
        };
        Ok(HandlerResult::Responded(ReplyBatch::new(command.chat_id, vec![reply.to_owned()])))
    }
}

/// Produces the bot's answer to a free-text chat message.
#[async_trait]
pub trait MessageService: Send + Sync {
    async fn handle_text(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<Vec<String>, EventHandlerError>;
}

#[async_trait]
impl<S> MessageService for Arc<S>
where
    S: MessageService + ?Sized,
{
    async fn handle_text(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<Vec<String>, EventHandlerError> {
        self.as_ref().handle_text(event, ctx).await
    }
}

#[async_trait]
impl MessageService for AgentRuntime {
    async fn handle_text(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<Vec<String>, EventHandlerError> {
        match self.handle_message(event.chat_id, &event.text).await {
            Ok(turn) => Ok(turn.replies),
            Err(error) => {
                let interface = error.into_interface(ctx.correlation_id.clone());
                warn!(
                    event_name = "agent.turn.failed",
                    correlation_id = %ctx.correlation_id,
                    chat_id = event.chat_id,
                    error = %interface,
                    "conversation turn failed; answering with a generic reply"
                );
                Ok(vec![interface.user_message().to_owned()])
            }
        }
    }
}

pub struct TextMessageHandler<S> {
    service: S,
}

impl<S> TextMessageHandler<S>
where
    S: MessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for TextMessageHandler<S>
where
    S: MessageService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::TextMessage
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::TextMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let lines = self.service.handle_text(event, ctx).await?;
        Ok(if lines.is_empty() {
            HandlerResult::Processed
        } else {
            HandlerResult::Responded(ReplyBatch::new(event.chat_id, lines))
        })
    }
}
