//! Telegram interface for the pizza bot.
//!
//! - **Events** (`events`) - update envelopes, `/start` and `/help` commands, free-text messages
//! - **Polling** (`polling`) - long-polling loop with reconnection and paced reply delivery
//! - **Bot API** (`api`) - `getMe`, `getUpdates`, `sendChatAction`, `sendMessage` over HTTPS
//!
//! # Architecture
//!
//! ```text
//! getUpdates → PollingRunner → EventDispatcher → TextMessageHandler → AgentRuntime
//!                   ↓
//!      typing + pause + sendMessage ← ReplyBatch
//! ```

pub mod api;
pub mod events;
pub mod polling;

pub use api::TelegramTransport;
pub use events::{chat_dispatcher, ChatEnvelope, ChatEvent, EventDispatcher, ReplyBatch};
pub use polling::{ChatTransport, NoopTransport, PollingRunner, ReconnectPolicy, TransportError};
