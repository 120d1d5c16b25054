//! Agent runtime: turns one chat message into bot replies.
//!
//! A turn is a constrained loop:
//! 1. **Classification** (`nlu`) - send the raw text to the language service
//!    and receive a labelled entity map
//! 2. **Session lookup** (`session`) - find the conversation the message belongs to
//! 3. **Transition** - run the deterministic state machine from `pizzabot-core`
//! 4. **Commit** - apply the outcome and hand the reply lines to the transport
//!
//! The language service only labels text. It never decides what the bot says
//! or which state comes next; those are deterministic decisions made by the
//! conversation engine.

pub mod nlu;
pub mod runtime;
pub mod session;

pub use nlu::{NluClient, NluError, StaticNluClient, WitNluClient};
pub use runtime::{AgentRuntime, TurnOutcome, NLU_UNAVAILABLE_REPLY};
pub use session::{ConversationKey, SessionStore};
