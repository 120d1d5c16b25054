pub mod engine;
pub mod replies;
pub mod states;

pub use engine::{ConversationEngine, EngineSettings};
pub use replies::Reply;
pub use states::{
    Conversation, ConversationEffect, ConversationRule, ConversationState, TransitionOutcome,
};
