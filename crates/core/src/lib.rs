pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod entities;
pub mod errors;
pub mod flows;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use catalog::Catalog;
pub use config::{AppConfig, LoadOptions, SessionScope};
pub use domain::address::Address;
pub use domain::order::{Order, OrderLine};
pub use domain::pizza::Pizza;
pub use entities::{EntityKind, EntityMap, EntityValue, NluResponse};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    Conversation, ConversationEngine, ConversationEffect, ConversationRule, ConversationState,
    EngineSettings, Reply, TransitionOutcome,
};
