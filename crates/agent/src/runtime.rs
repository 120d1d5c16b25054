use std::sync::Arc;

use pizzabot_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use pizzabot_core::config::SessionScope;
use pizzabot_core::entities::EntityMap;
use pizzabot_core::errors::ApplicationError;
use pizzabot_core::flows::{
    Conversation, ConversationEngine, ConversationRule, ConversationState,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::nlu::NluClient;
use crate::session::{ConversationKey, SessionStore};

pub const NLU_UNAVAILABLE_REPLY: &str =
    "Sorry, I can't reach my language service right now. Please try again in a moment.";

const AUDIT_ACTOR: &str = "pizzabot.agent";

/// Result of one processed chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub replies: Vec<String>,
    pub state: ConversationState,
    /// `None` when no transition ran.
    pub rule: Option<ConversationRule>,
    pub correlation_id: String,
}

pub struct AgentRuntime {
    nlu: Arc<dyn NluClient>,
    engine: ConversationEngine,
    sessions: SessionStore,
    audit: Arc<dyn AuditSink>,
}

impl AgentRuntime {
    pub fn new(nlu: Arc<dyn NluClient>, engine: ConversationEngine, scope: SessionScope) -> Self {
        Self { nlu, engine, sessions: SessionStore::new(scope), audit: Arc::new(NoopAuditSink) }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    pub fn nlu_provider(&self) -> &'static str {
        self.nlu.provider()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.active_sessions().await
    }

    pub async fn conversation(&self, chat_id: i64) -> Option<Conversation> {
        self.sessions.snapshot(self.sessions.key_for(chat_id)).await
    }

    /// Classifies `text` and advances the chat's conversation by one turn.
    ///
    /// A language service failure is answered with an apology and leaves the
    /// conversation exactly as it was.
    pub async fn handle_message(
        &self,
        chat_id: i64,
        text: &str,
    ) -> Result<TurnOutcome, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let key = self.sessions.key_for(chat_id);

        match self.nlu.classify(text).await {
            Ok(response) => self.run_turn(key, chat_id, &response.entities, correlation_id).await,
            Err(error) => {
                let state = self.sessions.state_of(key).await;
                warn!(
                    event_name = "agent.turn.nlu_unavailable",
                    correlation_id = %correlation_id,
                    chat_id,
                    provider = self.nlu.provider(),
                    state = state.as_str(),
                    error = %error,
                    "language service call failed; conversation left unchanged"
                );
                self.audit.emit(
                    AuditEvent::new(
                        &self.audit_context(key, &correlation_id),
                        "nlu.classification_failed",
                        AuditCategory::Nlu,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("provider", self.nlu.provider())
                    .with_metadata("error", error.to_string()),
                );

                let interface = ApplicationError::from(error).into_interface(&correlation_id);
                Ok(TurnOutcome {
                    replies: vec![interface.user_message().to_string()],
                    state,
                    rule: None,
                    correlation_id,
                })
            }
        }
    }

    /// Advances the conversation with an already classified message.
    pub async fn handle_entities(
        &self,
        chat_id: i64,
        entities: &EntityMap,
    ) -> Result<TurnOutcome, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let key = self.sessions.key_for(chat_id);
        self.run_turn(key, chat_id, entities, correlation_id).await
    }

    async fn run_turn(
        &self,
        key: ConversationKey,
        chat_id: i64,
        entities: &EntityMap,
        correlation_id: String,
    ) -> Result<TurnOutcome, ApplicationError> {
        let context = self.audit_context(key, &correlation_id);
        let outcome = self
            .sessions
            .with_conversation(key, &self.engine, |conversation| {
                let outcome = self.engine.transition_with_audit(
                    conversation,
                    entities,
                    self.audit.as_ref(),
                    &context,
                )?;
                conversation.apply(&outcome)?;
                Ok::<_, ApplicationError>(outcome)
            })
            .await?;

        info!(
            event_name = "agent.turn.completed",
            correlation_id = %correlation_id,
            chat_id,
            conversation = %key,
            from = outcome.from.as_str(),
            state = outcome.to.as_str(),
            rule = ?outcome.rule,
            replies = outcome.replies.len(),
            "conversation turn completed"
        );

        Ok(TurnOutcome {
            replies: outcome.replies,
            state: outcome.to,
            rule: Some(outcome.rule),
            correlation_id,
        })
    }

    fn audit_context(&self, key: ConversationKey, correlation_id: &str) -> AuditContext {
        AuditContext::new(Some(key.to_string()), correlation_id, AUDIT_ACTOR)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pizzabot_core::audit::{AuditCategory, InMemoryAuditSink};
    use pizzabot_core::config::SessionScope;
    use pizzabot_core::entities::{EntityKind, EntityMap};
    use pizzabot_core::flows::{ConversationEngine, ConversationRule, ConversationState};
    use serde_json::json;

    use super::{AgentRuntime, NLU_UNAVAILABLE_REPLY};
    use crate::nlu::StaticNluClient;

    fn scripted_nlu() -> StaticNluClient {
        StaticNluClient::new()
            .with_response("hi", EntityMap::new().with(EntityKind::Greetings, "true"))
            .with_response(
                "two margheritas",
                EntityMap::new()
                    .with(EntityKind::IntentOrder, "true")
                    .with(EntityKind::PizzaType, "margherita")
                    .with(EntityKind::PizzaAmount, 2),
            )
            .with_response("that's all", EntityMap::new().with(EntityKind::IntentNo, "true"))
            .with_response("anna", EntityMap::new().with(EntityKind::Contact, "anna"))
            .with_response("berlin", EntityMap::new().with(EntityKind::City, "BERLIN"))
            .with_response("10115", EntityMap::new().with(EntityKind::Number, 10115))
            .with_response(
                "main street 5",
                EntityMap::new()
                    .with(EntityKind::StreetName, "Main Street")
                    .with(EntityKind::StreetNumber, "5"),
            )
            .with_response("yes", EntityMap::new().with(EntityKind::IntentYes, "true"))
    }

    fn runtime(nlu: StaticNluClient, scope: SessionScope) -> AgentRuntime {
        AgentRuntime::new(Arc::new(nlu), ConversationEngine::default(), scope)
    }

    #[tokio::test]
    async fn full_order_reaches_summary() {
        let runtime = runtime(scripted_nlu(), SessionScope::Global);

        let mut last = None;
        for text in
            ["hi", "two margheritas", "that's all", "anna", "berlin", "10115", "main street 5", "yes"]
        {
            last = Some(runtime.handle_message(1, text).await.expect("turn"));
        }

        let summary = last.expect("last turn");
        assert_eq!(summary.state, ConversationState::Summary);
        assert_eq!(summary.rule, Some(ConversationRule::ConfirmAddress));
        assert_eq!(
            summary.replies,
            vec![
                "Here is the summary of your order:\n- 2 margherita (mozarella, tomato sauce)\nDelivery address: Anna, Main Street 5, 10115, Berlin".to_string(),
                "Hold tight. We will be there in 20 minutes!".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn nlu_failure_apologizes_and_keeps_state() {
        let runtime = runtime(StaticNluClient::unavailable(), SessionScope::Global);
        runtime
            .handle_entities(1, &EntityMap::new().with(EntityKind::IntentOrder, "true"))
            .await
            .expect("order turn");
        let before = runtime.conversation(1).await.expect("conversation exists");

        let outcome = runtime.handle_message(1, "two margheritas").await.expect("apology");

        assert_eq!(outcome.replies, vec![NLU_UNAVAILABLE_REPLY.to_string()]);
        assert_eq!(outcome.rule, None);
        assert_eq!(outcome.state, ConversationState::Order);
        assert_eq!(runtime.conversation(1).await, Some(before));
    }

    #[tokio::test]
    async fn per_chat_scope_isolates_conversations() {
        let runtime = runtime(scripted_nlu(), SessionScope::PerChat);

        runtime.handle_message(1, "two margheritas").await.expect("chat one");
        let other = runtime.handle_message(2, "anna").await.expect("chat two");

        assert_eq!(other.state, ConversationState::Greeting);
        assert_eq!(other.rule, Some(ConversationRule::Fallback));
        assert_eq!(runtime.active_sessions().await, 2);
    }

    #[tokio::test]
    async fn global_scope_shares_one_conversation() {
        let runtime = runtime(scripted_nlu(), SessionScope::Global);

        runtime.handle_message(1, "two margheritas").await.expect("chat one");
        let other = runtime.handle_message(2, "that's all").await.expect("chat two");

        assert_eq!(other.state, ConversationState::AddressStart);
        assert_eq!(runtime.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn turns_are_audited() {
        let sink = InMemoryAuditSink::default();
        let runtime =
            runtime(scripted_nlu(), SessionScope::Global).with_audit_sink(Arc::new(sink.clone()));

        let outcome = runtime
            .handle_entities(5, &serde_json::from_value(json!({"bye": [{"value": "true"}]})).expect("map"))
            .await
            .expect("turn");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "conversation.transition_applied");
        assert_eq!(events[0].category, AuditCategory::Conversation);
        assert_eq!(events[0].correlation_id, outcome.correlation_id);
        assert_eq!(events[0].conversation_id.as_deref(), Some("global"));
    }
}
