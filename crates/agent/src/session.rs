use std::collections::HashMap;
use std::fmt;

use pizzabot_core::config::SessionScope;
use pizzabot_core::flows::{Conversation, ConversationEngine, ConversationState};
use tokio::sync::Mutex;

/// Identifies one conversation under the configured [`SessionScope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Global,
    Chat(i64),
}

impl ConversationKey {
    pub fn for_chat(scope: SessionScope, chat_id: i64) -> Self {
        match scope {
            SessionScope::Global => Self::Global,
            SessionScope::PerChat => Self::Chat(chat_id),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Chat(chat_id) => write!(f, "chat:{chat_id}"),
        }
    }
}

/// In-memory conversations. Nothing survives a restart.
#[derive(Debug)]
pub struct SessionStore {
    scope: SessionScope,
    sessions: Mutex<HashMap<ConversationKey, Conversation>>,
}

impl SessionStore {
    pub fn new(scope: SessionScope) -> Self {
        Self { scope, sessions: Mutex::new(HashMap::new()) }
    }

    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    pub fn key_for(&self, chat_id: i64) -> ConversationKey {
        ConversationKey::for_chat(self.scope, chat_id)
    }

    /// Runs `turn` against the conversation for `key` while holding the store
    /// lock. A missing conversation starts fresh in `Greeting`.
    pub async fn with_conversation<T>(
        &self,
        key: ConversationKey,
        engine: &ConversationEngine,
        turn: impl FnOnce(&mut Conversation) -> T,
    ) -> T {
        let mut sessions = self.sessions.lock().await;
        let conversation = sessions.entry(key).or_insert_with(|| engine.start());
        turn(conversation)
    }

    pub async fn snapshot(&self, key: ConversationKey) -> Option<Conversation> {
        self.sessions.lock().await.get(&key).cloned()
    }

    pub async fn state_of(&self, key: ConversationKey) -> ConversationState {
        self.sessions
            .lock()
            .await
            .get(&key)
            .map(|conversation| conversation.state)
            .unwrap_or(ConversationState::Greeting)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use pizzabot_core::config::SessionScope;
    use pizzabot_core::flows::{ConversationEngine, ConversationState};

    use super::{ConversationKey, SessionStore};

    #[test]
    fn keys_follow_scope() {
        assert_eq!(ConversationKey::for_chat(SessionScope::Global, 7), ConversationKey::Global);
        assert_eq!(ConversationKey::for_chat(SessionScope::PerChat, 7), ConversationKey::Chat(7));
        assert_eq!(ConversationKey::Chat(7).to_string(), "chat:7");
    }

    #[tokio::test]
    async fn missing_conversation_starts_in_greeting() {
        let store = SessionStore::new(SessionScope::PerChat);
        let engine = ConversationEngine::default();
        let key = store.key_for(11);

        assert_eq!(store.state_of(key).await, ConversationState::Greeting);
        assert!(store.snapshot(key).await.is_none());

        store
            .with_conversation(key, &engine, |conversation| {
                conversation.state = ConversationState::AddressCity;
            })
            .await;

        assert_eq!(store.state_of(key).await, ConversationState::AddressCity);
        assert_eq!(store.state_of(store.key_for(12)).await, ConversationState::Greeting);
        assert_eq!(store.active_sessions().await, 1);
    }
}
