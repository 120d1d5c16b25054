use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use pizzabot_core::errors::ApplicationError;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{ChatEnvelope, EventContext, EventDispatcher, HandlerResult, ReplyBatch};

pub const DEFAULT_REPLY_DELAY_MS: u64 = 700;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

impl From<TransportError> for ApplicationError {
    fn from(error: TransportError) -> Self {
        ApplicationError::Transport(error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &'static str;
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next inbound update; `None` once the stream is closed.
    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError>;
    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError>;
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Transport with no inbound traffic, for runs without a bot token.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl ChatTransport for NoopTransport {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _update_id: i64) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_typing(&self, _chat_id: i64) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct PollingRunner {
    transport: Arc<dyn ChatTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    reply_delay: Duration,
}

impl Default for PollingRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopTransport),
            dispatcher: EventDispatcher::default(),
            reconnect_policy: ReconnectPolicy::default(),
            reply_delay: Duration::from_millis(DEFAULT_REPLY_DELAY_MS),
        }
    }
}

impl PollingRunner {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy, ..Self::default() }
    }

    /// Pause between the typing indicator and each reply line.
    pub fn with_reply_delay(mut self, reply_delay: Duration) -> Self {
        self.reply_delay = reply_delay;
        self
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Runs until the update stream closes. Only consecutive failures count
    /// against `max_retries`: a session that polled successfully resets the
    /// budget. Returns the last transport error once retries are exhausted.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0_u32;
        loop {
            let mut polled = false;
            let Err(transport_error) = self.connect_and_pump(attempt, &mut polled).await else {
                return Ok(());
            };
            if polled {
                attempt = 0;
            }

            warn!(
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                transport = self.transport.name(),
                error = %transport_error,
                "chat transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    transport = self.transport.name(),
                    "chat transport retries exhausted"
                );
                return Err(transport_error.into());
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn connect_and_pump(&self, attempt: u32, polled: &mut bool) -> Result<(), TransportError> {
        info!(attempt, transport = self.transport.name(), "opening chat transport connection");
        self.transport.connect().await?;
        info!(attempt, transport = self.transport.name(), "chat transport connected");

        loop {
            let next = self.transport.next_envelope().await?;
            *polled = true;
            let Some(envelope) = next else {
                info!(attempt, "chat transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let context = EventContext::for_update(envelope.update_id);

            info!(
                event_name = "ingress.telegram.update_received",
                update_id = envelope.update_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %context.correlation_id,
                chat_id = envelope.event.chat_id().unwrap_or_default(),
                "received chat update"
            );

            if let Err(error) = self.transport.acknowledge(envelope.update_id).await {
                warn!(
                    event_name = "ingress.telegram.ack_sent",
                    update_id = envelope.update_id,
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "failed to acknowledge chat update"
                );
            } else {
                debug!(
                    event_name = "ingress.telegram.ack_sent",
                    update_id = envelope.update_id,
                    correlation_id = %context.correlation_id,
                    "acknowledged chat update"
                );
            }

            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(batch)) => self.deliver(&batch, &context).await,
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        update_id = envelope.update_id,
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "event dispatch failed; continuing polling loop"
                    );
                }
            }
        }
    }

    /// Sends every line in order, each preceded by a typing indicator and the
    /// configured pause. A failed line is logged and the rest still go out.
    async fn deliver(&self, batch: &ReplyBatch, context: &EventContext) {
        for (index, line) in batch.lines.iter().enumerate() {
            if let Err(error) = self.transport.send_typing(batch.chat_id).await {
                debug!(
                    chat_id = batch.chat_id,
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "typing indicator failed"
                );
            }
            if !self.reply_delay.is_zero() {
                tokio::time::sleep(self.reply_delay).await;
            }

            match self.transport.send_message(batch.chat_id, line).await {
                Ok(()) => debug!(
                    event_name = "egress.telegram.reply_sent",
                    chat_id = batch.chat_id,
                    correlation_id = %context.correlation_id,
                    line = index,
                    "reply line sent"
                ),
                Err(error) => warn!(
                    event_name = "egress.telegram.reply_failed",
                    chat_id = batch.chat_id,
                    correlation_id = %context.correlation_id,
                    line = index,
                    error = %error,
                    "failed to send reply line"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{ChatTransport, PollingRunner, ReconnectPolicy, TransportError};
    use crate::events::{
        chat_dispatcher, ChatEnvelope, ChatEvent, CommandEvent, EventContext, EventDispatcher,
        EventHandlerError, MessageService, TextMessageEvent,
    };

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Outbound {
        Typing(i64),
        Message(i64, String),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<ChatEnvelope>, TransportError>>,
        send_failures: VecDeque<bool>,
        connect_attempts: usize,
        acknowledgements: Vec<i64>,
        outbound: Vec<Outbound>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<ChatEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn fail_next_sends(&self, failures: Vec<bool>) {
            self.state.lock().await.send_failures = failures.into();
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<i64> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn outbound(&self) -> Vec<Outbound> {
            self.state.lock().await.outbound.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
            self.state.lock().await.acknowledgements.push(update_id);
            Ok(())
        }

        async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
            self.state.lock().await.outbound.push(Outbound::Typing(chat_id));
            Ok(())
        }

        async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            if state.send_failures.pop_front().unwrap_or(false) {
                return Err(TransportError::Send("chat not found".to_owned()));
            }
            state.outbound.push(Outbound::Message(chat_id, text.to_owned()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.lock().await.disconnect_calls += 1;
            Ok(())
        }
    }

    struct TwoLineService;

    #[async_trait]
    impl MessageService for TwoLineService {
        async fn handle_text(
            &self,
            event: &TextMessageEvent,
            _ctx: &EventContext,
        ) -> Result<Vec<String>, EventHandlerError> {
            Ok(vec![format!("first: {}", event.text), "second".to_owned()])
        }
    }

    fn text(update_id: i64, chat_id: i64, body: &str) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(Some(ChatEnvelope {
            update_id,
            event: ChatEvent::TextMessage(TextMessageEvent {
                chat_id,
                user_id: None,
                text: body.to_owned(),
            }),
        }))
    }

    fn immediate() -> ReconnectPolicy {
        ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(ChatEnvelope {
                    update_id: 10,
                    event: ChatEvent::Unsupported { event_type: "edited_message".to_owned() },
                })),
                Ok(None),
            ],
        ));

        let runner = PollingRunner::new(transport.clone(), EventDispatcher::default(), immediate());

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec![10]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_error() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = PollingRunner::new(transport.clone(), EventDispatcher::default(), immediate());

        let error = runner.start().await.expect_err("retries exhausted");
        assert!(error.to_string().contains("fail-3"));
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn failures_between_healthy_polls_do_not_exhaust_retries() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                text(1, 9, "a"),
                Err(TransportError::Receive("blip-1".to_owned())),
                text(2, 9, "b"),
                Err(TransportError::Receive("blip-2".to_owned())),
                text(3, 9, "c"),
                Err(TransportError::Receive("blip-3".to_owned())),
                text(4, 9, "d"),
                text(5, 9, "e"),
                Ok(None),
            ],
        ));

        let runner =
            PollingRunner::new(transport.clone(), chat_dispatcher(TwoLineService), immediate())
                .with_reply_delay(Duration::ZERO);
        runner.start().await.expect("isolated failures are retried");

        assert_eq!(transport.acknowledgements().await, vec![1, 2, 3, 4, 5]);
        assert_eq!(transport.connect_attempts().await, 4);
    }

    #[tokio::test]
    async fn consecutive_receive_failures_after_connect_exhaust_retries() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                Err(TransportError::Receive("down-1".to_owned())),
                Err(TransportError::Receive("down-2".to_owned())),
                Err(TransportError::Receive("down-3".to_owned())),
                text(1, 9, "never"),
            ],
        ));

        let runner = PollingRunner::new(transport.clone(), EventDispatcher::default(), immediate());
        runner.start().await.expect_err("nothing was ever polled");

        assert_eq!(transport.connect_attempts().await, 3);
        assert!(transport.acknowledgements().await.is_empty());
    }

    #[tokio::test]
    async fn receive_failure_triggers_reconnect() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(())],
            vec![Err(TransportError::Receive("timeout".to_owned())), text(3, 9, "hi"), Ok(None)],
        ));

        let runner =
            PollingRunner::new(transport.clone(), chat_dispatcher(TwoLineService), immediate())
                .with_reply_delay(Duration::ZERO);
        runner.start().await.expect("runner");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_each_line_in_order_with_typing_and_pause() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                text(1, 5, "hello"),
                Ok(Some(ChatEnvelope {
                    update_id: 2,
                    event: ChatEvent::Command(CommandEvent::parse(5, "/start").expect("command")),
                })),
                Ok(None),
            ],
        ));

        let runner =
            PollingRunner::new(transport.clone(), chat_dispatcher(TwoLineService), immediate());
        let started = tokio::time::Instant::now();
        runner.start().await.expect("runner");

        assert_eq!(
            transport.outbound().await,
            vec![
                Outbound::Typing(5),
                Outbound::Message(5, "first: hello".to_owned()),
                Outbound::Typing(5),
                Outbound::Message(5, "second".to_owned()),
                Outbound::Typing(5),
                Outbound::Message(5, "Ready for action.".to_owned()),
            ]
        );
        assert!(started.elapsed() >= Duration::from_millis(3 * 700));
    }

    #[tokio::test]
    async fn failed_line_does_not_stop_the_batch() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![text(1, 5, "hello"), Ok(None)],
        ));
        transport.fail_next_sends(vec![true, false]).await;

        let runner =
            PollingRunner::new(transport.clone(), chat_dispatcher(TwoLineService), immediate())
                .with_reply_delay(Duration::ZERO);
        runner.start().await.expect("runner");

        let messages: Vec<_> = transport
            .outbound()
            .await
            .into_iter()
            .filter(|event| matches!(event, Outbound::Message(..)))
            .collect();
        assert_eq!(messages, vec![Outbound::Message(5, "second".to_owned())]);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = ReconnectPolicy { max_retries: 5, base_delay_ms: 100, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_millis(1_000));
    }
}
