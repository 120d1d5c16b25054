use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use pizzabot_agent::AgentRuntime;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
    transport: &'static str,
}

impl HealthState {
    pub fn new(runtime: Arc<AgentRuntime>, transport: &'static str) -> Self {
        Self { runtime, transport }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub nlu: HealthCheck,
    pub transport: HealthCheck,
    pub active_sessions: usize,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let transport = transport_check(state.transport);
    let ready = transport.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "pizzabot-server runtime initialized".to_string(),
        },
        nlu: HealthCheck {
            status: "configured",
            detail: format!("classifying with the `{}` client", state.runtime.nlu_provider()),
        },
        transport,
        active_sessions: state.runtime.active_sessions().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn transport_check(transport: &'static str) -> HealthCheck {
    match transport {
        "noop" => HealthCheck {
            status: "degraded",
            detail: "no bot token configured; chat traffic is not being received".to_string(),
        },
        name => HealthCheck { status: "ready", detail: format!("{name} transport active") },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::{extract::State, Json};
    use pizzabot_agent::{AgentRuntime, StaticNluClient};
    use pizzabot_core::config::SessionScope;
    use pizzabot_core::entities::{EntityKind, EntityMap};
    use pizzabot_core::flows::ConversationEngine;
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    fn runtime() -> Arc<AgentRuntime> {
        Arc::new(AgentRuntime::new(
            Arc::new(StaticNluClient::new()),
            ConversationEngine::default(),
            SessionScope::PerChat,
        ))
    }

    #[tokio::test]
    async fn health_returns_ready_with_live_transport() {
        let runtime = runtime();
        runtime
            .handle_entities(1, &EntityMap::new().with(EntityKind::Greetings, "true"))
            .await
            .expect("turn");
        runtime
            .handle_entities(2, &EntityMap::new().with(EntityKind::Greetings, "true"))
            .await
            .expect("turn");

        let (status, Json(payload)) = health(State(HealthState::new(runtime, "telegram"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.transport.status, "ready");
        assert_eq!(payload.nlu.status, "configured");
        assert!(payload.nlu.detail.contains("static"));
        assert_eq!(payload.active_sessions, 2);
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_without_transport() {
        let (status, Json(payload)) = health(State(HealthState::new(runtime(), "noop"))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.transport.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_route_serves_json() {
        let response = router(HealthState::new(runtime(), "telegram"))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        for key in ["status", "service", "nlu", "transport", "active_sessions", "checked_at"] {
            assert!(payload.get(key).is_some(), "missing `{key}`");
        }
    }
}
