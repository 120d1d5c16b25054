use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pizzabot_core::config::NluConfig;
use pizzabot_core::entities::{EntityMap, NluResponse};
use pizzabot_core::errors::ApplicationError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NluError {
    #[error("language service is unreachable: {0}")]
    Unavailable(String),
    #[error("language service rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("language service returned an unreadable body: {0}")]
    Decode(String),
}

impl From<NluError> for ApplicationError {
    fn from(error: NluError) -> Self {
        ApplicationError::NluUnavailable(error.to_string())
    }
}

/// Labels free text with the entities the conversation engine dispatches on.
#[async_trait]
pub trait NluClient: Send + Sync {
    fn provider(&self) -> &'static str;
    async fn classify(&self, text: &str) -> Result<NluResponse, NluError>;
}

/// Wit.ai `/message` endpoint client.
#[derive(Clone, Debug)]
pub struct WitNluClient {
    client: Client,
    base_url: String,
    api_version: String,
    access_token: SecretString,
}

impl WitNluClient {
    pub fn new(config: &NluConfig) -> Result<Self, NluError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| NluError::Unavailable(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/message", self.base_url)
    }
}

#[async_trait]
impl NluClient for WitNluClient {
    fn provider(&self) -> &'static str {
        "wit"
    }

    async fn classify(&self, text: &str) -> Result<NluResponse, NluError> {
        let response = self
            .client
            .get(self.endpoint())
            .bearer_auth(self.access_token.expose_secret())
            .query(&[("v", self.api_version.as_str()), ("q", text)])
            .send()
            .await
            .map_err(|error| NluError::Unavailable(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NluError::Rejected { status: status.as_u16() });
        }

        let body =
            response.text().await.map_err(|error| NluError::Unavailable(error.to_string()))?;
        serde_json::from_str::<NluResponse>(&body).map_err(|error| NluError::Decode(error.to_string()))
    }
}

/// Scripted classifier keyed by exact message text. Unknown texts classify to
/// an empty entity map.
#[derive(Clone, Debug, Default)]
pub struct StaticNluClient {
    responses: HashMap<String, EntityMap>,
    offline: bool,
}

impl StaticNluClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every call fails as if the service were down.
    pub fn unavailable() -> Self {
        Self { responses: HashMap::new(), offline: true }
    }

    pub fn with_response(mut self, text: impl Into<String>, entities: EntityMap) -> Self {
        self.responses.insert(text.into(), entities);
        self
    }
}

#[async_trait]
impl NluClient for StaticNluClient {
    fn provider(&self) -> &'static str {
        "static"
    }

    async fn classify(&self, text: &str) -> Result<NluResponse, NluError> {
        if self.offline {
            return Err(NluError::Unavailable("static classifier is offline".to_string()));
        }

        let entities = self.responses.get(text).cloned().unwrap_or_default();
        Ok(NluResponse { text: Some(text.to_string()), entities })
    }
}
