//! LLM gateway: the single boundary to the text-generation backend
//!
//! Backends only know how to turn a transcript into raw completion payloads.
//! The gateway owns everything above that: model selection, the per-call
//! timeout, JSON parsing, schema validation and the "keep whatever parsed"
//! policy for sampled completions.

use crate::config::ModelCatalog;
use crate::schema::ResponseSchema;
use crate::types::{ConversationTurn, ModelTier};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("no usable response ({received} completions received, {requested} requested)")]
    NoUsableResponse { requested: usize, received: usize },
}

/// What a backend is asked to produce
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ConversationTurn>,
    pub schema: ResponseSchema,
    pub candidate_count: usize,
}

/// Pluggable model backend
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return one raw payload per completion the backend produced. Fewer than
    /// `candidate_count` is allowed; parsing happens in the gateway.
    async fn sample(&self, request: &CompletionRequest) -> Result<Vec<String>, GatewayError>;
}

pub type SharedBackend = Arc<dyn ModelBackend>;

pub struct Gateway {
    backend: SharedBackend,
    models: ModelCatalog,
    tier: RwLock<ModelTier>,
    timeout: Duration,
}

impl Gateway {
    pub fn new(backend: SharedBackend, models: ModelCatalog, tier: ModelTier, timeout: Duration) -> Self {
        Self {
            backend,
            models,
            tier: RwLock::new(tier),
            timeout,
        }
    }

    pub async fn model_tier(&self) -> ModelTier {
        *self.tier.read().await
    }

    pub async fn set_model_tier(&self, tier: ModelTier) {
        info!("Model tier set to {:?} ({})", tier, self.models.model_for(tier));
        *self.tier.write().await = tier;
    }

    /// Send `transcript` plus `instruction` as the final user turn, sample
    /// `candidate_count` completions and return those that parse as `T`.
    ///
    /// Individual completions that are not JSON, violate `schema` or do not
    /// deserialize are dropped. Fails only when none survive.
    pub async fn complete<T: DeserializeOwned>(
        &self,
        transcript: &[ConversationTurn],
        instruction: &str,
        schema: &ResponseSchema,
        candidate_count: usize,
    ) -> Result<Vec<T>, GatewayError> {
        let mut messages = transcript.to_vec();
        messages.push(ConversationTurn::user(instruction));

        let model = self.models.model_for(self.model_tier().await).to_string();
        let request = CompletionRequest {
            model,
            messages,
            schema: schema.clone(),
            candidate_count,
        };

        let start = Instant::now();
        debug!(
            "Calling backend '{}': model={}, schema={}, n={}",
            self.backend.name(),
            request.model,
            schema.name(),
            candidate_count
        );

        let payloads = tokio::time::timeout(self.timeout, self.backend.sample(&request))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))??;

        let received = payloads.len();
        let parsed: Vec<T> = payloads
            .iter()
            .enumerate()
            .filter_map(|(idx, raw)| match parse_payload::<T>(raw, schema) {
                Ok(value) => Some(value),
                Err(reason) => {
                    warn!("Discarding completion {} for schema '{}': {}", idx, schema.name(), reason);
                    None
                }
            })
            .collect();

        info!(
            "Backend '{}' answered schema '{}': {}/{} completions usable in {}ms",
            self.backend.name(),
            schema.name(),
            parsed.len(),
            received,
            start.elapsed().as_millis()
        );

        if parsed.is_empty() {
            return Err(GatewayError::NoUsableResponse {
                requested: candidate_count,
                received,
            });
        }

        Ok(parsed)
    }
}

/// Parse one raw completion: JSON, then schema, then the target type
pub fn parse_payload<T: DeserializeOwned>(raw: &str, schema: &ResponseSchema) -> Result<T, String> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| format!("not JSON: {}", e))?;
    schema.validate(&value).map_err(|e| e.to_string())?;
    serde_json::from_value(value).map_err(|e| format!("unexpected shape: {}", e))
}

/// Models occasionally wrap JSON in a markdown fence despite instructions
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Backend answering from a queue of canned responses, for tests and demos
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<Vec<String>, GatewayError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the payloads of the next call
    pub fn push_payloads<I, S>(self, payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let payloads = payloads.into_iter().map(Into::into).collect();
        self.lock_responses().push_back(Ok(payloads));
        self
    }

    /// Queue a failure for the next call
    pub fn push_error(self, error: GatewayError) -> Self {
        self.lock_responses().push_back(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request seen so far, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Vec<String>, GatewayError>>> {
        self.responses.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn sample(&self, request: &CompletionRequest) -> Result<Vec<String>, GatewayError> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.lock_responses()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Transport("no scripted response left".to_string())))
    }
}
