//! Chat-completions backend over HTTP (OpenAI-compatible)

use crate::gateway::{CompletionRequest, GatewayError, ModelBackend};
use crate::types::{ConversationTurn, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the function the model is forced to call with its JSON answer
const JSON_FUNCTION: &str = "jsonify";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    functions: Vec<FunctionSpec<'a>>,
    function_call: FunctionChoice<'a>,
    n: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ConversationTurn> for ChatMessage<'a> {
    fn from(turn: &'a ConversationTurn) -> Self {
        Self {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &turn.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionSpec<'a> {
    name: &'static str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct FunctionChoice<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    arguments: Option<String>,
}

impl ChoiceMessage {
    /// Function-call arguments win over plain content
    fn into_payload(self) -> Option<String> {
        self.function_call
            .and_then(|call| call.arguments)
            .filter(|args| !args.trim().is_empty())
            .or(self.content.filter(|c| !c.trim().is_empty()))
    }
}

/// OpenAI chat-completions backend
pub struct OpenAiBackend {
    endpoint: String,
    api_key: String,
    organization: Option<String>,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            organization: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn sample(&self, request: &CompletionRequest) -> Result<Vec<String>, GatewayError> {
        let body = ChatRequest {
            model: &request.model,
            messages: request.messages.iter().map(ChatMessage::from).collect(),
            functions: vec![FunctionSpec {
                name: JSON_FUNCTION,
                parameters: request.schema.definition(),
            }],
            function_call: FunctionChoice { name: JSON_FUNCTION },
            n: request.candidate_count.max(1),
        };

        let url = format!("{}/v1/chat/completions", self.endpoint);
        let mut req = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, body });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        tracing::debug!("Chat completion returned {} choices", parsed.choices.len());

        Ok(parsed
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.into_payload())
            .collect())
    }
}
