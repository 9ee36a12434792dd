// Generative-inference provider boundary
//
// Providers sit behind one request/response shape; their wire formats are
// their own business. Structured (JSON) answers must pass a conformance check
// here and malformed output surfaces as a provider error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::{CoordinationError, CoordinationResult};
use super::prompts::{library, PromptTemplate};
use super::types::{AgentRequest, AgentResponse, ValidationResult};
use super::worker::Agent;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: String,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub provider: String,
    pub finish_reason: FinishReason,
}

/// A text/reasoning service
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Failures must be reported as `CoordinationError::Provider`
    async fn generate(&self, request: InferenceRequest) -> CoordinationResult<InferenceResponse>;
}

/// Keys a structured answer must carry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub required: Vec<String>,
}

impl ResponseSchema {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a JSON answer strictly: no fence stripping, no repair.
    pub fn conform(&self, response: &InferenceResponse) -> CoordinationResult<serde_json::Value> {
        if response.finish_reason != FinishReason::Stop {
            return Err(CoordinationError::Provider(format!(
                "{} stopped early ({:?}); structured output is incomplete",
                response.provider, response.finish_reason
            )));
        }

        let value: serde_json::Value = serde_json::from_str(response.content.trim())
            .map_err(|e| {
                CoordinationError::Provider(format!(
                    "{} returned malformed JSON: {}",
                    response.provider, e
                ))
            })?;
        let object = value.as_object().ok_or_else(|| {
            CoordinationError::Provider(format!(
                "{} returned JSON that is not an object",
                response.provider
            ))
        })?;

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|key| !object.contains_key(key.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CoordinationError::Provider(format!(
                "{} response is missing required keys: {}",
                response.provider,
                missing.join(", ")
            )));
        }
        Ok(value)
    }
}

/// Model parameters for a provider-backed agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Agent whose domain logic is one structured call to an inference provider
pub struct ProviderAgent<P> {
    id: String,
    provider: Arc<P>,
    template: PromptTemplate,
    schema: ResponseSchema,
    settings: ModelSettings,
}

impl<P: InferenceProvider> ProviderAgent<P> {
    pub fn new(id: impl Into<String>, provider: Arc<P>, schema: ResponseSchema) -> Self {
        Self {
            id: id.into(),
            provider,
            template: library::work_item(),
            schema,
            settings: ModelSettings::default(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    fn build_request(&self, request: &AgentRequest) -> InferenceRequest {
        let mut variables = match &request.data {
            serde_json::Value::Object(fields) => fields.clone(),
            _ => serde_json::Map::new(),
        };
        variables
            .entry("work_type")
            .or_insert_with(|| serde_json::Value::String(request.request_type.clone()));
        variables
            .entry("input")
            .or_insert_with(|| request.data.clone());
        variables.entry("required_keys").or_insert_with(|| {
            serde_json::Value::String(self.schema.required.join(", "))
        });

        InferenceRequest {
            prompt: self
                .template
                .render_json(&serde_json::Value::Object(variables)),
            system_prompt: Some(self.template.system.clone()),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            model: self.settings.model.clone(),
            response_format: ResponseFormat::Json,
        }
    }
}

#[async_trait]
impl<P: InferenceProvider> Agent for ProviderAgent<P> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn process_request(&self, request: AgentRequest) -> CoordinationResult<AgentResponse> {
        let inference = self.build_request(&request);
        let response = self.provider.generate(inference).await?;
        debug!(
            agent_id = %self.id,
            provider = %response.provider,
            model = %response.model,
            total_tokens = response.usage.total_tokens,
            "Inference completed"
        );

        let data = self.schema.conform(&response)?;
        Ok(AgentResponse::reply_to(
            &request,
            format!("{}_result", request.request_type),
            data,
        ))
    }

    async fn validate_output(&self, output: &serde_json::Value) -> ValidationResult {
        let Some(object) = output.as_object() else {
            return ValidationResult::invalid(vec!["output is not a JSON object".to_string()]);
        };

        let empty: Vec<String> = self
            .schema
            .required
            .iter()
            .filter(|key| {
                object.get(key.as_str()).map_or(true, |v| {
                    v.is_null() || v.as_str().is_some_and(|s| s.trim().is_empty())
                })
            })
            .cloned()
            .collect();
        if !empty.is_empty() {
            return ValidationResult::invalid(
                empty
                    .into_iter()
                    .map(|key| format!("required key '{}' is empty", key))
                    .collect(),
            );
        }

        // A model-reported confidence wins over the structural default
        let confidence = object
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.8);
        ValidationResult::valid(confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct ScriptedProvider {
        reply: Result<String, String>,
        finish_reason: FinishReason,
        seen: Mutex<Vec<InferenceRequest>>,
    }

    impl ScriptedProvider {
        fn answering(content: &str) -> Self {
            Self {
                reply: Ok(content.to_string()),
                finish_reason: FinishReason::Stop,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: InferenceRequest) -> CoordinationResult<InferenceResponse> {
            self.seen.lock().await.push(request.clone());
            match &self.reply {
                Ok(content) => Ok(InferenceResponse {
                    content: content.clone(),
                    usage: TokenUsage::default(),
                    model: request.model,
                    provider: self.name().to_string(),
                    finish_reason: self.finish_reason,
                }),
                Err(e) => Err(CoordinationError::Provider(e.clone())),
            }
        }
    }

    fn response(content: &str) -> InferenceResponse {
        InferenceResponse {
            content: content.to_string(),
            usage: TokenUsage::default(),
            model: DEFAULT_MODEL.to_string(),
            provider: "scripted".to_string(),
            finish_reason: FinishReason::Stop,
        }
    }

    #[test]
    fn conform_accepts_object_with_required_keys() {
        let schema = ResponseSchema::new(["summary"]);

        let value = schema
            .conform(&response(r#" {"summary": "ok", "extra": 1} "#))
            .unwrap();

        assert_eq!(value["summary"], "ok");
    }

    #[test]
    fn conform_rejects_malformed_output() {
        let schema = ResponseSchema::new(["summary"]);

        for content in [
            "not json",
            "```json\n{\"summary\": \"x\"}\n```",
            "[1, 2]",
            r#"{"other": 1}"#,
        ] {
            let err = schema.conform(&response(content)).unwrap_err();
            assert!(matches!(err, CoordinationError::Provider(_)), "{content}");
        }
    }

    #[test]
    fn conform_rejects_truncated_output() {
        let mut truncated = response(r#"{"summary": "x"}"#);
        truncated.finish_reason = FinishReason::Length;

        assert!(ResponseSchema::default().conform(&truncated).is_err());
    }

    #[tokio::test]
    async fn provider_agent_builds_json_request_and_returns_conformed_data() {
        let provider = Arc::new(ScriptedProvider::answering(
            r#"{"summary": "done", "confidence": 0.95}"#,
        ));
        let agent = ProviderAgent::new("writer", provider.clone(), ResponseSchema::new(["summary"]));
        let request = AgentRequest::new("coordinator", "writer", "summarize", json!({"text": "abc"}));

        let response = agent.process_request(request.clone()).await.unwrap();

        assert_eq!(response.request_id, request.id);
        assert_eq!(response.response_type, "summarize_result");
        assert_eq!(response.data["summary"], "done");

        let seen = provider.seen.lock().await;
        assert_eq!(seen[0].response_format, ResponseFormat::Json);
        assert_eq!(seen[0].model, DEFAULT_MODEL);
        assert_eq!(seen[0].max_tokens, DEFAULT_MAX_TOKENS);
        assert!(seen[0].prompt.contains("Work type: summarize"));
        assert!(seen[0].prompt.contains("keys: summary"));
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_provider_error() {
        let provider = Arc::new(ScriptedProvider {
            reply: Err("rate limited".to_string()),
            finish_reason: FinishReason::Error,
            seen: Mutex::new(Vec::new()),
        });
        let agent = ProviderAgent::new("writer", provider, ResponseSchema::default());

        let err = agent
            .process_request(AgentRequest::new("c", "writer", "x", json!({})))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn validate_output_checks_required_keys_and_confidence() {
        let agent = ProviderAgent::new(
            "writer",
            Arc::new(ScriptedProvider::answering("{}")),
            ResponseSchema::new(["summary"]),
        );

        let ok = agent
            .validate_output(&json!({"summary": "x", "confidence": 0.6}))
            .await;
        let blank = agent.validate_output(&json!({"summary": "  "})).await;
        let not_object = agent.validate_output(&json!(3)).await;

        assert!(ok.is_valid);
        assert_eq!(ok.confidence, 0.6);
        assert!(!blank.is_valid);
        assert!(!not_object.is_valid);
    }
}
