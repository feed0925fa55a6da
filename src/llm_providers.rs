use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::CollaboratorError;

/// Common message structure for chat completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<LLMMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProviderType {
    Mistral,
    OpenAI,
}

impl LLMProviderType {
    pub fn default_base_url(self) -> &'static str {
        match self {
            LLMProviderType::Mistral => "https://api.mistral.ai/v1",
            LLMProviderType::OpenAI => "https://api.openai.com/v1",
        }
    }

    pub fn provider_name(self) -> &'static str {
        match self {
            LLMProviderType::Mistral => "Mistral",
            LLMProviderType::OpenAI => "OpenAI",
        }
    }

    /// Lenient parse of a configured provider name, defaulting to Mistral.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "openai" | "chatgpt" | "gpt" => LLMProviderType::OpenAI,
            "mistral" | "mistralai" => LLMProviderType::Mistral,
            _ => {
                info!("Unknown LLM provider '{}', defaulting to Mistral", value);
                LLMProviderType::Mistral
            }
        }
    }
}

/// OpenAI-compatible chat completions client in JSON mode.
#[derive(Debug, Clone)]
pub struct LLMProvider {
    client: Client,
    kind: LLMProviderType,
    api_key: String,
    base_url: String,
    model_override: Option<String>,
}

impl LLMProvider {
    /// Model actually sent upstream: the configured override, else the tier's id.
    pub fn resolve_model<'a>(&'a self, tier_model: &'a str) -> &'a str {
        self.model_override.as_deref().unwrap_or(tier_model)
    }

    pub fn provider_name(&self) -> &'static str {
        self.kind.provider_name()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a single user message and returns the reply content.
    pub async fn make_request(&self, model: &str, prompt: &str) -> Result<String, CollaboratorError> {
        let request_body = ChatRequest {
            model: self.resolve_model(model).to_string(),
            messages: vec![LLMMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            response_format: ResponseFormat { kind: "json_object" },
        };

        info!(
            provider = self.provider_name(),
            model = %request_body.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = self.provider_name(),
                status = %status,
                error = %body,
                "LLM API request failed"
            );
            return Err(CollaboratorError::Status { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::MalformedPayload(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CollaboratorError::EmptyResponse)?;

        info!(
            provider = self.provider_name(),
            response_length = content.len(),
            "Successfully received LLM response"
        );
        Ok(content)
    }
}

/// Centralized JSON response parser with robust extraction logic
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseParser;

impl JsonResponseParser {
    /// Extract JSON from replies that might be wrapped in markdown fences or prose
    pub fn extract_json_from_response(content: &str) -> String {
        if let Some(start) = content.find("```json") {
            if let Some(end) = content[start + 7..].find("```") {
                let json_start = start + 7;
                return content[json_start..json_start + end].trim().to_string();
            }
        }

        if let Some(start) = content.find("```") {
            if let Some(end) = content[start + 3..].find("```") {
                let json_start = start + 3;
                let candidate = content[json_start..json_start + end].trim();
                if candidate.starts_with('{') {
                    return candidate.to_string();
                }
            }
        }

        if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
            if end > start {
                return content[start..=end].to_string();
            }
        }

        content.trim().to_string()
    }

    pub fn parse_json_response<T>(&self, content: &str) -> Result<T, CollaboratorError>
    where
        T: serde::de::DeserializeOwned,
    {
        let json_content = Self::extract_json_from_response(content);
        serde_json::from_str::<T>(&json_content).map_err(|e| CollaboratorError::MalformedPayload(e.to_string()))
    }
}

/// Factory for creating LLM providers based on provider type
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    pub fn create_provider(
        provider_type: LLMProviderType,
        api_key: String,
        base_url: Option<String>,
        model_override: Option<String>,
    ) -> LLMProvider {
        LLMProvider {
            client: Client::new(),
            kind: provider_type,
            api_key,
            base_url: base_url.unwrap_or_else(|| provider_type.default_base_url().to_string()),
            model_override,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_extracts_fenced_json() {
        let content = "Here you go:\n```json\n{\"isCorrect\": true}\n```\nthanks";
        assert_eq!(JsonResponseParser::extract_json_from_response(content), "{\"isCorrect\": true}");
    }

    #[test]
    fn test_extracts_bare_object_from_prose() {
        let content = "Sure! {\"summary\": \"ok\", \"improvementTips\": \"more\"} Hope that helps.";
        let parsed: Value = JsonResponseParser.parse_json_response(content).unwrap();
        assert_eq!(parsed["summary"], "ok");
    }

    #[test]
    fn test_unparseable_reply_is_malformed() {
        let result: Result<Value, _> = JsonResponseParser.parse_json_response("no json here");
        assert!(matches!(result, Err(CollaboratorError::MalformedPayload(_))));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(LLMProviderType::parse("OpenAI"), LLMProviderType::OpenAI);
        assert_eq!(LLMProviderType::parse("gpt"), LLMProviderType::OpenAI);
        assert_eq!(LLMProviderType::parse("mistral"), LLMProviderType::Mistral);
        assert_eq!(LLMProviderType::parse("claude"), LLMProviderType::Mistral);
    }

    #[test]
    fn test_factory_defaults() {
        let provider = LLMProviderFactory::create_provider(LLMProviderType::Mistral, "key".to_string(), None, None);
        assert_eq!(provider.base_url(), "https://api.mistral.ai/v1");
        assert_eq!(provider.resolve_model("mistral-small-latest"), "mistral-small-latest");

        let provider = LLMProviderFactory::create_provider(
            LLMProviderType::OpenAI,
            "key".to_string(),
            None,
            Some("gpt-4o-mini".to_string()),
        );
        assert_eq!(provider.provider_name(), "OpenAI");
        assert_eq!(provider.resolve_model("mistral-small-latest"), "gpt-4o-mini");
    }
}
