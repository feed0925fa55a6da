use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

use crate::errors::CollaboratorError;
use crate::grading::GradingService;
use crate::llm_providers::{JsonResponseParser, LLMProvider, LLMProviderFactory, LLMProviderType};
use crate::models::{GradeRequest, GradeVerdict, ResultRecord, SessionSummary, SummaryRequest};
use crate::summary::SummaryService;
use crate::{log_collaborator, log_validation};

/// LLM-backed grading and summary collaborator.
///
/// Built without an API key it has no provider, and every call fails with
/// `CollaboratorError::MissingCredential` so the pipelines fall back locally.
#[derive(Clone)]
pub struct LLMService {
    provider: Option<LLMProvider>,
    json_parser: JsonResponseParser,
}

impl LLMService {
    pub fn new_with_provider(
        api_key: Option<String>,
        base_url: Option<String>,
        provider_type: LLMProviderType,
        model_override: Option<String>,
    ) -> Self {
        let provider = api_key
            .filter(|key| !key.trim().is_empty())
            .map(|key| LLMProviderFactory::create_provider(provider_type, key, base_url, model_override));

        Self {
            provider,
            json_parser: JsonResponseParser,
        }
    }

    /// Service with no credential; always defers to the local fallback.
    pub fn unconfigured() -> Self {
        Self {
            provider: None,
            json_parser: JsonResponseParser,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        self.provider.as_ref().map(LLMProvider::provider_name)
    }

    async fn request_json<T>(&self, operation: &'static str, model: &str, prompt: &str) -> Result<T, CollaboratorError>
    where
        T: serde::de::DeserializeOwned,
    {
        let provider = self.provider.as_ref().ok_or(CollaboratorError::MissingCredential)?;
        log_collaborator!(start, operation, provider = provider.provider_name(), model = provider.resolve_model(model));

        let started = Instant::now();
        let reply = match provider.make_request(model, prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                log_collaborator!(error, operation, provider = provider.provider_name(), error = e);
                return Err(e);
            }
        };
        debug!(operation, response_content = %reply, "Raw LLM response");

        match self.json_parser.parse_json_response::<T>(&reply) {
            Ok(parsed) => {
                log_collaborator!(
                    success,
                    operation,
                    provider = provider.provider_name(),
                    duration_ms = started.elapsed().as_millis() as u64
                );
                Ok(parsed)
            }
            Err(e) => {
                log_validation!(failure, operation, error = e);
                Err(e)
            }
        }
    }
}

pub fn grading_prompt(request: &GradeRequest) -> String {
    format!(
        r#"You are an anatomy teacher grading a fill-in-the-blank question.

Question: "{question}"
Category: {category}
Correct Answer: "{correct}"
Student's Answer: "{answer}"

Decide whether the student's answer is correct. Accept exact matches, accepted synonyms and harmless variations.

Be lenient about:
- capitalization (sagittal vs Sagittal)
- singular versus plural (kidney vs kidneys)
- common medical synonyms (frontal plane = coronal plane)
- minor misspellings that are still recognizable

Be strict about:
- answers that are wrong
- answers that sound close but are medically incorrect

Reply with only a JSON object:
{{
  "isCorrect": boolean,
  "feedback": "one or two encouraging sentences about the answer",
  "hint": "one sentence to help remember this term"
}}"#,
        question = request.question,
        category = request.category,
        correct = request.correct_answer,
        answer = request.user_answer,
    )
}

pub fn summary_prompt(missed: &[ResultRecord]) -> String {
    let listing = missed
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. Question: \"{}\"\n   Student Answer: \"{}\"\n   Correct Answer: \"{}\"",
                i + 1,
                r.question,
                r.user_answer,
                r.correct_answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an anatomy tutor. A student finished a practice quiz and missed these questions:

{listing}

Explain the likely reasons for these mistakes (confused similar terms, spelling, wrong location) and give concrete study advice for exactly these concepts.

Reply with only a JSON object:
{{
  "summary": "two or three sentences analysing the errors",
  "improvementTips": "two or three specific points on what to study"
}}"#
    )
}

#[async_trait]
impl GradingService for LLMService {
    async fn grade_answer(&self, request: &GradeRequest) -> Result<GradeVerdict, CollaboratorError> {
        let prompt = grading_prompt(request);
        self.request_json("grade_answer", request.model.api_model_id(), &prompt)
            .await
    }
}

#[async_trait]
impl SummaryService for LLMService {
    async fn summarize(&self, request: &SummaryRequest) -> Result<SessionSummary, CollaboratorError> {
        let missed: Vec<ResultRecord> = request.results.iter().filter(|r| !r.is_correct).cloned().collect();
        let prompt = summary_prompt(&missed);
        self.request_json("summarize", request.model.api_model_id(), &prompt)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GradingModel;

    fn request() -> GradeRequest {
        GradeRequest {
            question: "The _______ plane divides the body into left and right halves.".to_string(),
            correct_answer: "sagittal".to_string(),
            user_answer: "Sagittal".to_string(),
            category: "Body Planes".to_string(),
            model: GradingModel::MistralSmall,
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_missing_credential() {
        let service = LLMService::new_with_provider(None, None, LLMProviderType::Mistral, None);
        assert!(!service.is_configured());

        let result = service.grade_answer(&request()).await;
        assert!(matches!(result, Err(CollaboratorError::MissingCredential)));
    }

    #[tokio::test]
    async fn test_blank_key_counts_as_missing() {
        let service = LLMService::new_with_provider(Some("   ".to_string()), None, LLMProviderType::Mistral, None);
        assert!(!service.is_configured());
        assert_eq!(service.provider_name(), None);
    }

    #[test]
    fn test_grading_prompt_mentions_inputs() {
        let prompt = grading_prompt(&request());
        assert!(prompt.contains("Body Planes"));
        assert!(prompt.contains("\"sagittal\""));
        assert!(prompt.contains("\"Sagittal\""));
        assert!(prompt.contains("\"isCorrect\""));
    }

    #[test]
    fn test_summary_prompt_numbers_misses() {
        let missed = vec![
            ResultRecord {
                question: "The wrist is _______ to the elbow.".to_string(),
                user_answer: "proximal".to_string(),
                correct_answer: "distal".to_string(),
                is_correct: false,
            },
            ResultRecord {
                question: "The nose is _______ to the eyes.".to_string(),
                user_answer: "lateral".to_string(),
                correct_answer: "medial".to_string(),
                is_correct: false,
            },
        ];
        let prompt = summary_prompt(&missed);
        assert!(prompt.contains("1. Question: \"The wrist is _______ to the elbow.\""));
        assert!(prompt.contains("2. Question"));
        assert!(prompt.contains("Correct Answer: \"medial\""));
    }
}
