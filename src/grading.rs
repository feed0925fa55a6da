use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::CollaboratorError;
use crate::fallback::attempt_or_fallback;
use crate::models::{GradeOutcome, GradeRequest, GradeVerdict, GradingModel};

pub const CORRECT_FEEDBACK: &str = "Great job!";
pub const FALLBACK_HINT: &str = "Try again!";

/// Remote collaborator that judges a free-text answer.
#[async_trait]
pub trait GradingService: Send + Sync {
    async fn grade_answer(&self, request: &GradeRequest) -> Result<GradeVerdict, CollaboratorError>;
}

/// Primary semantic grading with a deterministic exact-match fallback.
#[derive(Clone)]
pub struct GradingPipeline {
    service: Arc<dyn GradingService>,
}

impl GradingPipeline {
    pub fn new(service: Arc<dyn GradingService>) -> Self {
        Self { service }
    }

    pub async fn grade(
        &self,
        user_answer: &str,
        correct_answer: &str,
        question: &str,
        category: &str,
        model: GradingModel,
    ) -> GradeOutcome {
        let request = GradeRequest {
            question: question.to_string(),
            correct_answer: correct_answer.to_string(),
            user_answer: user_answer.trim().to_string(),
            category: category.to_string(),
            model,
        };
        self.grade_request(&request).await
    }

    pub async fn grade_request(&self, request: &GradeRequest) -> GradeOutcome {
        let resolved = attempt_or_fallback(
            "grade_answer",
            self.service.grade_answer(request),
            || fallback_verdict(&request.user_answer, &request.correct_answer),
        )
        .await;

        tracing::info!(
            component = "grading",
            category = %request.category,
            model = %request.model,
            is_correct = resolved.value.is_correct,
            source = ?resolved.source,
            "Answer graded"
        );

        GradeOutcome {
            is_correct: resolved.value.is_correct,
            feedback: resolved.value.feedback,
            hint: resolved.value.hint,
            source: resolved.source,
        }
    }
}

pub fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Exact-match verdict used whenever the grading collaborator is unavailable.
pub fn fallback_verdict(user_answer: &str, correct_answer: &str) -> GradeVerdict {
    let is_correct = normalize(user_answer) == normalize(correct_answer);
    GradeVerdict {
        is_correct,
        feedback: if is_correct {
            CORRECT_FEEDBACK.to_string()
        } else {
            format!("The correct answer is \"{}\"", correct_answer)
        },
        hint: FALLBACK_HINT.to_string(),
    }
}
