use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::errors::CollaboratorError;
use crate::fallback::{attempt_or_fallback, Resolved};
use crate::models::{GradingModel, OutcomeSource, ResultRecord, SessionSummary, SummaryRequest};

/// Remote collaborator that writes a performance summary for missed questions.
#[async_trait]
pub trait SummaryService: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<SessionSummary, CollaboratorError>;
}

pub fn perfect_score_summary() -> SessionSummary {
    SessionSummary {
        summary: "Perfect score! You demonstrated excellent mastery of all terms in this section."
            .to_string(),
        improvement_tips: "Keep challenging yourself with harder categories or faster completion times."
            .to_string(),
    }
}

pub fn fallback_summary() -> SessionSummary {
    SessionSummary {
        summary: "Great effort! Review the correct answers above to improve.".to_string(),
        improvement_tips: "Focus on the specific terms you missed.".to_string(),
    }
}

#[derive(Clone)]
pub struct SummaryPipeline {
    service: Arc<dyn SummaryService>,
}

impl SummaryPipeline {
    pub fn new(service: Arc<dyn SummaryService>) -> Self {
        Self { service }
    }

    pub async fn summarize(&self, results: &[ResultRecord], model: GradingModel) -> SessionSummary {
        self.summarize_resolved(results, model).await.value
    }

    pub async fn summarize_resolved(
        &self,
        results: &[ResultRecord],
        model: GradingModel,
    ) -> Resolved<SessionSummary> {
        let missed: Vec<ResultRecord> = results.iter().filter(|r| !r.is_correct).cloned().collect();

        if missed.is_empty() {
            info!(
                component = "summary",
                answered = results.len(),
                "All answers correct, using perfect score summary"
            );
            return Resolved {
                value: perfect_score_summary(),
                source: OutcomeSource::Fallback,
            };
        }

        let request = SummaryRequest { results: missed, model };
        let resolved = attempt_or_fallback("summarize", self.service.summarize(&request), fallback_summary).await;

        info!(
            component = "summary",
            answered = results.len(),
            missed = request.results.len(),
            model = %model,
            source = ?resolved.source,
            "Session summary produced"
        );
        resolved
    }
}
