use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::SessionError;
use crate::flag_store::{FlagStore, WELCOME_SEEN_KEY};
use crate::grading::{GradingPipeline, GradingService};
use crate::models::{GradeOutcome, GradingModel, ResultRecord, SessionSummary};
use crate::question_bank::QuestionBank;
use crate::session::{GradeApplied, GradeTicket, QuizSession, SummaryStart, SummaryTicket};
use crate::summary::{SummaryPipeline, SummaryService};

pub type SharedSession = Arc<Mutex<QuizSession>>;

enum Pending {
    Grade(GradeTicket),
    Summary(SummaryTicket),
}

impl Pending {
    fn release(&self, session: &mut QuizSession) -> bool {
        match self {
            Pending::Grade(ticket) => session.release_grade(ticket),
            Pending::Summary(ticket) => session.release_summary(ticket),
        }
    }
}

/// Clears a pending marker if the future awaiting the collaborator is dropped
/// before the outcome is applied (client disconnect, caller timeout).
struct PendingRelease {
    session: SharedSession,
    pending: Option<Pending>,
}

impl PendingRelease {
    fn new(session: &SharedSession, pending: Pending) -> Self {
        Self {
            session: session.clone(),
            pending: Some(pending),
        }
    }

    fn disarm(&mut self) {
        self.pending = None;
    }
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let session = self.session.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    pending.release(&mut *session.lock().await);
                });
            }
            Err(_) => {
                if let Ok(mut guard) = session.try_lock() {
                    pending.release(&mut guard);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Recorded { record: ResultRecord, outcome: GradeOutcome },
    /// The session moved on while grading was in flight; nothing was recorded.
    Discarded,
}

/// Drives collaborator calls for sessions without holding a session lock across them.
#[derive(Clone)]
pub struct QuizRunner {
    bank: Arc<QuestionBank>,
    grading: GradingPipeline,
    summary: SummaryPipeline,
    flags: Arc<dyn FlagStore>,
    default_model: GradingModel,
}

impl QuizRunner {
    pub fn new(
        bank: Arc<QuestionBank>,
        grading: GradingPipeline,
        summary: SummaryPipeline,
        flags: Arc<dyn FlagStore>,
    ) -> Self {
        Self {
            bank,
            grading,
            summary,
            flags,
            default_model: GradingModel::default(),
        }
    }

    /// Tier new sessions start with.
    pub fn with_default_model(mut self, model: GradingModel) -> Self {
        self.default_model = model;
        self
    }

    /// Uses one collaborator for both grading and summaries, as the LLM service does.
    pub fn with_collaborator<C>(bank: Arc<QuestionBank>, collaborator: Arc<C>, flags: Arc<dyn FlagStore>) -> Self
    where
        C: GradingService + SummaryService + 'static,
    {
        Self::new(
            bank,
            GradingPipeline::new(collaborator.clone()),
            SummaryPipeline::new(collaborator),
            flags,
        )
    }

    pub fn bank(&self) -> &Arc<QuestionBank> {
        &self.bank
    }

    pub fn grading(&self) -> &GradingPipeline {
        &self.grading
    }

    pub fn summary(&self) -> &SummaryPipeline {
        &self.summary
    }

    /// New session, skipping the welcome screen when the learner has already seen it.
    pub async fn open_session(&self) -> QuizSession {
        let welcome_seen = match self.flags.get_flag(WELCOME_SEEN_KEY).await {
            Ok(seen) => seen,
            Err(e) => {
                warn!(component = "runner", error = %e, "Could not read welcome flag, showing welcome");
                false
            }
        };
        let mut session = QuizSession::new(self.bank.clone(), welcome_seen);
        session.set_model(self.default_model);
        session
    }

    pub async fn acknowledge_welcome(&self, session: &SharedSession) -> Result<(), SessionError> {
        session.lock().await.acknowledge_welcome()?;

        if let Err(e) = self.flags.set_flag(WELCOME_SEEN_KEY, true).await {
            warn!(component = "runner", error = %e, "Could not persist welcome flag");
        }
        Ok(())
    }

    pub async fn submit_answer(&self, session: &SharedSession, answer: &str) -> Result<Submission, SessionError> {
        let ticket = session.lock().await.begin_submission(answer)?;
        let mut release = PendingRelease::new(session, Pending::Grade(ticket.clone()));

        let outcome = self.grading.grade_request(&ticket.request).await;

        let applied = {
            let mut guard = session.lock().await;
            release.disarm();
            guard.apply_grade(&ticket, outcome.clone())
        };
        Ok(match applied {
            GradeApplied::Recorded(record) => Submission::Recorded { record, outcome },
            GradeApplied::Stale => Submission::Discarded,
        })
    }

    /// Summary for a completed session, requested from the collaborator at most once.
    ///
    /// Returns `None` if the session was reset while the summary was being produced.
    pub async fn summarize(&self, session: &SharedSession) -> Result<Option<SessionSummary>, SessionError> {
        let ticket = match session.lock().await.begin_summary()? {
            SummaryStart::Cached(summary) => return Ok(Some(summary)),
            SummaryStart::Request(ticket) => ticket,
        };
        let mut release = PendingRelease::new(session, Pending::Summary(ticket.clone()));

        let summary = self.summary.summarize(&ticket.results, ticket.model).await;

        let stored = {
            let mut guard = session.lock().await;
            release.disarm();
            guard.store_summary(&ticket, summary)
        };
        if stored.is_some() {
            info!(component = "runner", answered = ticket.results.len(), "Session summary cached");
        }
        Ok(stored)
    }
}
