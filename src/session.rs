//! Quiz session state machine.
//!
//! A session moves through `Welcome → ModeSelect → CategorySelect → InProgress → Complete`.
//! Each phase carries only the data that is meaningful in it. Grading and summary calls
//! are split into a `begin_*` step that hands out a ticket and an apply step that checks
//! the ticket is still current, so responses for an abandoned question set are dropped.

use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::SessionError;
use crate::models::{GradeOutcome, GradeRequest, GradingModel, Mode, Question, ResultRecord, SessionSummary};
use crate::question_bank::{shuffle_with, QuestionBank};

/// Transient state for the question currently shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerAttempt {
    pub answer: String,
    pub submitted: bool,
    pub is_correct: Option<bool>,
    pub feedback: Option<String>,
    pub hint: Option<String>,
    pending: Option<u64>,
}

impl AnswerAttempt {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ActiveQuiz {
    pub mode: Mode,
    pub category: String,
    questions: Vec<Question>,
    index: usize,
    attempt: AnswerAttempt,
    results: Vec<ResultRecord>,
}

impl ActiveQuiz {
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.index]
    }

    pub fn attempt(&self) -> &AnswerAttempt {
        &self.attempt
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn score(&self) -> usize {
        score_of(&self.results)
    }

    pub fn progress_percent(&self) -> f64 {
        (self.index + 1) as f64 / self.questions.len() as f64 * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct CompletedQuiz {
    pub mode: Mode,
    pub category: String,
    pub total_questions: usize,
    results: Vec<ResultRecord>,
    summary: Option<SessionSummary>,
    summary_pending: bool,
}

impl CompletedQuiz {
    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn score(&self) -> usize {
        score_of(&self.results)
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// Whole-number percentage of answered questions that were correct.
    pub fn percent_correct(&self) -> u32 {
        if self.results.is_empty() {
            return 0;
        }
        (self.score() as f64 / self.results.len() as f64 * 100.0).round() as u32
    }
}

#[derive(Debug, Clone)]
pub enum SessionPhase {
    Welcome,
    ModeSelect,
    CategorySelect { mode: Mode, suggested: Option<String> },
    InProgress(ActiveQuiz),
    Complete(CompletedQuiz),
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Welcome => "Welcome",
            SessionPhase::ModeSelect => "ModeSelect",
            SessionPhase::CategorySelect { .. } => "CategorySelect",
            SessionPhase::InProgress(_) => "InProgress",
            SessionPhase::Complete(_) => "Complete",
        }
    }
}

/// Grading call issued for one question of one question set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeTicket {
    pub epoch: u64,
    pub question_index: usize,
    serial: u64,
    pub request: GradeRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryTicket {
    pub epoch: u64,
    pub results: Vec<ResultRecord>,
    pub model: GradingModel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeApplied {
    Recorded(ResultRecord),
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryStart {
    Cached(SessionSummary),
    Request(SummaryTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(usize),
    Completed,
}

pub struct QuizSession {
    bank: Arc<QuestionBank>,
    model: GradingModel,
    epoch: u64,
    next_serial: u64,
    phase: SessionPhase,
}

impl QuizSession {
    /// A session starts at the welcome screen unless the learner has already seen it.
    pub fn new(bank: Arc<QuestionBank>, welcome_seen: bool) -> Self {
        let phase = if welcome_seen {
            SessionPhase::ModeSelect
        } else {
            SessionPhase::Welcome
        };
        Self {
            bank,
            model: GradingModel::default(),
            epoch: 0,
            next_serial: 0,
            phase,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn model(&self) -> GradingModel {
        self.model
    }

    pub fn set_model(&mut self, model: GradingModel) {
        debug!(component = "session", model = %model, "Grading model selected");
        self.model = model;
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, SessionPhase::Complete(_))
    }

    pub fn current_question(&self) -> Option<&Question> {
        match &self.phase {
            SessionPhase::InProgress(quiz) => Some(quiz.current_question()),
            _ => None,
        }
    }

    pub fn results(&self) -> &[ResultRecord] {
        match &self.phase {
            SessionPhase::InProgress(quiz) => &quiz.results,
            SessionPhase::Complete(done) => &done.results,
            _ => &[],
        }
    }

    pub fn score(&self) -> usize {
        score_of(self.results())
    }

    pub fn answered(&self) -> usize {
        self.results().len()
    }

    pub fn progress_percent(&self) -> f64 {
        match &self.phase {
            SessionPhase::InProgress(quiz) => quiz.progress_percent(),
            SessionPhase::Complete(_) => 100.0,
            _ => 0.0,
        }
    }

    pub fn grading_pending(&self) -> bool {
        match &self.phase {
            SessionPhase::InProgress(quiz) => quiz.attempt.is_pending(),
            _ => false,
        }
    }

    pub fn acknowledge_welcome(&mut self) -> Result<(), SessionError> {
        self.expect_phase("acknowledge_welcome", |p| matches!(p, SessionPhase::Welcome))?;
        self.phase = SessionPhase::ModeSelect;
        Ok(())
    }

    pub fn select_mode(&mut self, mode: Mode) -> Result<(), SessionError> {
        self.expect_phase("select_mode", |p| matches!(p, SessionPhase::ModeSelect))?;
        info!(component = "session", mode = %mode, "Mode selected");
        self.phase = SessionPhase::CategorySelect { mode, suggested: None };
        Ok(())
    }

    pub fn back_to_mode_select(&mut self) -> Result<(), SessionError> {
        self.expect_phase("back_to_mode_select", |p| matches!(p, SessionPhase::CategorySelect { .. }))?;
        self.phase = SessionPhase::ModeSelect;
        Ok(())
    }

    pub fn select_category(&mut self, category: &str) -> Result<(), SessionError> {
        self.select_category_with(category, &mut rand::thread_rng())
    }

    /// Filters the bank by `category` and starts a freshly shuffled question set.
    pub fn select_category_with<R: Rng + ?Sized>(&mut self, category: &str, rng: &mut R) -> Result<(), SessionError> {
        let SessionPhase::CategorySelect { mode, .. } = &self.phase else {
            return Err(self.wrong_phase("select_category"));
        };
        let mode = *mode;

        if !self.bank.has_category(category) {
            return Err(SessionError::UnknownCategory(category.to_string()));
        }
        let questions = shuffle_with(&self.bank.by_category(Some(category)), rng);

        self.epoch += 1;
        info!(
            component = "session",
            category = %category,
            mode = %mode,
            question_count = questions.len(),
            epoch = self.epoch,
            "Quiz started"
        );
        self.phase = SessionPhase::InProgress(ActiveQuiz {
            mode,
            category: category.to_string(),
            questions,
            index: 0,
            attempt: AnswerAttempt::default(),
            results: Vec::new(),
        });
        Ok(())
    }

    /// Validates a submission and marks the current question as pending.
    pub fn begin_submission(&mut self, answer: &str) -> Result<GradeTicket, SessionError> {
        let epoch = self.epoch;
        let serial = self.next_serial;
        let model = self.model;
        let SessionPhase::InProgress(quiz) = &mut self.phase else {
            return Err(self.wrong_phase("submit_answer"));
        };

        if quiz.attempt.submitted {
            return Err(SessionError::AlreadySubmitted);
        }
        if quiz.attempt.is_pending() {
            return Err(SessionError::GradingPending);
        }
        let trimmed = answer.trim();
        if trimmed.is_empty() {
            return Err(SessionError::BlankAnswer);
        }

        let question = &quiz.questions[quiz.index];
        let request = GradeRequest {
            question: question.prompt.clone(),
            correct_answer: question.answer.clone(),
            user_answer: trimmed.to_string(),
            category: quiz.category.clone(),
            model,
        };
        quiz.attempt.answer = trimmed.to_string();
        quiz.attempt.pending = Some(serial);
        self.next_serial += 1;

        Ok(GradeTicket {
            epoch,
            question_index: quiz.index,
            serial,
            request,
        })
    }

    /// Records a grading outcome if its ticket still matches the question on screen.
    pub fn apply_grade(&mut self, ticket: &GradeTicket, outcome: GradeOutcome) -> GradeApplied {
        let epoch = self.epoch;
        let SessionPhase::InProgress(quiz) = &mut self.phase else {
            warn!(component = "session", ticket_epoch = ticket.epoch, "Dropping grade for a finished question set");
            return GradeApplied::Stale;
        };

        if ticket.epoch != epoch || ticket.question_index != quiz.index || quiz.attempt.pending != Some(ticket.serial) {
            warn!(
                component = "session",
                ticket_epoch = ticket.epoch,
                current_epoch = epoch,
                ticket_index = ticket.question_index,
                current_index = quiz.index,
                "Dropping stale grading response"
            );
            return GradeApplied::Stale;
        }

        let record = ResultRecord {
            question: ticket.request.question.clone(),
            user_answer: ticket.request.user_answer.clone(),
            correct_answer: ticket.request.correct_answer.clone(),
            is_correct: outcome.is_correct,
        };
        quiz.attempt = AnswerAttempt {
            answer: ticket.request.user_answer.clone(),
            submitted: true,
            is_correct: Some(outcome.is_correct),
            feedback: Some(outcome.feedback),
            hint: Some(outcome.hint),
            pending: None,
        };
        quiz.results.push(record.clone());

        debug!(
            component = "session",
            question_index = quiz.index,
            is_correct = record.is_correct,
            score = quiz.score(),
            answered = quiz.results.len(),
            "Submission recorded"
        );
        GradeApplied::Recorded(record)
    }

    pub fn next(&mut self) -> Result<Navigation, SessionError> {
        let SessionPhase::InProgress(quiz) = &mut self.phase else {
            return Err(self.wrong_phase("next"));
        };
        if !quiz.attempt.submitted {
            return Err(SessionError::NotSubmitted);
        }

        if quiz.index + 1 < quiz.questions.len() {
            quiz.index += 1;
            quiz.attempt = AnswerAttempt::default();
            return Ok(Navigation::Moved(quiz.index));
        }

        let finished = CompletedQuiz {
            mode: quiz.mode,
            category: std::mem::take(&mut quiz.category),
            total_questions: quiz.questions.len(),
            results: std::mem::take(&mut quiz.results),
            summary: None,
            summary_pending: false,
        };
        info!(
            component = "session",
            category = %finished.category,
            score = finished.score(),
            answered = finished.results.len(),
            "Quiz complete"
        );
        self.phase = SessionPhase::Complete(finished);
        Ok(Navigation::Completed)
    }

    pub fn previous(&mut self) -> Result<usize, SessionError> {
        let SessionPhase::InProgress(quiz) = &mut self.phase else {
            return Err(self.wrong_phase("previous"));
        };
        if !quiz.attempt.submitted {
            return Err(SessionError::NotSubmitted);
        }
        if quiz.index == 0 {
            return Err(SessionError::OutOfBounds);
        }
        quiz.index -= 1;
        quiz.attempt = AnswerAttempt::default();
        Ok(quiz.index)
    }

    /// Abandons the running quiz and its results.
    pub fn exit(&mut self) -> Result<(), SessionError> {
        let SessionPhase::InProgress(quiz) = &self.phase else {
            return Err(self.wrong_phase("exit"));
        };
        info!(
            component = "session",
            category = %quiz.category,
            discarded = quiz.results.len(),
            "Quiz abandoned"
        );
        let mode = quiz.mode;
        self.epoch += 1;
        self.phase = SessionPhase::CategorySelect { mode, suggested: None };
        Ok(())
    }

    /// Returns the cached summary, or a ticket to request one. At most one request per session.
    pub fn begin_summary(&mut self) -> Result<SummaryStart, SessionError> {
        let epoch = self.epoch;
        let model = self.model;
        let SessionPhase::Complete(done) = &mut self.phase else {
            return Err(self.wrong_phase("summary"));
        };

        if let Some(summary) = &done.summary {
            return Ok(SummaryStart::Cached(summary.clone()));
        }
        if done.summary_pending {
            return Err(SessionError::SummaryPending);
        }
        done.summary_pending = true;
        Ok(SummaryStart::Request(SummaryTicket {
            epoch,
            results: done.results.clone(),
            model,
        }))
    }

    /// Caches a summary for the completed quiz. Returns the summary now on record.
    pub fn store_summary(&mut self, ticket: &SummaryTicket, summary: SessionSummary) -> Option<SessionSummary> {
        let epoch = self.epoch;
        let SessionPhase::Complete(done) = &mut self.phase else {
            warn!(component = "session", "Dropping summary for a session that moved on");
            return None;
        };
        if ticket.epoch != epoch {
            warn!(component = "session", ticket_epoch = ticket.epoch, current_epoch = epoch, "Dropping stale summary");
            return None;
        }

        done.summary_pending = false;
        Some(done.summary.get_or_insert(summary).clone())
    }

    /// Clears the pending marker of a grading call whose caller went away.
    ///
    /// Returns `false` if the ticket no longer matches the question on screen.
    /// A late outcome for a released ticket is then reported as stale.
    pub fn release_grade(&mut self, ticket: &GradeTicket) -> bool {
        let epoch = self.epoch;
        let SessionPhase::InProgress(quiz) = &mut self.phase else {
            return false;
        };
        if ticket.epoch != epoch || ticket.question_index != quiz.index || quiz.attempt.pending != Some(ticket.serial) {
            return false;
        }

        quiz.attempt.pending = None;
        warn!(
            component = "session",
            question_index = quiz.index,
            "Released grading call abandoned by its caller"
        );
        true
    }

    /// Clears the in-flight marker of an abandoned summary request so it can be asked again.
    pub fn release_summary(&mut self, ticket: &SummaryTicket) -> bool {
        let epoch = self.epoch;
        let SessionPhase::Complete(done) = &mut self.phase else {
            return false;
        };
        if ticket.epoch != epoch || !done.summary_pending {
            return false;
        }

        done.summary_pending = false;
        warn!(component = "session", "Released summary request abandoned by its caller");
        true
    }

    /// Full reset back to mode selection.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        self.expect_phase("restart", |p| matches!(p, SessionPhase::Complete(_)))?;
        self.epoch += 1;
        self.phase = SessionPhase::ModeSelect;
        Ok(())
    }

    /// Returns to category selection, suggesting the category after the one just finished.
    pub fn continue_to_next_category(&mut self) -> Result<Option<String>, SessionError> {
        let SessionPhase::Complete(done) = &self.phase else {
            return Err(self.wrong_phase("continue"));
        };
        let mode = done.mode;
        let suggested = self.bank.next_category(&done.category).map(str::to_string);

        self.epoch += 1;
        self.phase = SessionPhase::CategorySelect {
            mode,
            suggested: suggested.clone(),
        };
        Ok(suggested)
    }

    pub fn view(&self) -> SessionView {
        let categories = self
            .bank
            .categories()
            .into_iter()
            .map(|name| CategoryInfo {
                name: name.to_string(),
                question_count: self.bank.category_count(name),
            })
            .collect();

        let mut view = SessionView {
            phase: self.phase.name(),
            model: self.model,
            mode: None,
            category: None,
            suggested_category: None,
            categories,
            question: None,
            attempt: None,
            score: self.score(),
            answered: self.answered(),
            progress_percent: self.progress_percent(),
            results: None,
            percent_correct: None,
            summary: None,
        };

        match &self.phase {
            SessionPhase::Welcome | SessionPhase::ModeSelect => {}
            SessionPhase::CategorySelect { mode, suggested } => {
                view.mode = Some(*mode);
                view.suggested_category = suggested.clone();
            }
            SessionPhase::InProgress(quiz) => {
                let question = quiz.current_question();
                view.mode = Some(quiz.mode);
                view.category = Some(quiz.category.clone());
                view.question = Some(QuestionView {
                    number: quiz.index + 1,
                    total: quiz.questions.len(),
                    prompt: question.prompt.clone(),
                    images: question.images.clone(),
                });
                view.attempt = Some(AttemptView::from_attempt(&quiz.attempt, quiz.mode));
            }
            SessionPhase::Complete(done) => {
                view.mode = Some(done.mode);
                view.category = Some(done.category.clone());
                view.results = Some(done.results.clone());
                view.percent_correct = Some(done.percent_correct());
                view.summary = done.summary.clone();
            }
        }
        view
    }

    fn expect_phase(
        &self,
        operation: &'static str,
        allowed: impl Fn(&SessionPhase) -> bool,
    ) -> Result<(), SessionError> {
        if allowed(&self.phase) {
            Ok(())
        } else {
            Err(self.wrong_phase(operation))
        }
    }

    fn wrong_phase(&self, operation: &'static str) -> SessionError {
        SessionError::WrongPhase {
            operation,
            phase: self.phase.name(),
        }
    }
}

fn score_of(results: &[ResultRecord]) -> usize {
    results.iter().filter(|r| r.is_correct).count()
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryInfo {
    pub name: String,
    pub question_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub number: usize,
    pub total: usize,
    pub prompt: String,
    pub images: Vec<String>,
}

/// Answer state as shown to the learner. Exam mode hides the verdict until the end.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptView {
    pub answer: String,
    pub submitted: bool,
    pub pending: bool,
    pub is_correct: Option<bool>,
    pub feedback: Option<String>,
    pub hint: Option<String>,
}

impl AttemptView {
    fn from_attempt(attempt: &AnswerAttempt, mode: Mode) -> Self {
        let reveal = mode.reveals_feedback();
        Self {
            answer: attempt.answer.clone(),
            submitted: attempt.submitted,
            pending: attempt.is_pending(),
            is_correct: attempt.is_correct.filter(|_| reveal),
            feedback: attempt.feedback.clone().filter(|_| reveal),
            hint: attempt.hint.clone().filter(|_| reveal),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub phase: &'static str,
    pub model: GradingModel,
    pub mode: Option<Mode>,
    pub category: Option<String>,
    pub suggested_category: Option<String>,
    pub categories: Vec<CategoryInfo>,
    pub question: Option<QuestionView>,
    pub attempt: Option<AttemptView>,
    pub score: usize,
    pub answered: usize,
    pub progress_percent: f64,
    pub results: Option<Vec<ResultRecord>>,
    pub percent_correct: Option<u32>,
    pub summary: Option<SessionSummary>,
}
