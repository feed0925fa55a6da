use anatomy_quiz::{
    errors::{CollaboratorError, SessionError},
    grading::{GradingPipeline, GradingService},
    models::{GradeRequest, GradeVerdict, Mode, Question, SessionSummary, SummaryRequest},
    summary::{SummaryPipeline, SummaryService},
    InMemoryFlagStore, QuestionBank, QuizRunner, SharedSession, Submission,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

fn bank() -> Arc<QuestionBank> {
    let question = |id: &str, category: &str, answer: &str| Question {
        id: id.to_string(),
        category: category.to_string(),
        prompt: format!("Question {}: the _______.", id),
        answer: answer.to_string(),
        images: vec![],
    };
    Arc::new(
        QuestionBank::new(vec![
            question("p1", "Planes", "sagittal"),
            question("p2", "Planes", "frontal"),
            question("p3", "Planes", "transverse"),
            question("d1", "Directions", "distal"),
            question("d2", "Directions", "medial"),
        ])
        .unwrap(),
    )
}

/// Grades by exact match, but only once released.
struct GatedGrader {
    release: Arc<Notify>,
}

#[async_trait]
impl GradingService for GatedGrader {
    async fn grade_answer(&self, request: &GradeRequest) -> Result<GradeVerdict, CollaboratorError> {
        self.release.notified().await;
        Ok(GradeVerdict {
            is_correct: request.user_answer.eq_ignore_ascii_case(&request.correct_answer),
            feedback: "Graded remotely".to_string(),
            hint: "Remember the planes".to_string(),
        })
    }
}

struct Offline;

#[async_trait]
impl GradingService for Offline {
    async fn grade_answer(&self, _request: &GradeRequest) -> Result<GradeVerdict, CollaboratorError> {
        Err(CollaboratorError::MissingCredential)
    }
}

/// Never answers the first call; grades by exact match afterwards.
#[derive(Default)]
struct HangsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl GradingService for HangsOnce {
    async fn grade_answer(&self, request: &GradeRequest) -> Result<GradeVerdict, CollaboratorError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        Ok(GradeVerdict {
            is_correct: request.user_answer.eq_ignore_ascii_case(&request.correct_answer),
            feedback: "Graded remotely".to_string(),
            hint: "Remember the planes".to_string(),
        })
    }
}

#[async_trait]
impl SummaryService for HangsOnce {
    async fn summarize(&self, request: &SummaryRequest) -> Result<SessionSummary, CollaboratorError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        Ok(SessionSummary {
            summary: format!("You missed {} terms.", request.results.len()),
            improvement_tips: "Review the directional pairs.".to_string(),
        })
    }
}

#[derive(Default)]
struct CountingSummaries {
    calls: AtomicUsize,
}

#[async_trait]
impl SummaryService for CountingSummaries {
    async fn summarize(&self, request: &SummaryRequest) -> Result<SessionSummary, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SessionSummary {
            summary: format!("You missed {} terms.", request.results.len()),
            improvement_tips: "Review the directional pairs.".to_string(),
        })
    }
}

fn runner(grading: Arc<dyn GradingService>, summaries: Arc<dyn SummaryService>) -> QuizRunner {
    QuizRunner::new(
        bank(),
        GradingPipeline::new(grading),
        SummaryPipeline::new(summaries),
        Arc::new(InMemoryFlagStore::new()),
    )
}

async fn start(runner: &QuizRunner, mode: Mode, category: &str) -> SharedSession {
    let session: SharedSession = Arc::new(Mutex::new(runner.open_session().await));
    {
        let mut guard = session.lock().await;
        guard.acknowledge_welcome().unwrap();
        guard.select_mode(mode).unwrap();
        guard.select_category(category).unwrap();
    }
    session
}

async fn current_answer(session: &SharedSession) -> String {
    session.lock().await.current_question().unwrap().answer.clone()
}

#[tokio::test]
async fn test_score_tracks_correct_results() {
    let runner = runner(Arc::new(Offline), Arc::new(CountingSummaries::default()));
    let session = start(&runner, Mode::Practice, "Planes").await;

    for i in 0..3 {
        let answer = if i % 2 == 0 {
            current_answer(&session).await
        } else {
            "coronal".to_string()
        };
        runner.submit_answer(&session, &answer).await.unwrap();

        let guard = session.lock().await;
        let correct = guard.results().iter().filter(|r| r.is_correct).count();
        assert_eq!(guard.score(), correct);
        assert_eq!(guard.answered(), i + 1);
        drop(guard);

        session.lock().await.next().unwrap();
    }

    let guard = session.lock().await;
    assert!(guard.is_complete());
    assert_eq!(guard.score(), 2);
    assert_eq!(guard.view().percent_correct, Some(67));
}

#[tokio::test]
async fn test_grade_arriving_after_exit_is_discarded() {
    let release = Arc::new(Notify::new());
    let runner = runner(
        Arc::new(GatedGrader {
            release: release.clone(),
        }),
        Arc::new(CountingSummaries::default()),
    );
    let session = start(&runner, Mode::Practice, "Planes").await;
    let answer = current_answer(&session).await;

    let in_flight = {
        let runner = runner.clone();
        let session = session.clone();
        tokio::spawn(async move { runner.submit_answer(&session, &answer).await })
    };

    // Wait until the grading call is outstanding
    while !session.lock().await.grading_pending() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // A second submission is refused while grading is pending
    let err = runner.submit_answer(&session, "frontal").await.unwrap_err();
    assert_eq!(err, SessionError::GradingPending);

    session.lock().await.exit().unwrap();
    release.notify_one();

    let submission = in_flight.await.unwrap().unwrap();
    assert_eq!(submission, Submission::Discarded);

    let guard = session.lock().await;
    assert_eq!(guard.phase().name(), "CategorySelect");
    assert!(guard.results().is_empty());
}

#[tokio::test]
async fn test_grade_arriving_after_new_question_set_is_discarded() {
    let release = Arc::new(Notify::new());
    let runner = runner(
        Arc::new(GatedGrader {
            release: release.clone(),
        }),
        Arc::new(CountingSummaries::default()),
    );
    let session = start(&runner, Mode::Practice, "Planes").await;
    let answer = current_answer(&session).await;

    let in_flight = {
        let runner = runner.clone();
        let session = session.clone();
        tokio::spawn(async move { runner.submit_answer(&session, &answer).await })
    };
    while !session.lock().await.grading_pending() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    {
        let mut guard = session.lock().await;
        guard.exit().unwrap();
        guard.select_category("Planes").unwrap();
    }
    release.notify_one();

    assert_eq!(in_flight.await.unwrap().unwrap(), Submission::Discarded);
    let guard = session.lock().await;
    assert_eq!(guard.answered(), 0);
    assert!(!guard.grading_pending());
}

#[tokio::test]
async fn test_summary_requested_at_most_once() {
    let summaries = Arc::new(CountingSummaries::default());
    let runner = runner(Arc::new(Offline), summaries.clone());
    let session = start(&runner, Mode::Exam, "Directions").await;

    runner.submit_answer(&session, "proximal").await.unwrap();
    session.lock().await.next().unwrap();
    runner.submit_answer(&session, "lateral").await.unwrap();
    session.lock().await.next().unwrap();
    assert!(session.lock().await.is_complete());

    let first = runner.summarize(&session).await.unwrap().unwrap();
    let second = runner.summarize(&session).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.summary, "You missed 2 terms.");
    assert_eq!(summaries.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.lock().await.view().summary, Some(first));
}

#[tokio::test]
async fn test_perfect_score_skips_summary_service() {
    let summaries = Arc::new(CountingSummaries::default());
    let runner = runner(Arc::new(Offline), summaries.clone());
    let session = start(&runner, Mode::Practice, "Directions").await;

    for _ in 0..2 {
        let answer = current_answer(&session).await;
        runner.submit_answer(&session, &answer).await.unwrap();
        session.lock().await.next().unwrap();
    }

    let summary = runner.summarize(&session).await.unwrap().unwrap();
    assert!(summary.summary.starts_with("Perfect score!"));
    assert_eq!(summaries.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_continue_and_restart_after_completion() {
    let runner = runner(Arc::new(Offline), Arc::new(CountingSummaries::default()));
    let session = start(&runner, Mode::Practice, "Directions").await;

    for _ in 0..2 {
        runner.submit_answer(&session, "nope").await.unwrap();
        session.lock().await.next().unwrap();
    }

    // Directions is the last category, so the suggestion wraps around
    let suggested = session.lock().await.continue_to_next_category().unwrap();
    assert_eq!(suggested.as_deref(), Some("Planes"));

    let err = runner.summarize(&session).await.unwrap_err();
    assert!(matches!(err, SessionError::WrongPhase { .. }));

    let mut guard = session.lock().await;
    assert!(guard.restart().is_err());
    guard.select_category("Planes").unwrap();
    assert_eq!(guard.view().question.unwrap().total, 3);
    assert_eq!(guard.score(), 0);
}

#[tokio::test]
async fn test_abandoned_grading_call_releases_question() {
    let runner = runner(Arc::new(HangsOnce::default()), Arc::new(CountingSummaries::default()));
    let session = start(&runner, Mode::Practice, "Planes").await;
    let answer = current_answer(&session).await;

    // Caller gives up while the grader is still working
    let abandoned = tokio::time::timeout(Duration::from_millis(50), runner.submit_answer(&session, &answer)).await;
    assert!(abandoned.is_err());

    tokio::time::timeout(Duration::from_secs(1), async {
        while session.lock().await.grading_pending() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pending marker should be released");

    let submission = runner.submit_answer(&session, &answer).await.unwrap();
    assert!(matches!(submission, Submission::Recorded { .. }));

    let mut guard = session.lock().await;
    assert_eq!(guard.score(), 1);
    assert!(guard.next().is_ok());
}

#[tokio::test]
async fn test_abandoned_summary_request_can_be_retried() {
    let runner = runner(Arc::new(Offline), Arc::new(HangsOnce::default()));
    let session = start(&runner, Mode::Exam, "Directions").await;

    for _ in 0..2 {
        runner.submit_answer(&session, "nope").await.unwrap();
        session.lock().await.next().unwrap();
    }

    let abandoned = tokio::time::timeout(Duration::from_millis(50), runner.summarize(&session)).await;
    assert!(abandoned.is_err());

    let summary = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match runner.summarize(&session).await {
                Err(SessionError::SummaryPending) => tokio::time::sleep(Duration::from_millis(5)).await,
                other => break other,
            }
        }
    })
    .await
    .expect("summary should become available again")
    .unwrap()
    .unwrap();

    assert_eq!(summary.summary, "You missed 2 terms.");
}
