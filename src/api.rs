use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    errors::{ApiError, ErrorContext, SessionError},
    models::{GradeOutcome, GradingModel, Mode, ResultRecord, SessionSummary},
    runner::{QuizRunner, SharedSession, Submission},
    session::{CategoryInfo, QuizSession, SessionView},
    session_store::SessionStore,
};

// Import logging macros
use crate::{log_api_start, log_api_success};

#[derive(Clone)]
pub struct AppState {
    pub runner: QuizRunner,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(runner: QuizRunner) -> Self {
        Self::with_sessions(runner, SessionStore::default())
    }

    pub fn with_sessions(runner: QuizRunner, sessions: SessionStore) -> Self {
        Self { runner, sessions }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAnswerRequest {
    pub user_answer: String,
    pub correct_answer: String,
    pub question: String,
    pub category: String,
    pub model: Option<String>,
}

#[derive(Deserialize)]
pub struct GenerateSummaryRequest {
    pub results: Vec<ResultRecord>,
    pub model: Option<String>,
}

#[derive(Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
}

#[derive(Deserialize)]
pub struct ModelRequest {
    pub model: String,
}

#[derive(Deserialize)]
pub struct CategoryRequest {
    pub category: String,
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Serialize)]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub session: SessionView,
}

#[derive(Serialize)]
pub struct AnswerResponse {
    pub discarded: bool,
    pub session: SessionView,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub summary: Option<SessionSummary>,
    pub session: SessionView,
}

fn fail(error: impl Into<ApiError>, operation: &str, session_id: Option<Uuid>) -> ErrorResponse {
    let mut context = ErrorContext::new(operation, "session");
    if let Some(id) = session_id {
        context = context.with_session(&id.to_string());
    }
    error.into().to_response_with_context(context)
}

fn parse_model(raw: &str, operation: &str) -> Result<GradingModel, ErrorResponse> {
    raw.parse::<GradingModel>()
        .map_err(|e| fail(ApiError::ValidationError(e), operation, None))
}

// Stateless collaborator endpoints
pub async fn validate_answer(
    State(state): State<AppState>,
    Json(request): Json<ValidateAnswerRequest>,
) -> ApiResult<GradeOutcome> {
    log_api_start!("validate_answer");

    let model = match request.model.as_deref() {
        Some(raw) => parse_model(raw, "validate_answer")?,
        None => GradingModel::default(),
    };
    if request.user_answer.trim().is_empty() {
        return Err(fail(SessionError::BlankAnswer, "validate_answer", None));
    }

    let outcome = state
        .runner
        .grading()
        .grade(
            &request.user_answer,
            &request.correct_answer,
            &request.question,
            &request.category,
            model,
        )
        .await;

    log_api_success!("validate_answer", "answer graded");
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn generate_summary(
    State(state): State<AppState>,
    Json(request): Json<GenerateSummaryRequest>,
) -> ApiResult<SessionSummary> {
    log_api_start!("generate_summary");

    let model = request
        .model
        .as_deref()
        .map(GradingModel::parse_or_default)
        .unwrap_or_default();
    let summary = state.runner.summary().summarize(&request.results, model).await;

    log_api_success!("generate_summary", "summary generated");
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<CategoryInfo>> {
    let bank = state.runner.bank();
    let categories = bank
        .categories()
        .into_iter()
        .map(|name| CategoryInfo {
            name: name.to_string(),
            question_count: bank.category_count(name),
        })
        .collect();
    Ok(Json(ApiResponse::success(categories)))
}

// Session endpoints
async fn find_session(state: &AppState, id: Uuid, operation: &str) -> Result<SharedSession, ErrorResponse> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| fail(ApiError::NotFound(format!("session {}", id)), operation, Some(id)))
}

/// Applies a synchronous state-machine transition and returns the new view.
async fn transition<T>(
    state: &AppState,
    id: Uuid,
    operation: &'static str,
    apply: impl FnOnce(&mut QuizSession) -> Result<T, SessionError>,
) -> ApiResult<SessionView> {
    log_api_start!(operation, session_id = id);
    let session = find_session(state, id, operation).await?;
    let mut guard = session.lock().await;

    apply(&mut *guard).map_err(|e| fail(e, operation, Some(id)))?;

    let view = guard.view();
    log_api_success!(operation, session_id = id, phase = view.phase);
    Ok(Json(ApiResponse::success(view)))
}

pub async fn create_session(State(state): State<AppState>) -> ApiResult<CreatedSession> {
    log_api_start!("create_session");

    let session = state.runner.open_session().await;
    let view = session.view();
    let (session_id, _) = state.sessions.insert(session).await;

    info!(session_id = %session_id, phase = view.phase, "Quiz session created");
    Ok(Json(ApiResponse::success(CreatedSession { session_id, session: view })))
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    let session = find_session(&state, id, "get_session").await?;
    let view = session.lock().await.view();
    Ok(Json(ApiResponse::success(view)))
}

pub async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    if state.sessions.remove(id).await {
        info!(session_id = %id, "Quiz session discarded");
        Ok(Json(ApiResponse::success(())))
    } else {
        Err(fail(ApiError::NotFound(format!("session {}", id)), "delete_session", Some(id)))
    }
}

pub async fn acknowledge_welcome(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    log_api_start!("acknowledge_welcome", session_id = id);
    let session = find_session(&state, id, "acknowledge_welcome").await?;

    state
        .runner
        .acknowledge_welcome(&session)
        .await
        .map_err(|e| fail(e, "acknowledge_welcome", Some(id)))?;

    let view = session.lock().await.view();
    Ok(Json(ApiResponse::success(view)))
}

pub async fn select_mode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ModeRequest>,
) -> ApiResult<SessionView> {
    transition(&state, id, "select_mode", |s| s.select_mode(request.mode)).await
}

pub async fn select_model(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ModelRequest>,
) -> ApiResult<SessionView> {
    let model = parse_model(&request.model, "select_model")?;
    transition(&state, id, "select_model", |s| {
        s.set_model(model);
        Ok(())
    })
    .await
}

pub async fn back_to_mode_select(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    transition(&state, id, "back_to_mode_select", QuizSession::back_to_mode_select).await
}

pub async fn select_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CategoryRequest>,
) -> ApiResult<SessionView> {
    transition(&state, id, "select_category", |s| s.select_category(&request.category)).await
}

pub async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<AnswerResponse> {
    log_api_start!("submit_answer", session_id = id);
    let session = find_session(&state, id, "submit_answer").await?;

    let submission = state
        .runner
        .submit_answer(&session, &request.answer)
        .await
        .map_err(|e| fail(e, "submit_answer", Some(id)))?;

    let view = session.lock().await.view();
    log_api_success!("submit_answer", session_id = id, phase = view.phase);
    Ok(Json(ApiResponse::success(AnswerResponse {
        discarded: submission == Submission::Discarded,
        session: view,
    })))
}

pub async fn next_question(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    transition(&state, id, "next", QuizSession::next).await
}

pub async fn previous_question(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    transition(&state, id, "previous", QuizSession::previous).await
}

pub async fn exit_quiz(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    transition(&state, id, "exit", QuizSession::exit).await
}

pub async fn session_summary(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SummaryResponse> {
    log_api_start!("session_summary", session_id = id);
    let session = find_session(&state, id, "session_summary").await?;

    let summary = state
        .runner
        .summarize(&session)
        .await
        .map_err(|e| fail(e, "session_summary", Some(id)))?;

    let view = session.lock().await.view();
    Ok(Json(ApiResponse::success(SummaryResponse { summary, session: view })))
}

pub async fn restart(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    transition(&state, id, "restart", QuizSession::restart).await
}

pub async fn continue_next_category(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    transition(&state, id, "continue", QuizSession::continue_to_next_category).await
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Stateless collaborator routes
        .route("/api/quiz/validate-answer", post(validate_answer))
        .route("/api/quiz/generate-summary", post(generate_summary))
        .route("/api/categories", get(list_categories))
        // Session routes
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/welcome", post(acknowledge_welcome))
        .route("/api/sessions/:id/mode", post(select_mode))
        .route("/api/sessions/:id/model", post(select_model))
        .route("/api/sessions/:id/back", post(back_to_mode_select))
        .route("/api/sessions/:id/category", post(select_category))
        .route("/api/sessions/:id/answer", post(submit_answer))
        .route("/api/sessions/:id/next", post(next_question))
        .route("/api/sessions/:id/previous", post(previous_question))
        .route("/api/sessions/:id/exit", post(exit_quiz))
        .route("/api/sessions/:id/summary", post(session_summary))
        .route("/api/sessions/:id/restart", post(restart))
        .route("/api/sessions/:id/continue", post(continue_next_category))
        .with_state(state)
}
