use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{info, warn};

/// Failures of the remote grading/summary collaborator. Always recovered by the fallback path.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("LLM API key not configured")]
    MissingCredential,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("no content in LLM response")]
    EmptyResponse,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Precondition violations of the quiz session state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("operation '{operation}' is not allowed in phase {phase}")]
    WrongPhase {
        operation: &'static str,
        phase: &'static str,
    },

    #[error("answer must not be blank")]
    BlankAnswer,

    #[error("current question has already been answered")]
    AlreadySubmitted,

    #[error("current question must be answered before navigating")]
    NotSubmitted,

    #[error("a grading call is still pending for this question")]
    GradingPending,

    #[error("a summary request is already in flight")]
    SummaryPending,

    #[error("question index out of bounds")]
    OutOfBounds,

    #[error("unknown category '{0}'")]
    UnknownCategory(String),
}

/// Question bank loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("failed to read question bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse question bank: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("question '{0}' has an empty answer")]
    EmptyAnswer(String),

    #[error("question '{0}' has no blank marker in its prompt")]
    MissingBlank(String),

    #[error("duplicate question id '{0}'")]
    DuplicateId(String),

    #[error("question bank is empty")]
    Empty,
}

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Session state conflict: {0}")]
    Conflict(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::BlankAnswer
            | SessionError::OutOfBounds
            | SessionError::UnknownCategory(_) => ApiError::ValidationError(err.to_string()),
            SessionError::WrongPhase { .. }
            | SessionError::AlreadySubmitted
            | SessionError::NotSubmitted
            | SessionError::GradingPending
            | SessionError::SummaryPending => ApiError::Conflict(err.to_string()),
        }
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub session_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            session_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_session(mut self, id: &str) -> Self {
        self.session_id = Some(id.to_string());
        self
    }
}

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    session_id = ?context.session_id,
                    error = %self,
                    "Resource not found"
                );
                (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error(format!("{} not found", context.resource_type))),
                )
            }
            ApiError::ValidationError(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    session_id = ?context.session_id,
                    error = %self,
                    "Validation error"
                );
                (StatusCode::BAD_REQUEST, Json(ApiResponse::error(self.to_string())))
            }
            ApiError::Conflict(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    session_id = ?context.session_id,
                    error = %self,
                    "Session state conflict"
                );
                (StatusCode::CONFLICT, Json(ApiResponse::error(self.to_string())))
            }
        }
    }
}
