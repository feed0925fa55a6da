// Macros file - tracing macros are referenced by full path inside each macro

/// Standardized logging macros so quiz, collaborator and storage events share field names.

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, session_id = $session_id:expr) => {
        tracing::debug!(
            operation = $operation,
            session_id = %$session_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(operation = $operation, "API operation started");
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, session_id = $session_id:expr, phase = $phase:expr) => {
        tracing::info!(
            operation = $operation,
            session_id = %$session_id,
            phase = $phase,
            "API operation completed"
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(operation = $operation, "API operation completed: {}", $msg);
    };
}

// ============================================================================
// Collaborator (LLM) Logging Macros
// ============================================================================

/// Log remote grading/summary calls with provider context
#[macro_export]
macro_rules! log_collaborator {
    (start, $operation:expr, provider = $provider:expr, model = $model:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            model = %$model,
            "Collaborator call started"
        );
    };
    (success, $operation:expr, provider = $provider:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            duration_ms = $duration,
            "Collaborator call completed"
        );
    };
    (error, $operation:expr, provider = $provider:expr, error = $error:expr) => {
        tracing::error!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            error = %$error,
            "Collaborator call failed"
        );
    };
}

// ============================================================================
// Storage Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, key = $key:expr) => {
        tracing::debug!(
            component = "flag_store",
            operation = $operation,
            key = %$key,
            "Database operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "flag_store",
            operation = $operation,
            "Database operation: {}", $msg
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and configuration events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
