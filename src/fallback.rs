use std::future::Future;
use tracing::{debug, warn};

use crate::errors::CollaboratorError;
use crate::models::OutcomeSource;

/// A value produced either by the remote collaborator or by the local fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: OutcomeSource,
}

impl<T> Resolved<T> {
    pub fn is_fallback(&self) -> bool {
        self.source == OutcomeSource::Fallback
    }
}

/// Runs `attempt`; on any error logs it and returns `fallback()` instead.
///
/// The fallback closure must be total. Nothing raised by `attempt` escapes.
pub async fn attempt_or_fallback<T, Fut, F>(operation: &'static str, attempt: Fut, fallback: F) -> Resolved<T>
where
    Fut: Future<Output = Result<T, CollaboratorError>>,
    F: FnOnce() -> T,
{
    match attempt.await {
        Ok(value) => {
            debug!(component = "fallback", operation, "Collaborator call succeeded");
            Resolved {
                value,
                source: OutcomeSource::Primary,
            }
        }
        Err(e) => {
            warn!(
                component = "fallback",
                operation,
                error = %e,
                "Collaborator call failed, using local fallback"
            );
            Resolved {
                value: fallback(),
                source: OutcomeSource::Fallback,
            }
        }
    }
}
