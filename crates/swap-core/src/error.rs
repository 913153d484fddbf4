//! Error taxonomy shared by the engine components.

use std::future::Future;
use std::time::Duration;

use skillswap_protocol::{codes, ProtocolError};
use thiserror::Error;

use crate::store::StoreError;

/// Errors reported back to the caller of an engine operation.
///
/// Everything except [`ChatError::Transient`] is terminal for the operation;
/// none of them are retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Referenced match, skill or user does not exist or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(String),

    /// Actor is not allowed to perform the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate match or invalid state transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Store timed out or is unreachable.
    #[error("Temporarily unavailable: {0}")]
    Transient(String),
}

impl ChatError {
    /// Short machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::NotFound(_) => "not_found",
            ChatError::Forbidden(_) => "forbidden",
            ChatError::Conflict(_) => "conflict",
            ChatError::Validation(_) => "validation",
            ChatError::Transient(_) => "transient",
        }
    }

    /// Protocol error code for the `error` event.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            ChatError::NotFound(_) => codes::NOT_FOUND,
            ChatError::Forbidden(_) => codes::FORBIDDEN,
            ChatError::Conflict(_) => codes::CONFLICT,
            ChatError::Validation(_) => codes::VALIDATION,
            ChatError::Transient(_) => codes::TRANSIENT,
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing(what) => ChatError::NotFound(what),
            StoreError::Timeout => ChatError::Transient("store timed out".into()),
            StoreError::Unavailable(reason) => ChatError::Transient(reason),
        }
    }
}

impl From<ProtocolError> for ChatError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Invalid(reason) => ChatError::Validation(reason),
            other => ChatError::Validation(other.to_string()),
        }
    }
}

/// Run a store call with a deadline.
///
/// # Errors
///
/// Returns [`ChatError::Transient`] if the deadline elapses, or the store error converted.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(ChatError::from),
        Err(_) => Err(StoreError::Timeout.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(1)
        };
        let result = bounded(Duration::from_secs(1), slow).await;
        assert!(matches!(result, Err(ChatError::Transient(_))));
    }

    #[tokio::test]
    async fn test_bounded_maps_store_errors() {
        let missing = async { Err::<(), _>(StoreError::Missing("match m1".into())) };
        assert_eq!(
            bounded(Duration::from_secs(1), missing).await,
            Err(ChatError::NotFound("match m1".into()))
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ChatError::Forbidden("x".into()).code(), codes::FORBIDDEN);
        assert_eq!(ChatError::Conflict("x".into()).kind(), "conflict");
    }
}
