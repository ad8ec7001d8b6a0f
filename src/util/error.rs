//! Error classification shared by every external collaborator call.
use anyhow::Error;
use reqwest::StatusCode;

/// How the engine should react to a stage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// Input failed validation before any work started.
    InputInvalid,
    /// Transport error or 5xx from a collaborator; worth retrying.
    ExternalUnavailable,
    /// 429-shaped response from a collaborator.
    ExternalRateLimited,
    /// A single call exceeded its deadline.
    ExternalTimeout,
    /// A stage produced no usable output.
    ContentEmpty,
    /// The job was cancelled.
    Cancelled,
    /// An invariant was violated inside the engine.
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub(crate) fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::ExternalTimeout | ErrorKind::ExternalRateLimited
        )
    }

    #[must_use]
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputInvalid => "input_invalid",
            ErrorKind::ExternalUnavailable => "external_unavailable",
            ErrorKind::ExternalRateLimited => "external_rate_limited",
            ErrorKind::ExternalTimeout => "external_timeout",
            ErrorKind::ContentEmpty => "content_empty",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Classify an error raised by a collaborator call.
#[must_use]
pub(crate) fn classify_error(error: &Error) -> ErrorKind {
    if error.downcast_ref::<Cancelled>().is_some() {
        return ErrorKind::Cancelled;
    }

    if error.downcast_ref::<EmptyContent>().is_some() {
        return ErrorKind::ContentEmpty;
    }

    if let Some(reqwest_err) = error.downcast_ref::<reqwest::Error>() {
        if reqwest_err.is_timeout() {
            return ErrorKind::ExternalTimeout;
        }
        if reqwest_err.is_connect() {
            return ErrorKind::ExternalUnavailable;
        }
        if let Some(status) = reqwest_err.status() {
            match status {
                StatusCode::TOO_MANY_REQUESTS => return ErrorKind::ExternalRateLimited,
                _ if status.is_server_error() => return ErrorKind::ExternalUnavailable,
                _ => {}
            }
        }
    }

    if error.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return ErrorKind::ExternalTimeout;
    }

    ErrorKind::ExternalUnavailable
}

/// Marker error for cancellation, carried through `anyhow` so `classify_error`
/// can recognize it without a cancellation-specific `Result` variant at every
/// call site.
#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub(crate) struct Cancelled;

/// Marker error for a stage that produced no usable output, carried through
/// `anyhow` so `classify_error` can recognize it the same way it recognizes
/// [`Cancelled`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct EmptyContent(pub(crate) String);
