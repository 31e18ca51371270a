//! Recoverable errors surfaced to the user.
//!
//! Everything in here is handled at the lifecycle controller boundary and
//! converted to a chat message. None of these should ever crash the process.

use thiserror::Error;

/// An error answering a photographed question. All variants are recoverable:
/// the user either resends the photo or retries with a different provider.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// OCR produced no usable text. Nothing is retained; the user must
    /// resend the image.
    #[error("couldn't extract any text from the image")]
    ExtractionEmpty,

    /// A selection arrived with no matching pending question (process
    /// restart, or a stale button). The user must resend the image.
    #[error("no question found")]
    SessionDesync,

    /// A selection referenced a provider id we don't know about.
    #[error("unknown provider {0:?}")]
    UnknownProvider(String),

    /// A backend call failed. The question text is restored so the user
    /// can retry with a different provider.
    #[error("provider {provider} failed: {cause}")]
    Provider {
        provider: String,
        #[source]
        cause: ProviderFailure,
    },
}

/// Why a provider call failed. The user-facing message stays generic, but
/// we keep the distinction for logs.
#[derive(Debug, Error)]
pub enum ProviderFailure {
    #[error("credential rejected or missing")]
    Auth,

    #[error("request timed out")]
    Timeout,

    /// The backend answered, but with empty or missing content. This is an
    /// error, not a silent empty answer.
    #[error("empty response from backend")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("backend error: {0}")]
    Api(String),
}
