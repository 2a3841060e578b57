//! Error types and handling for agenda-core operations.
//!
//! Two layers live here:
//!
//! - [`Error`]: the library error returned by collaborators (LLM client, contact
//!   store, cache persistence, configuration). It keeps the source chain and
//!   exposes [`Error::category`] for logging and [`Error::is_recoverable`],
//!   which marks a [`QueryFailure`] as worth retrying.
//! - [`ErrorKind`] and [`QueryFailure`]: the pipeline-level taxonomy surfaced
//!   to front-ends. The orchestrator converts every [`Error`] into a
//!   [`QueryFailure`] at its boundary so callers always receive a structured,
//!   human-readable result instead of a raw error.
//!
//! ## Propagation policy
//!
//! | Kind | Effect |
//! |------|--------|
//! | `DataUnavailable` | short-circuits the request |
//! | `AnalysisFailure` | short-circuits the request |
//! | `SearchGenerationFailure` | short-circuits the request |
//! | `SearchExecutionFailure` | short-circuits the request |
//! | `EvaluationFailure` | absorbed, heuristic evaluation used |
//! | `ResponseGenerationFailure` | absorbed, templated answer used |

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for agenda-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers cache file reads and writes, directory creation and removal.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Raised by the LLM HTTP client for connection failures, TLS problems and
    /// non-success responses.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The contact database rejected or failed a statement.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The contact database is missing or cannot be opened.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// The language model answered, but not with usable content.
    ///
    /// ## Common Causes
    ///
    /// - Empty candidate list (blocked by safety settings)
    /// - Error payload returned with a success status
    #[error("LLM error: {0}")]
    Llm(String),

    /// Structured output from the language model could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Cache storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(format!("background task failed: {err}"))
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Connection failures and timeouts are recoverable; parse failures,
    /// configuration problems and missing data are not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            Self::Database(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier for structured logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Database(_) => "database",
            Self::DataUnavailable(_) => "data_unavailable",
            Self::Llm(_) => "llm",
            Self::Parse(_) => "parse",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline failure taxonomy surfaced to front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The contact store is unreachable or missing.
    DataUnavailable,
    /// The analyze step failed (LLM call or structured parse).
    AnalysisFailure,
    /// The search-generation step failed.
    SearchGenerationFailure,
    /// The generated search could not be executed.
    SearchExecutionFailure,
    /// Result evaluation failed; recovered with a heuristic.
    EvaluationFailure,
    /// Natural-language answer generation failed; recovered with a template.
    ResponseGenerationFailure,
}

impl ErrorKind {
    /// Kind-specific apology shown to the end user instead of the raw error.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::DataUnavailable => {
                "Lo siento, no puedo acceder a la base de datos en este momento."
            },
            Self::AnalysisFailure => {
                "Lo siento, no pude entender bien tu consulta. ¿Podrías reformularla?"
            },
            Self::SearchGenerationFailure => {
                "Lo siento, tuve un problema al procesar tu consulta. ¿Podrías intentar con una consulta más simple?"
            },
            Self::SearchExecutionFailure => {
                "Lo siento, ocurrió un error al buscar en la base de datos. Por favor, intenta con otra consulta."
            },
            Self::EvaluationFailure => "No se pudo evaluar completamente los resultados.",
            Self::ResponseGenerationFailure => {
                "Encontré resultados para tu consulta, pero tuve problemas al generar una respuesta detallada."
            },
        }
    }

    /// Stable identifier used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataUnavailable => "data_unavailable",
            Self::AnalysisFailure => "analysis_failure",
            Self::SearchGenerationFailure => "search_generation_failure",
            Self::SearchExecutionFailure => "search_execution_failure",
            Self::EvaluationFailure => "evaluation_failure",
            Self::ResponseGenerationFailure => "response_generation_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable failure attached to a query outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFailure {
    /// Failure kind.
    pub kind: ErrorKind,
    /// Technical description of what went wrong.
    pub message: String,
    /// Whether asking again may succeed (timeouts, dropped connections, busy database).
    #[serde(default)]
    pub retryable: bool,
}

impl QueryFailure {
    /// Build a failure of `kind` from a library error.
    #[must_use]
    pub fn from_error(kind: ErrorKind, error: &Error) -> Self {
        Self {
            kind,
            message: error.to_string(),
            retryable: error.is_recoverable(),
        }
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
