//! # agenda-core
//!
//! Core library for agenda, a natural-language assistant over a contact
//! directory stored in SQLite.
//!
//! A question goes through a fixed pipeline driven by a language model:
//! analyze it into a [`SearchStrategy`], look the strategy up in the result
//! caches, generate and run a parameterized search, evaluate the rows,
//! optionally refine the strategy a bounded number of times, and phrase the
//! answer.
//!
//! ## Architecture
//!
//! - **Caches**: [`BoundedTtlCache`] storage shared by the semantic and the
//!   strategy-fingerprint caches
//! - **Language model**: the [`LanguageModel`] seam and its Gemini client
//! - **Store**: the [`ContactStore`] seam and its read-only SQLite implementation
//! - **Pipeline**: [`QueryOrchestrator`] and the [`QueryOutcome`] it returns
//! - **Error Handling**: library [`Error`]s and the [`ErrorKind`] taxonomy
//!   surfaced to users
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agenda_core::{AgendaConfig, ConversationContext, QueryOrchestrator};
//!
//! # async fn run() -> agenda_core::Result<()> {
//! let config = AgendaConfig::load()?;
//! let orchestrator = QueryOrchestrator::from_config(&config)?;
//! let mut context = ConversationContext::new(config.pipeline.max_history);
//!
//! let outcome = orchestrator.ask("¿Cuál es el teléfono de Luis Pérez?", &mut context).await;
//! println!("{}", outcome.response);
//! orchestrator.flush().await;
//! # Ok(())
//! # }
//! ```

/// Bounded TTL caches and key derivation
pub mod cache;
/// Configuration loading and defaults
pub mod config;
/// Recent conversation turns
pub mod context;
/// Error types and result aliases
pub mod error;
/// Language-model client and structured-output parsing
pub mod llm;
/// Query pipeline
pub mod pipeline;
/// Prompt builders
pub mod prompts;
/// Contact store access
pub mod store;
/// Search strategies and fingerprints
pub mod strategy;

#[cfg(test)]
mod testing;

pub use cache::{
    BoundedTtlCache, CacheStats, KeyNormalizer, KeyStrategy, KeyedCache, SemanticResultCache,
    StrategyCache,
};
pub use config::{AgendaConfig, CacheConfig, DatabaseConfig, LlmConfig, PipelineConfig};
pub use context::{ConversationContext, Turn};
pub use error::{Error, ErrorKind, QueryFailure, Result};
pub use llm::{GeminiClient, LanguageModel, LlmRequest, Purpose, UnconfiguredModel};
pub use pipeline::{CacheReport, CacheSource, Evaluation, QueryOrchestrator, QueryOutcome};
pub use store::{ContactStore, SchemaPreview, SqlOutcome, SqlQuery, SqliteContactStore};
pub use strategy::{Condition, QueryKind, SearchStrategy, fingerprint};
