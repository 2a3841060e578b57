//! The query pipeline and the values it produces.

mod orchestrator;
mod outcome;
mod respond;

pub use orchestrator::{CacheReport, DEFAULT_MAX_REFINEMENTS, QueryOrchestrator};
pub use outcome::{CacheSource, Evaluation, QueryOutcome, Refinement};
pub use respond::{NO_RESULTS_ANSWER, dedup_consecutive_lines, display_name, fallback_answer};
