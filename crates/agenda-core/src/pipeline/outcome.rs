//! Values produced by one pipeline run.

use crate::error::{ErrorKind, QueryFailure};
use crate::store::{SqlOutcome, SqlQuery};
use crate::strategy::SearchStrategy;
use serde::{Deserialize, Serialize};

/// Which cache, if any, answered the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Computed fresh.
    #[default]
    None,
    /// Served by the semantic result cache.
    Semantic,
    /// Served by the strategy fingerprint cache.
    Strategy,
}

/// Evaluation step verdict, in the model's JSON shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the rows answer the question.
    #[serde(rename = "satisfactorio", default)]
    pub satisfactory: bool,
    /// Free-text assessment.
    #[serde(rename = "evaluacion", default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<String>,
    /// Suggested refinement.
    #[serde(rename = "refinamiento", default, skip_serializing_if = "Option::is_none")]
    pub refinement: Option<Refinement>,
}

/// Refinement proposal inside an [`Evaluation`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Refinement {
    /// Free-text advice.
    #[serde(rename = "sugerencia", default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Replacement strategy, kept raw until it is needed.
    #[serde(rename = "nueva_estrategia", default, skip_serializing_if = "Option::is_none")]
    pub new_strategy: Option<serde_json::Value>,
}

impl Evaluation {
    /// Verdict used when the model could not evaluate: satisfactory iff
    /// anything matched.
    #[must_use]
    pub fn heuristic(total: u64) -> Self {
        Self {
            satisfactory: total > 0,
            assessment: Some(if total > 0 {
                format!("Evaluación automática: se encontraron {total} resultados.")
            } else {
                "Evaluación automática: no se encontraron resultados.".to_string()
            }),
            refinement: None,
        }
    }

    /// The proposed replacement strategy, if it is present and usable.
    ///
    /// Missing, `null`, empty and unparsable proposals all count as absent.
    #[must_use]
    pub fn replacement_strategy(&self) -> Option<SearchStrategy> {
        let raw = self.refinement.as_ref()?.new_strategy.as_ref()?;
        match raw {
            serde_json::Value::Object(map) if !map.is_empty() => {
                serde_json::from_value(raw.clone()).ok()
            },
            _ => None,
        }
    }
}

/// Everything known about one answered (or failed) query.
///
/// `response` is always a non-empty sentence meant for the user, including on
/// failure, where it carries the kind-specific apology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// The user question as received.
    #[serde(default, alias = "consulta")]
    pub query: String,
    /// Answer text.
    #[serde(alias = "respuesta")]
    pub response: String,
    /// Failure that stopped the pipeline, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryFailure>,
    /// Strategy that produced the rows (the refined one after a refinement).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SearchStrategy>,
    /// Generated search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SqlQuery>,
    /// Search results.
    #[serde(default, alias = "resultado_sql", skip_serializing_if = "Option::is_none")]
    pub rows: Option<SqlOutcome>,
    /// Evaluation verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    /// Cache that served this outcome.
    #[serde(default)]
    pub from_cache: CacheSource,
    /// Whether a refinement was attempted.
    #[serde(default)]
    pub refined: bool,
    /// Strategy from the analyze step when a refinement replaced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_strategy: Option<SearchStrategy>,
    /// Absorbed failures that forced a fallback.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<ErrorKind>,
}

impl QueryOutcome {
    /// Outcome for a failure that stopped the pipeline.
    #[must_use]
    pub fn failed(query: &str, failure: QueryFailure) -> Self {
        Self {
            query: query.to_string(),
            response: failure.kind.user_message().to_string(),
            error: Some(failure),
            ..Self::default()
        }
    }

    /// Whether the pipeline stopped on a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Payload written to disk for strategy-cache entries: the answer text and
    /// the row summary only.
    #[must_use]
    pub fn compact(&self) -> Self {
        Self {
            query: self.query.clone(),
            response: self.response.clone(),
            rows: self.rows.clone(),
            ..Self::default()
        }
    }
}
