//! Search strategies produced by the analyze step.
//!
//! A [`SearchStrategy`] is the structured interpretation of one user question.
//! It is created fresh per query and never mutated afterwards: a refinement
//! produces a new strategy, so the original and the refined one can both be
//! cached and logged.
//!
//! The JSON shape exchanged with the language model uses the Spanish field
//! names of the prompts (`tipo_consulta`, `nombres_posibles`, ...). Unknown
//! query kinds collapse to [`QueryKind::General`].

mod fingerprint;

pub use fingerprint::{fingerprint, fold_accents};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Category of a user question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryKind {
    /// Information about a specific person.
    Info,
    /// Listing of several records.
    Listing,
    /// People matching a condition.
    Filter,
    /// Counting people.
    Count,
    /// Anything else.
    #[default]
    General,
}

impl QueryKind {
    /// Collapse a free-form kind label into a known kind.
    ///
    /// Matching is literal after lower-casing and trimming; anything
    /// unrecognized becomes [`QueryKind::General`].
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "informacion" | "información" | "info" => Self::Info,
            "listado" | "lista" | "listar" => Self::Listing,
            "filtrado" | "filtrar" | "buscar" => Self::Filter,
            "conteo" | "contar" | "cuantos" | "cuántos" => Self::Count,
            _ => Self::General,
        }
    }

    /// Canonical label used on the wire and in fingerprints.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "informacion",
            Self::Listing => "listado",
            Self::Filter => "filtrado",
            Self::Count => "conteo",
            Self::General => "general",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for QueryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QueryKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or(Self::General, |label| Self::parse(&label)))
    }
}

/// One `(field, operator, value)` filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Column or attribute name as the model wrote it.
    #[serde(rename = "campo", default)]
    pub field: String,
    /// Comparison operator (`=`, `LIKE`, ...).
    #[serde(rename = "operador", default = "default_operator")]
    pub operator: String,
    /// Compared value; numbers and booleans are kept as their text form.
    #[serde(rename = "valor", default, deserialize_with = "value_as_string")]
    pub value: String,
}

impl Condition {
    /// Convenience constructor.
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

fn default_operator() -> String {
    "=".to_string()
}

fn value_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Structured interpretation of a user question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchStrategy {
    /// Question category.
    #[serde(rename = "tipo_consulta", default)]
    pub kind: QueryKind,
    /// Possible spellings of the person named in the question, in display order.
    #[serde(rename = "nombres_posibles", default)]
    pub candidate_names: Vec<String>,
    /// Attributes the user asked for (`telefono`, `correo`, ...).
    #[serde(rename = "atributos_solicitados", default)]
    pub requested_attributes: Vec<String>,
    /// Filters to apply.
    #[serde(rename = "condiciones", default)]
    pub conditions: Vec<Condition>,
    /// Free-form `topic:entity:attribute` label used by the semantic cache.
    #[serde(
        rename = "clave_semantica",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub semantic_key: Option<String>,
    /// The model's own explanation; informational only.
    #[serde(rename = "explicacion", default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl SearchStrategy {
    /// Create an empty strategy of the given kind.
    #[must_use]
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Builder-style helper adding candidate names.
    #[must_use]
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidate_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Builder-style helper adding requested attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Builder-style helper adding a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Builder-style helper setting the semantic key.
    #[must_use]
    pub fn with_semantic_key(mut self, key: impl Into<String>) -> Self {
        self.semantic_key = Some(key.into());
        self
    }

    /// The semantic key, if present and not blank.
    #[must_use]
    pub fn semantic_key(&self) -> Option<&str> {
        self.semantic_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}
