//! Contact store seam.
//!
//! The model writes the SQL; the store only checks that the data is there,
//! describes it for prompts, and runs what it is given.

mod sqlite;

pub use sqlite::SqliteContactStore;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One result row, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Rows returned by a search plus the number of matching records.
///
/// `total` can exceed `rows.len()` when the query was limited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlOutcome {
    /// Matching records, ignoring any `LIMIT`.
    #[serde(default)]
    pub total: u64,
    /// Fetched rows.
    #[serde(default, alias = "registros")]
    pub rows: Vec<Row>,
}

impl SqlOutcome {
    /// Wrap fetched rows, using their count as the total.
    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            total: rows.len() as u64,
            rows,
        }
    }

    /// Whether nothing matched.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// A parameterized query produced by the search-generation step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    /// SQL text with positional `?` placeholders.
    #[serde(rename = "sql_query", alias = "sql", default)]
    pub sql: String,
    /// Positional parameters.
    #[serde(default, alias = "params")]
    pub parameters: Vec<serde_json::Value>,
    /// The model's explanation; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Read-only description of the data, used to ground prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaPreview {
    /// Column names in table order.
    pub columns: Vec<String>,
    /// Total number of records.
    pub total_rows: u64,
    /// A sorted sample of distinct full names.
    pub sample_names: Vec<String>,
    /// A few complete records.
    pub sample_rows: Vec<Row>,
}

/// Backing store for contact records.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Fail with [`crate::Error::DataUnavailable`] if the data cannot be reached.
    async fn check_available(&self) -> Result<()>;

    /// Describe the table for prompt grounding.
    async fn schema_preview(&self) -> Result<SchemaPreview>;

    /// Execute `sql` with positional `params`.
    async fn run_sql(&self, sql: &str, params: &[serde_json::Value]) -> Result<SqlOutcome>;
}
