use super::{ContactStore, Row, SchemaPreview, SqlOutcome};
use crate::config::DatabaseConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const NAME_COLUMN: &str = "nombre_completo";

/// [`ContactStore`] over a SQLite file, opened read-only per call.
#[derive(Debug, Clone)]
pub struct SqliteContactStore {
    path: PathBuf,
    table: String,
    preview_limit: usize,
    example_limit: usize,
}

impl SqliteContactStore {
    /// Store over `path` using the default table and preview sizes.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::from_config(&DatabaseConfig {
            path: path.into(),
            ..DatabaseConfig::default()
        })
    }

    /// Store described by configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the table name is not a plain identifier.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let valid = !config.table.is_empty()
            && config
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::Config(format!(
                "invalid table name '{}'",
                config.table
            )));
        }

        Ok(Self {
            path: config.path.clone(),
            table: config.table.clone(),
            preview_limit: config.preview_limit,
            example_limit: config.example_limit,
        })
    }

    /// Database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path)?;
            work(&conn)
        })
        .await?
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(Error::DataUnavailable(format!(
            "database not found at {}",
            path.display()
        )));
    }
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| Error::DataUnavailable(format!("cannot open {}: {e}", path.display())))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n.as_i64().map_or_else(
            || n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
            SqlValue::Integer,
        ),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

fn query_rows(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), to_json_value(row.get_ref(idx)?));
        }
        out.push(record);
    }
    Ok(out)
}

/// Count every match of a limited query by wrapping the part before its last
/// `LIMIT` in a `COUNT(*)` subquery.
fn unlimited_total(conn: &Connection, sql: &str, params: &[SqlValue]) -> Option<u64> {
    let cut = sql.to_ascii_uppercase().rfind("LIMIT")?;
    let prefix = sql[..cut].trim();
    let placeholders = prefix.matches('?').count();
    let count_sql = format!("SELECT COUNT(*) FROM ({prefix}) AS subquery");

    let bound = params.get(..placeholders)?;
    match conn.query_row(&count_sql, params_from_iter(bound.iter()), |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(total) => u64::try_from(total).ok(),
        Err(e) => {
            debug!(error = %e, "could not count unlimited total");
            None
        },
    }
}

#[async_trait]
impl ContactStore for SqliteContactStore {
    async fn check_available(&self) -> Result<()> {
        self.with_connection(|_| Ok(())).await
    }

    async fn schema_preview(&self) -> Result<SchemaPreview> {
        let table = self.table.clone();
        let preview_limit = self.preview_limit;
        let example_limit = self.example_limit;

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
            let columns = stmt
                .query_map([], |row| row.get::<_, String>("name"))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if columns.is_empty() {
                return Err(Error::DataUnavailable(format!("table '{table}' not found")));
            }

            let total: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;

            let sample_names = if columns.iter().any(|c| c == NAME_COLUMN) {
                let mut stmt = conn.prepare(&format!(
                    "SELECT DISTINCT {NAME_COLUMN} FROM {table} \
                     WHERE {NAME_COLUMN} IS NOT NULL ORDER BY {NAME_COLUMN} LIMIT {preview_limit}"
                ))?;
                stmt.query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            } else {
                Vec::new()
            };

            let sample_rows = query_rows(
                conn,
                &format!("SELECT * FROM {table} LIMIT {example_limit}"),
                &[],
            )?;

            Ok(SchemaPreview {
                columns,
                total_rows: u64::try_from(total).unwrap_or_default(),
                sample_names,
                sample_rows,
            })
        })
        .await
    }

    async fn run_sql(&self, sql: &str, params: &[Value]) -> Result<SqlOutcome> {
        let sql = sql.to_string();
        let params: Vec<SqlValue> = params.iter().map(to_sql_value).collect();

        let outcome = self
            .with_connection(move |conn| {
                let rows = query_rows(conn, &sql, &params)?;
                let fetched = rows.len() as u64;
                let total = if sql.to_ascii_uppercase().contains("LIMIT") {
                    unlimited_total(conn, &sql, &params).unwrap_or(fetched)
                } else {
                    fetched
                };
                Ok(SqlOutcome { total, rows })
            })
            .await;

        match &outcome {
            Ok(result) => debug!(total = result.total, fetched = result.rows.len(), "query executed"),
            Err(e) => warn!(error = %e, "query failed"),
        }
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn seeded_db(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("agenda.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE contactos (
                 id INTEGER PRIMARY KEY,
                 nombre_completo TEXT,
                 telefono TEXT,
                 zona INTEGER,
                 estado_civil TEXT
             );
             INSERT INTO contactos (nombre_completo, telefono, zona, estado_civil) VALUES
                 ('PEREZ LUIS', '618 123 4567', 109, 'casado'),
                 ('MARTINEZ ANA', '618 765 4321', 110, 'soltera'),
                 ('ALVARADO JOSE', NULL, 109, 'casado'),
                 ('PEREZ LUIS', '618 000 0000', 111, 'casado');",
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let store = SqliteContactStore::new(temp.path().join("nope.db")).unwrap();
        let err = store.check_available().await.unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_schema_preview() {
        let temp = TempDir::new().unwrap();
        let store = SqliteContactStore::new(seeded_db(&temp)).unwrap();
        store.check_available().await.unwrap();

        let preview = store.schema_preview().await.unwrap();
        assert_eq!(
            preview.columns,
            vec!["id", "nombre_completo", "telefono", "zona", "estado_civil"]
        );
        assert_eq!(preview.total_rows, 4);
        assert_eq!(
            preview.sample_names,
            vec!["ALVARADO JOSE", "MARTINEZ ANA", "PEREZ LUIS"]
        );
        assert_eq!(preview.sample_rows.len(), 3);
    }

    #[tokio::test]
    async fn test_run_sql_binds_mixed_parameters() {
        let temp = TempDir::new().unwrap();
        let store = SqliteContactStore::new(seeded_db(&temp)).unwrap();

        let outcome = store
            .run_sql(
                "SELECT nombre_completo, telefono FROM contactos WHERE zona = ? AND estado_civil = ? ORDER BY id",
                &[json!(109), json!("casado")],
            )
            .await
            .unwrap();

        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.rows[0]["telefono"], json!("618 123 4567"));
        assert_eq!(outcome.rows[1]["telefono"], Value::Null);
    }

    #[tokio::test]
    async fn test_limited_query_reports_true_total() {
        let temp = TempDir::new().unwrap();
        let store = SqliteContactStore::new(seeded_db(&temp)).unwrap();

        let outcome = store
            .run_sql("SELECT * FROM contactos WHERE estado_civil = ? LIMIT 1", &[json!("casado")])
            .await
            .unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.total, 3);
    }

    #[tokio::test]
    async fn test_parameterized_limit_still_counts() {
        let temp = TempDir::new().unwrap();
        let store = SqliteContactStore::new(seeded_db(&temp)).unwrap();

        let outcome = store
            .run_sql("SELECT * FROM contactos LIMIT ?", &[json!(2)])
            .await
            .unwrap();
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.total, 4);
    }

    #[tokio::test]
    async fn test_malformed_sql_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = SqliteContactStore::new(seeded_db(&temp)).unwrap();
        let err = store.run_sql("SELEC nada", &[]).await.unwrap_err();
        assert_eq!(err.category(), "database");
    }

    #[tokio::test]
    async fn test_writes_are_rejected() {
        let temp = TempDir::new().unwrap();
        let store = SqliteContactStore::new(seeded_db(&temp)).unwrap();
        assert!(store.run_sql("DELETE FROM contactos", &[]).await.is_err());
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let config = DatabaseConfig {
            table: "contactos; DROP TABLE x".into(),
            ..DatabaseConfig::default()
        };
        assert!(SqliteContactStore::from_config(&config).is_err());
    }
}
