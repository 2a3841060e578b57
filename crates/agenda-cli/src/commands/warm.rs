//! Cache warm-up command

use super::stats;
use agenda_core::QueryOrchestrator;
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;
use tracing::warn;

/// Questions asked when no file is given.
pub const COMMON_QUERIES: &[&str] = &[
    "¿Quién es Luis Pérez?",
    "¿Quién es José Ángel Alvarado?",
    "¿Quién es Carmen Celina Ramirez?",
    "¿Quién es Guadalupe Alejandra Escobedo?",
    "¿Quién es Gabriela Jara Fuentes?",
    "¿Cuál es el teléfono de Luis Pérez?",
    "¿Cuál es el correo de José Ángel Alvarado?",
    "¿Dónde vive Carmen Celina Ramirez?",
    "¿Cuál es la función de Guadalupe Alejandra Escobedo?",
    "¿En qué zona trabaja Gabriela Jara Fuentes?",
    "Dame todas las personas de la zona 109",
    "¿Quiénes trabajan en la zona 110?",
    "Lista de personas en la zona 111",
    "¿Quiénes son docentes?",
    "Lista de directores",
    "Muestra todos los subdirectores",
    "¿Cuántos veladores hay?",
    "Personas casadas",
    "Docentes con licenciatura",
    "Personas que viven en Durango",
    "Maestros de la zona 109",
];

/// Questions to warm with: one per non-blank line of `file`, or the built-in list.
///
/// Lines starting with `#` are skipped.
///
/// # Errors
///
/// Returns an error if `file` cannot be read.
pub fn load_queries(file: Option<&Path>) -> Result<Vec<String>> {
    let Some(file) = file else {
        return Ok(COMMON_QUERIES.iter().map(ToString::to_string).collect());
    };

    let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

/// Run every question through the pipeline, then save the caches.
///
/// # Errors
///
/// Returns an error if the query file cannot be read or output fails.
pub async fn execute(orchestrator: &QueryOrchestrator, file: Option<&Path>, clear: bool, show: bool) -> Result<()> {
    let queries = load_queries(file)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if clear {
        orchestrator.clear_caches().await;
        writeln!(out, "{}", "Cachés limpiadas.".green())?;
    }

    writeln!(
        out,
        "{}",
        format!("Precargando caché con {} consultas...", queries.len()).cyan()
    )?;

    let started = Instant::now();
    let mut failed = 0usize;
    for (i, query) in queries.iter().enumerate() {
        writeln!(out, "\n{}", format!("[{}/{}] {query}", i + 1, queries.len()).yellow())?;

        let query_started = Instant::now();
        let outcome = orchestrator.process(query, &[]).await;
        let elapsed = query_started.elapsed();

        if outcome.is_error() {
            failed += 1;
        }
        if show || outcome.is_error() {
            writeln!(out, "{}", outcome.response.blue())?;
        }
        writeln!(out, "{}", format!("Tiempo: {:.2} segundos", elapsed.as_secs_f64()).green())?;
    }

    if !orchestrator.flush().await {
        warn!("could not save caches");
    }

    writeln!(
        out,
        "\n{}",
        format!(
            "Caché precargada con {} consultas ({failed} con error) en {:.2} segundos.",
            queries.len(),
            started.elapsed().as_secs_f64()
        )
        .cyan()
    )?;
    stats::render(&mut out, &orchestrator.cache_stats().await, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    #[test]
    fn builtin_list_is_used_without_a_file() {
        let queries = load_queries(None).expect("builtin");
        assert_eq!(queries.len(), COMMON_QUERIES.len());
        assert_eq!(queries[0], "¿Quién es Luis Pérez?");
    }

    #[test]
    fn file_lines_are_trimmed_and_filtered() {
        let mut file = NamedTempFile::new().expect("tempfile");
        writeln!(file, "# frecuentes\n  ¿Quién es Ana?  \n\nLista de directores").expect("write");

        let queries = load_queries(Some(file.path())).expect("load");
        assert_eq!(queries, vec!["¿Quién es Ana?", "Lista de directores"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_queries(Some(Path::new("/nonexistent/agenda-queries.txt"))).is_err());
    }
}
