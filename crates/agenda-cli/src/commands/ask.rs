//! Single-question command

use agenda_core::{CacheSource, QueryOrchestrator, QueryOutcome};
use anyhow::Result;
use colored::Colorize;
use std::io::{self, Write};
use tracing::warn;

/// Answer one question and persist the caches.
///
/// # Errors
///
/// Returns an error only if writing to stdout fails; pipeline failures are
/// printed as the outcome's apology.
pub async fn execute(orchestrator: &QueryOrchestrator, query: &str, json: bool) -> Result<()> {
    let outcome = orchestrator.process(query, &[]).await;

    let stdout = io::stdout();
    render(&mut stdout.lock(), &outcome, json)?;

    if !orchestrator.flush().await {
        warn!("could not save caches");
    }
    Ok(())
}

/// Write `outcome` as text or pretty JSON.
pub(crate) fn render<W: Write>(writer: &mut W, outcome: &QueryOutcome, json: bool) -> Result<()> {
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(outcome)?)?;
        return Ok(());
    }

    if let Some(failure) = &outcome.error {
        writeln!(writer, "{}", outcome.response.red())?;
        if failure.retryable {
            writeln!(writer, "{}", "(error temporal, vuelve a intentarlo en un momento)".dimmed())?;
        }
        return Ok(());
    }

    writeln!(writer, "{}", outcome.response)?;
    let note = match outcome.from_cache {
        CacheSource::Semantic => Some("(respuesta en caché semántica)"),
        CacheSource::Strategy => Some("(respuesta en caché de estrategias)"),
        CacheSource::None if outcome.refined => Some("(búsqueda refinada automáticamente)"),
        CacheSource::None => None,
    };
    if let Some(note) = note {
        writeln!(writer, "{}", note.dimmed())?;
    }
    Ok(())
}
