//! Cache clearing command implementation

use agenda_core::QueryOrchestrator;
use agenda_core::pipeline::CacheReport;
use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use std::io::{self, Write};

/// The cache operations needed by the clear command.
#[async_trait]
pub trait ClearCaches: Sync {
    async fn report(&self) -> CacheReport;
    async fn clear(&self);
}

#[async_trait]
impl ClearCaches for QueryOrchestrator {
    async fn report(&self) -> CacheReport {
        self.cache_stats().await
    }

    async fn clear(&self) {
        self.clear_caches().await;
    }
}

/// High-level outcome produced by [`execute_clear`]. Useful for assertions in tests.
#[derive(Debug, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Both caches were already empty.
    AlreadyEmpty,
    /// User cancelled the clear operation.
    Cancelled,
    /// Caches cleared with the number of entries removed.
    Cleared { entries: usize },
}

/// Core clear implementation with injectable dependencies to enable deterministic tests.
///
/// # Errors
///
/// Returns an error if writing output or confirmation fails.
pub async fn execute_clear<S, W, C>(caches: &S, mut writer: W, force: bool, mut confirm: C) -> Result<ClearOutcome>
where
    S: ClearCaches,
    W: Write + Send,
    C: FnMut(usize) -> Result<bool> + Send,
{
    let report = caches.report().await;
    let entries = report.semantic.size + report.strategy.size;

    if entries == 0 {
        writeln!(writer, "{} Las cachés ya están vacías", "ℹ".blue())?;
        return Ok(ClearOutcome::AlreadyEmpty);
    }

    writeln!(
        writer,
        "{} Se eliminarán {} entradas (semántica: {}, estrategias: {})",
        "⚠".yellow(),
        entries,
        report.semantic.size,
        report.strategy.size
    )?;

    if !force && !confirm(entries)? {
        writeln!(writer, "{} Cancelado", "✗".red())?;
        return Ok(ClearOutcome::Cancelled);
    }

    caches.clear().await;
    writeln!(writer, "{} Cachés limpiadas", "✓".green())?;
    Ok(ClearOutcome::Cleared { entries })
}

/// Clear both caches using the real orchestrator and terminal IO.
///
/// # Errors
///
/// Returns an error if user confirmation or output fails.
pub async fn run(orchestrator: &QueryOrchestrator, force: bool) -> Result<()> {
    let mut input = String::new();

    execute_clear(orchestrator, io::stdout(), force, |_entries| {
        let mut prompt = io::stdout().lock();
        write!(prompt, "¿Continuar? [s/N] ")?;
        prompt.flush()?;

        input.clear();
        io::stdin().read_line(&mut input)?;

        Ok(matches!(
            input.trim().to_lowercase().as_str(),
            "s" | "si" | "sí" | "y" | "yes"
        ))
    })
    .await?;

    Ok(())
}
