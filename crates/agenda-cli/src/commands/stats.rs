//! Cache statistics command implementation

use agenda_core::pipeline::CacheReport;
use agenda_core::{CacheStats, QueryOrchestrator};
use anyhow::Result;
use colored::Colorize;
use std::io::{self, Write};

/// Print statistics for both caches.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub async fn execute(orchestrator: &QueryOrchestrator, json: bool) -> Result<()> {
    let report = orchestrator.cache_stats().await;
    let stdout = io::stdout();
    render(&mut stdout.lock(), &report, json)
}

pub(crate) fn render<W: Write>(writer: &mut W, report: &CacheReport, json: bool) -> Result<()> {
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(report)?)?;
        return Ok(());
    }

    let semantic_title = if report.semantic_enabled {
        "Caché semántica".to_string()
    } else {
        format!("Caché semántica {}", "(desactivada)".yellow())
    };
    write_section(writer, &semantic_title, &report.semantic)?;
    writeln!(writer)?;
    write_section(writer, "Caché de estrategias", &report.strategy)
}

fn write_section<W: Write>(writer: &mut W, title: &str, stats: &CacheStats) -> Result<()> {
    writeln!(writer, "{}", title.bold())?;
    writeln!(writer, "  Entradas:  {}/{}", stats.size, stats.max_size)?;
    writeln!(writer, "  Aciertos:  {}", stats.hits)?;
    writeln!(writer, "  Fallos:    {}", stats.misses)?;
    writeln!(writer, "  Tasa:      {}", stats.hit_rate)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(size: usize, hits: u64, misses: u64, rate: &str) -> CacheStats {
        CacheStats {
            size,
            max_size: 100,
            hits,
            misses,
            hit_rate: rate.to_string(),
        }
    }

    #[test]
    fn text_report_lists_both_caches() {
        colored::control::set_override(false);
        let report = CacheReport {
            semantic: stats(3, 3, 1, "75.00%"),
            strategy: stats(0, 0, 0, "0.00%"),
            semantic_enabled: false,
        };
        let mut out = Vec::new();
        render(&mut out, &report, false).expect("render");
        let text = String::from_utf8(out).expect("valid utf8");

        assert!(text.contains("Caché semántica (desactivada)"));
        assert!(text.contains("Entradas:  3/100"));
        assert!(text.contains("Tasa:      75.00%"));
        assert!(text.contains("Caché de estrategias"));
    }

    #[test]
    fn json_report_uses_stat_field_names() {
        let report = CacheReport {
            semantic: stats(1, 0, 1, "0.00%"),
            strategy: stats(2, 1, 1, "50.00%"),
            semantic_enabled: true,
        };
        let mut out = Vec::new();
        render(&mut out, &report, true).expect("render");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["strategy"]["hit_rate"], "50.00%");
        assert_eq!(value["semantic"]["max_size"], 100);
    }
}
