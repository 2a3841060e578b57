//! Interactive session

use super::{ask, stats};
use agenda_core::{ConversationContext, QueryOrchestrator};
use anyhow::Result;
use colored::Colorize;
use std::io::{self, BufRead, Write};
use tracing::warn;

/// One line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput<'a> {
    /// Blank line.
    Empty,
    /// Leave the session.
    Quit,
    /// Forget the conversation so far.
    Reset,
    /// Print cache statistics.
    Stats,
    /// A question for the assistant.
    Query(&'a str),
}

impl<'a> ChatInput<'a> {
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Self::Empty,
            "salir" | "exit" | "quit" => Self::Quit,
            "reset" | "limpiar" => Self::Reset,
            "stats" | "estadisticas" | "estadísticas" => Self::Stats,
            _ => Self::Query(trimmed),
        }
    }
}

/// Run the session on stdin and stdout, then persist the caches.
///
/// # Errors
///
/// Returns an error if terminal IO fails.
pub async fn execute(orchestrator: &QueryOrchestrator, max_history: usize) -> Result<()> {
    let mut context = ConversationContext::new(max_history);
    let stdin = io::stdin();
    session(orchestrator, &mut context, stdin.lock(), io::stdout()).await?;

    if !orchestrator.flush().await {
        warn!("could not save caches");
    }
    Ok(())
}

/// Read questions from `reader` until EOF or a quit command.
pub(crate) async fn session<R, W>(
    orchestrator: &QueryOrchestrator,
    context: &mut ConversationContext,
    mut reader: R,
    mut writer: W,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    writeln!(
        writer,
        "{}",
        "Asistente de agenda. Escribe 'salir' para terminar, 'limpiar' para olvidar la conversación.".cyan()
    )?;

    let mut line = String::new();
    loop {
        write!(writer, "{} ", ">".bold())?;
        writer.flush()?;

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            writeln!(writer)?;
            break;
        }

        match ChatInput::parse(&line) {
            ChatInput::Empty => {},
            ChatInput::Quit => break,
            ChatInput::Reset => {
                context.reset();
                writeln!(writer, "{}", "Conversación reiniciada.".dimmed())?;
            },
            ChatInput::Stats => {
                stats::render(&mut writer, &orchestrator.cache_stats().await, false)?;
            },
            ChatInput::Query(question) => {
                let outcome = orchestrator.ask(question, context).await;
                ask::render(&mut writer, &outcome, false)?;
            },
        }
    }
    Ok(())
}
