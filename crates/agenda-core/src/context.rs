//! Rolling conversation history used to resolve follow-up questions.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of turns kept.
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// What the user asked.
    pub question: String,
    /// What the assistant answered.
    pub answer: String,
}

/// Last `max_turns` question/answer pairs, oldest first.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationContext {
    /// Empty context holding at most `max_turns` turns.
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Append a turn, dropping the oldest once full.
    pub fn record(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        if self.max_turns == 0 {
            return;
        }
        while self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// Turns oldest first.
    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Most recent turn.
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    /// Number of turns held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_most_recent_turns() {
        let mut context = ConversationContext::default();
        for i in 0..12 {
            context.record(format!("pregunta {i}"), format!("respuesta {i}"));
        }

        assert_eq!(context.len(), 10);
        assert_eq!(context.turns()[0].question, "pregunta 2");
        assert_eq!(context.last().map(|t| t.answer.as_str()), Some("respuesta 11"));
    }

    #[test]
    fn reset_clears_history() {
        let mut context = ConversationContext::new(3);
        context.record("¿teléfono de Luis?", "618 123 4567");
        context.reset();
        assert!(context.is_empty());
        assert!(context.last().is_none());
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut context = ConversationContext::new(0);
        context.record("a", "b");
        assert!(context.is_empty());
    }
}
