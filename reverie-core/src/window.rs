//! Conversation window — the bounded short-term transcript.
//!
//! Keeps the last N player+narrator exchanges for the generation service,
//! independent of the unbounded long-term index.  Eviction discards
//! transcript turns only; narrations are persisted to the index by the
//! context manager before they ever reach the window, so short-term
//! "forgetting" never implies data loss.

use std::collections::VecDeque;

use tracing::debug;

use crate::types::{ConversationTurn, Speaker};

/// Bounded in-memory transcript of recent exchanges.
///
/// Owned by exactly one game session; never shared across sessions.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    turns: VecDeque<ConversationTurn>,
    max_rounds: usize,
}

impl ConversationWindow {
    /// Create a window retaining at most `max_rounds` exchanges
    /// (one exchange = one player turn plus one narrator turn).
    ///
    /// A bound of 0 is clamped to 1: a window that can hold nothing
    /// would starve the generation service of the current exchange.
    #[must_use]
    pub fn new(max_rounds: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_rounds: max_rounds.max(1),
        }
    }

    /// Append one completed exchange, then prune from the front until the
    /// retained count is within the bound.
    pub fn record_exchange(
        &mut self,
        player_text: impl Into<String>,
        narrator_text: impl Into<String>,
        turn: u64,
    ) {
        self.turns.push_back(ConversationTurn {
            speaker: Speaker::Player,
            text: player_text.into(),
            turn,
        });
        self.turns.push_back(ConversationTurn {
            speaker: Speaker::Narrator,
            text: narrator_text.into(),
            turn,
        });

        let bound = self.max_rounds * 2;
        let evicted = self.turns.len().saturating_sub(bound);
        while self.turns.len() > bound {
            self.turns.pop_front();
        }
        if evicted > 0 {
            debug!(evicted, retained = self.turns.len(), "Pruned conversation window");
        }
    }

    /// The retained turns, oldest first.
    #[must_use]
    pub fn transcript(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Number of retained turns (2 per retained exchange).
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no exchange has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The configured maximum number of retained exchanges.
    #[must_use]
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }
}

impl Default for ConversationWindow {
    /// Default bound: the single most recent exchange.
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_only_the_most_recent_exchange_with_bound_one() {
        let mut window = ConversationWindow::new(1);
        window.record_exchange("hello?", "a voice answers", 1);
        window.record_exchange("who is there?", "the mill keeper", 2);
        window.record_exchange("open the door", "the door creaks open", 3);

        assert_eq!(window.len(), 2);
        let turns: Vec<_> = window.transcript().collect();
        assert_eq!(turns[0].speaker, Speaker::Player);
        assert_eq!(turns[0].text, "open the door");
        assert_eq!(turns[1].speaker, Speaker::Narrator);
        assert_eq!(turns[1].text, "the door creaks open");
        assert_eq!(turns[1].turn, 3);
    }

    #[test]
    fn wider_bound_keeps_older_exchanges() {
        let mut window = ConversationWindow::new(2);
        window.record_exchange("one", "reply one", 1);
        window.record_exchange("two", "reply two", 2);
        window.record_exchange("three", "reply three", 3);

        assert_eq!(window.len(), 4);
        let first = window.transcript().next().expect("turn");
        assert_eq!(first.text, "two");
    }

    #[test]
    fn zero_bound_is_clamped_to_one() {
        let mut window = ConversationWindow::new(0);
        window.record_exchange("ping", "pong", 1);
        assert_eq!(window.max_rounds(), 1);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn empty_window_reports_empty() {
        let window = ConversationWindow::default();
        assert!(window.is_empty());
        assert_eq!(window.transcript().count(), 0);
    }
}
