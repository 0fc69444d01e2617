//! Bounded cross-agent transcript

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Most turns ever retained
pub const MAX_TRANSCRIPT_TURNS: usize = 40;

/// Turns rendered into a prompt by default
pub const DEFAULT_CONTEXT_TURNS: usize = 6;

/// One recorded turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: String,
    pub content: String,
}

/// Ordered log of who said what, capped at a fixed capacity.
///
/// Once full, each append evicts the oldest turn.
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TRANSCRIPT_TURNS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a turn. Blank content is ignored. Returns whether it was kept.
    pub fn append(&mut self, speaker: &str, content: &str) -> bool {
        let content = content.trim();
        if content.is_empty() {
            return false;
        }
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn {
            speaker: speaker.to_string(),
            content: content.to_string(),
        });
        true
    }

    /// The last `limit` turns as `speaker: content` lines, oldest first
    pub fn render(&self, limit: usize) -> String {
        self.recent(limit)
            .map(|turn| format!("{}: {}", turn.speaker, turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Iterator over the last `limit` turns, oldest first
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &ConversationTurn> {
        let skip = self.turns.len().saturating_sub(limit);
        self.turns.iter().skip(skip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.back()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_turns_ignored() {
        let mut transcript = Transcript::new();
        assert!(!transcript.append("User", ""));
        assert!(!transcript.append("User", "  \n\t "));
        assert!(transcript.is_empty());
        assert_eq!(transcript.render(DEFAULT_CONTEXT_TURNS), "");
    }

    #[test]
    fn test_content_trimmed() {
        let mut transcript = Transcript::new();
        transcript.append("User", "  hello \n");
        assert_eq!(transcript.last().unwrap().content, "hello");
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut transcript = Transcript::new();
        for i in 0..100 {
            transcript.append("User", &format!("turn {}", i));
            assert!(transcript.len() <= MAX_TRANSCRIPT_TURNS);
        }
        assert_eq!(transcript.len(), MAX_TRANSCRIPT_TURNS);
        assert_eq!(transcript.iter().next().unwrap().content, "turn 60");
        assert_eq!(transcript.last().unwrap().content, "turn 99");
    }

    #[test]
    fn test_render_most_recent_in_order() {
        let mut transcript = Transcript::new();
        for i in 0..10 {
            transcript.append(if i % 2 == 0 { "User" } else { "Coordinator" }, &format!("m{}", i));
        }
        assert_eq!(
            transcript.render(3),
            "Coordinator: m7\nUser: m8\nCoordinator: m9"
        );
        assert_eq!(transcript.render(DEFAULT_CONTEXT_TURNS).lines().count(), 6);
    }

    #[test]
    fn test_render_limit_larger_than_log() {
        let mut transcript = Transcript::new();
        transcript.append("User", "only");
        assert_eq!(transcript.render(50), "User: only");
        assert_eq!(transcript.render(0), "");
    }
}
