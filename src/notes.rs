//! Trip notes - condensed specialist contributions

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::role::AgentRole;

/// Most notes retained
pub const MAX_TRIP_NOTES: usize = 12;

/// Longest note body, in characters
pub const MAX_NOTE_CHARS: usize = 200;

/// Delimiter used when notes are joined into one summary line
pub const NOTE_DELIMITER: &str = " | ";

/// A short record of what a specialist said
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripNote {
    pub label: String,
    /// Whitespace-collapsed body, at most [`MAX_NOTE_CHARS`] characters
    pub text: String,
}

impl fmt::Display for TripNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.text)
    }
}

/// Rolling window of trip notes
#[derive(Debug, Clone, Default)]
pub struct TripNotes {
    notes: VecDeque<TripNote>,
}

impl TripNotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a note from `text` unless it came from the coordinator or is blank
    pub fn capture(&mut self, role: AgentRole, text: &str) -> Option<&TripNote> {
        if role.is_coordinator() {
            return None;
        }
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }
        let body: String = collapsed.chars().take(MAX_NOTE_CHARS).collect();

        if self.notes.len() == MAX_TRIP_NOTES {
            self.notes.pop_front();
        }
        self.notes.push_back(TripNote {
            label: role.display_label().to_string(),
            text: body,
        });
        self.notes.back()
    }

    /// All notes joined for the policy check, or `None` if there are none yet
    pub fn summary(&self) -> Option<String> {
        if self.notes.is_empty() {
            return None;
        }
        Some(
            self.notes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(NOTE_DELIMITER),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &TripNote> {
        self.notes.iter()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Point-in-time copy handed to background readers
    pub fn snapshot(&self) -> Vec<TripNote> {
        self.notes.iter().cloned().collect()
    }
}
