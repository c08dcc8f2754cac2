//! Linear, revertible history of (turn, document snapshot) entries

use crate::types::{ConversationTurn, HistoryEntry};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Document restored by `reset()`
pub const DEFAULT_DOCUMENT: &str = r#"<!DOCTYPE html>
<html lang="en">
	<style>
		#container {
			color: black;
		}
	</style>

	<body id="container">
		<h1>Hello world!</h1>
	</body>

	<script></script>
</html>"#;

/// Document of a freshly seeded session
pub const SEED_DOCUMENT: &str = "<body>\n    <h1>Hello world!</h1>\n</body>";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history index {index} out of range ({len} entries)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Serialized form handed to a persistence collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub base_document: String,
    pub entries: Vec<HistoryEntry>,
    pub current_document: String,
}

/// Owns the committed entries and the current document.
///
/// The current document is always either the last committed snapshot or a
/// value set directly through `set_document`/`reset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHistory {
    base_document: String, // what seed entries without a snapshot resolve to
    entries: Vec<HistoryEntry>,
    current: String,
}

impl Default for DocumentHistory {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENT)
    }
}

impl DocumentHistory {
    /// Empty history over `document`
    pub fn new(document: impl Into<String>) -> Self {
        let document = document.into();
        Self {
            base_document: document.clone(),
            entries: Vec::new(),
            current: document,
        }
    }

    /// History with the two-turn "Hello world!" seed conversation
    pub fn seeded() -> Self {
        Self {
            base_document: String::new(),
            entries: vec![
                HistoryEntry {
                    turn: ConversationTurn::user("Add a title saying 'Hello world!' to the page."),
                    snapshot: None,
                },
                HistoryEntry {
                    turn: ConversationTurn::assistant("Added an h1 tag with the content 'Hello world!'."),
                    snapshot: Some(SEED_DOCUMENT.to_string()),
                },
            ],
            current: SEED_DOCUMENT.to_string(),
        }
    }

    pub fn current_document(&self) -> &str {
        &self.current
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Conversation so far, in commit order
    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.entries.iter().map(|e| e.turn.clone()).collect()
    }

    /// Append an entry. Without a snapshot the current document is recorded
    /// unchanged; with one, it becomes the current document.
    pub fn commit_turn(&mut self, turn: ConversationTurn, snapshot: Option<String>) {
        let snapshot = snapshot.unwrap_or_else(|| self.current.clone());
        debug!(
            "Committing {:?} turn #{} ({} bytes of document)",
            turn.role,
            self.entries.len(),
            snapshot.len()
        );
        self.current = snapshot.clone();
        self.entries.push(HistoryEntry {
            turn,
            snapshot: Some(snapshot),
        });
    }

    /// Keep entries `[0, index]` and restore entry `index`'s document.
    /// Out-of-range indices leave the history untouched.
    pub fn revert_to(&mut self, index: usize) -> Result<(), HistoryError> {
        if index >= self.entries.len() {
            return Err(HistoryError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }

        let document = self.resolve_snapshot(index);
        self.entries.truncate(index + 1);
        self.current = document;
        info!("Reverted history to entry {} ({} entries remain)", index, self.entries.len());
        Ok(())
    }

    /// Drop the whole conversation and restore the default document
    pub fn reset(&mut self) {
        self.reset_to(DEFAULT_DOCUMENT);
    }

    /// Drop the whole conversation and start over from `document`
    pub fn reset_to(&mut self, document: impl Into<String>) {
        *self = Self::new(document);
        info!("History reset");
    }

    /// Hand edit of the current document; creates no entry
    pub fn set_document(&mut self, text: impl Into<String>) {
        self.current = text.into();
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            base_document: self.base_document.clone(),
            entries: self.entries.clone(),
            current_document: self.current.clone(),
        }
    }

    pub fn restore(snapshot: HistorySnapshot) -> Self {
        Self {
            base_document: snapshot.base_document,
            entries: snapshot.entries,
            current: snapshot.current_document,
        }
    }

    /// Nearest snapshot at or before `index`, else the base document
    fn resolve_snapshot(&self, index: usize) -> String {
        self.entries[..=index]
            .iter()
            .rev()
            .find_map(|e| e.snapshot.clone())
            .unwrap_or_else(|| self.base_document.clone())
    }
}
