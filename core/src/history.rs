/// Letter history: saved share links, most recent first
///
/// The whole list lives in one named sled slot as a JSON array. Anything
/// unreadable in that slot is treated as an empty history.
use crate::error::{LetterError, Result};
use crate::letter::LetterDocument;
use crate::markup::plain_text;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

const HISTORY_SLOT: &str = "letter_history";
const EXCERPT_CHARS: usize = 50;

/// Frozen snapshot of a shared letter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedLetterEntry {
    pub id: String,
    pub recipient: String,
    pub excerpt: String,
    pub created_at: String, // RFC3339
    pub url: String,
}

impl SavedLetterEntry {
    pub fn new(doc: &LetterDocument, url: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient: doc.to_text.clone(),
            excerpt: excerpt(&doc.text),
            created_at: chrono::Utc::now().to_rfc3339(),
            url: url.to_string(),
        }
    }
}

/// First 50 characters of the letter's text, with an ellipsis when cut.
pub fn excerpt(markup: &str) -> String {
    let text = plain_text(markup);
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

pub struct LetterHistory {
    db: sled::Db,
}

impl LetterHistory {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("history.db"))
            .map_err(|e| LetterError::Storage(format!("history DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Saved entries, newest first. Missing or corrupt data reads as empty.
    pub fn load(&self) -> Vec<SavedLetterEntry> {
        match self.db.get(HISTORY_SLOT) {
            Ok(Some(raw)) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable letter history: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read letter history: {}", e);
                Vec::new()
            }
        }
    }

    fn store(&self, entries: &[SavedLetterEntry]) -> Result<()> {
        let value = serde_json::to_vec(entries).map_err(LetterError::Serialization)?;
        self.db
            .insert(HISTORY_SLOT, value)
            .map_err(|e| LetterError::Storage(format!("save history: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| LetterError::Storage(format!("flush history: {}", e)))?;
        Ok(())
    }

    /// Prepend `entry` and persist.
    pub fn add(&self, entry: SavedLetterEntry) -> Result<Vec<SavedLetterEntry>> {
        let mut entries = self.load();
        debug!("Saving letter {} to history", entry.id);
        entries.insert(0, entry);
        self.store(&entries)?;
        Ok(entries)
    }

    /// Returns whether an entry with `id` existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.load();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.store(&entries)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        self.db
            .remove(HISTORY_SLOT)
            .map_err(|e| LetterError::Storage(format!("clear history: {}", e)))?;
        Ok(())
    }
}

impl Clone for LetterHistory {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn overwrite_slot(history: &LetterHistory, raw: &[u8]) {
        history.db.insert(HISTORY_SLOT, raw).unwrap();
    }

    fn letter(to: &str, text: &str) -> LetterDocument {
        LetterDocument {
            to_text: to.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("<p>Short note</p>"), "Short note");
        let long = format!("<p>{}</p>", "x".repeat(60));
        assert_eq!(excerpt(&long), format!("{}...", "x".repeat(50)));
        assert_eq!(excerpt(&format!("<p>{}</p>", "y".repeat(50))), "y".repeat(50));
    }

    #[test]
    fn test_add_prepends_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let history = LetterHistory::new(temp_dir.path()).unwrap();
        assert!(history.load().is_empty());

        let first = SavedLetterEntry::new(&letter("Alice", "<p>one</p>"), "https://p.example/?letter=1");
        let second = SavedLetterEntry::new(&letter("Bob", "<p>two</p>"), "https://p.example/?letter=2");
        history.add(first.clone()).unwrap();
        history.add(second.clone()).unwrap();

        drop(history);
        let history = LetterHistory::new(temp_dir.path()).unwrap();
        let entries = history.load();
        assert_eq!(entries, vec![second.clone(), first.clone()]);
        assert_eq!(entries[0].recipient, "Bob");
    }

    #[test]
    fn test_remove_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let history = LetterHistory::new(temp_dir.path()).unwrap();
        let a = SavedLetterEntry::new(&letter("A", "a"), "u1");
        let b = SavedLetterEntry::new(&letter("B", "b"), "u2");
        history.add(a.clone()).unwrap();
        history.add(b.clone()).unwrap();

        assert!(history.remove(&a.id).unwrap());
        assert!(!history.remove(&a.id).unwrap());
        assert_eq!(history.load(), vec![b]);
    }

    #[test]
    fn test_corrupt_history_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let history = LetterHistory::new(temp_dir.path()).unwrap();
        overwrite_slot(&history, b"{not json");
        assert!(history.load().is_empty());

        // and recovers on the next save
        history.add(SavedLetterEntry::new(&letter("C", "c"), "u")).unwrap();
        assert_eq!(history.load().len(), 1);

        history.clear().unwrap();
        assert!(history.load().is_empty());
    }
}
