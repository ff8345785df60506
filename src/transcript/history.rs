//! Chat transcript persistence.
//!
//! Epistemic foundation:
//! - K_i: Entries are only ever appended, never edited
//! - K_i: State is persisted to disk atomically (write-then-rename)
//! - B_i: Transcript file may not exist yet → empty transcript
//! - I^B: Crash during write → previous file survives untouched

use crate::models::{Answer, Result, SheetwiseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One question and the answer shown for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub user: String,
    pub assistant: String,
    pub asked_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            asked_at: Utc::now(),
        }
    }
}

impl From<&Answer> for TranscriptEntry {
    fn from(answer: &Answer) -> Self {
        Self::new(answer.query.clone(), answer.response.display_text.clone())
    }
}

/// Session-scoped, append-only transcript backed by a JSON file.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Load the transcript at `path`, or start an empty one.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let file = File::open(path).map_err(|e| SheetwiseError::io("opening transcript", e))?;
            serde_json::from_reader(BufReader::new(file))
                .map_err(|e| SheetwiseError::ParseError(format!("Invalid transcript: {e}")))?
        } else {
            Vec::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "Transcript opened");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry and persist.
    ///
    /// K_i: on a failed save the entry is dropped, memory matches disk.
    pub fn append(&mut self, entry: TranscriptEntry) -> Result<()> {
        self.entries.push(entry);
        if let Err(e) = self.save() {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Drop every entry and persist.
    pub fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.entries);
        if let Err(e) = self.save() {
            self.entries = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Rewrite the whole file atomically.
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SheetwiseError::io("creating transcript dir", e))?;
        }

        let temp_path = self.path.with_extension("tmp.json");
        let file = File::create(&temp_path)
            .map_err(|e| SheetwiseError::io("creating temp transcript", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.entries)
            .map_err(|e| SheetwiseError::Internal(format!("Serializing transcript: {e}")))?;
        writer
            .flush()
            .map_err(|e| SheetwiseError::io("writing temp transcript", e))?;

        fs::rename(&temp_path, &self.path)
            .map_err(|e| SheetwiseError::io("renaming transcript", e))?;

        debug!(entries = self.entries.len(), "Transcript saved");
        Ok(())
    }
}
