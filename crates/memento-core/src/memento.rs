//! Single-slot durable note store

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{AgentError, Result};

/// Durable storage for the agent's one note
pub trait NoteStore: Send + Sync {
    /// Current note, or the empty string when none has been written yet
    fn read(&self) -> Result<String>;

    /// Atomically replace the note
    fn write(&self, text: &str) -> Result<()>;
}

/// File-backed note store
///
/// Nothing is cached: every `read` goes to disk. Writes land in a temp file
/// next to the target and are renamed over it, so a reader never sees a
/// partially written note.
#[derive(Debug, Clone)]
pub struct Memento {
    path: PathBuf,
}

impl Memento {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the parent directory and return the store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let memento = Self::new(path);
        if let Some(parent) = memento.parent_dir() {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::storage(parent, e))?;
        }
        Ok(memento)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}

impl NoteStore for Memento {
    fn read(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AgentError::storage(&self.path, e)),
        }
    }

    fn write(&self, text: &str) -> Result<()> {
        let dir = self.parent_dir().unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AgentError::storage(dir, e))?;
        tmp.write_all(text.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| AgentError::storage(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| AgentError::storage(&self.path, e.error))?;

        debug!(path = %self.path.display(), bytes = text.len(), "Note persisted");
        Ok(())
    }
}
