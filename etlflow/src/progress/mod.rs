//! Append-only progress log.
//!
//! The progress log is the durable audit trail of run and stage lifecycle
//! events. It is shared by every concurrently running stage, so each
//! implementation serializes appends and writes whole lines only.

mod entry;

pub use entry::{LogEntry, LogEventKind};

use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A write-only sink for progress log entries.
pub trait ProgressLog: Send + Sync + Debug {
    /// Appends one entry.
    ///
    /// Never rewrites or truncates earlier entries.
    fn record(&self, entry: &LogEntry) -> io::Result<()>;
}

/// A progress log backed by a text file, one `<timestamp> : <message>` line
/// per entry.
///
/// The file is opened in append mode and kept open for the lifetime of the
/// handle; a mutex guards each append so lines from parallel stages never
/// interleave.
#[derive(Debug)]
pub struct FileProgressLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileProgressLog {
    /// Opens (or creates) the log file for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressLog for FileProgressLog {
    fn record(&self, entry: &LogEntry) -> io::Result<()> {
        let mut line = entry.line();
        line.push('\n');

        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

/// An in-memory progress log, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryProgressLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryProgressLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded entry, in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Returns the entries recorded for one stage.
    #[must_use]
    pub fn entries_for(&self, stage: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.stage.as_deref() == Some(stage))
            .cloned()
            .collect()
    }

    /// Counts a stage's entries of one kind.
    #[must_use]
    pub fn count(&self, stage: &str, kind: LogEventKind) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.stage.as_deref() == Some(stage) && e.kind == kind)
            .count()
    }

    /// Returns the formatted lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries.lock().iter().map(LogEntry::line).collect()
    }
}

impl ProgressLog for MemoryProgressLog {
    fn record(&self, entry: &LogEntry) -> io::Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// A progress log that discards every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressLog;

impl ProgressLog for NoOpProgressLog {
    fn record(&self, _entry: &LogEntry) -> io::Result<()> {
        Ok(())
    }
}
