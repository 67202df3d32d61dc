//! Destinations for a fetched tool payload.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::PersistenceError;

/// Receives the text payload of a successful tool call.
pub trait PayloadSink {
    /// Stores `payload`.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the payload cannot be stored.
    fn deliver(&mut self, payload: &str) -> Result<(), PersistenceError>;
}

/// Overwrites a file with the payload.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Creates a sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PayloadSink for FileSink {
    fn deliver(&mut self, payload: &str) -> Result<(), PersistenceError> {
        info!(path = %self.path.display(), "Saving documentation");

        std::fs::write(&self.path, payload).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })?;

        info!(
            path = %self.path.display(),
            characters = payload.chars().count(),
            "Documentation saved successfully"
        );
        Ok(())
    }
}

/// Prints the payload to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl PayloadSink for StdoutSink {
    fn deliver(&mut self, payload: &str) -> Result<(), PersistenceError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{payload}").map_err(PersistenceError::Stdout)?;
        stdout.flush().map_err(PersistenceError::Stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_overwrites_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ModelContextProtocol.md");
        std::fs::write(&path, "stale content that is longer").unwrap();

        let mut sink = FileSink::new(&path);
        sink.deliver("# Doc").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Doc");
        assert_eq!(sink.path(), path.as_path());
    }

    #[test]
    fn file_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("doc.md");

        let err = FileSink::new(&path).deliver("# Doc").unwrap_err();
        assert!(matches!(err, PersistenceError::Write { .. }));
        assert!(err.to_string().contains("doc.md"));
    }
}
