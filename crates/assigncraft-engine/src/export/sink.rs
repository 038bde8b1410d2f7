use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::ExportError;
use crate::export::ExportBlob;

/// Receives finished artifacts and triggers the user-facing save.
///
/// A sink owns the blob only for the duration of `deliver`; nothing it
/// allocates outlives the call.
pub trait DownloadSink {
    /// Save the blob, returning where it ended up
    fn deliver(&mut self, blob: ExportBlob) -> Result<PathBuf, ExportError>;
}

/// Writes artifacts into a directory, creating it when missing.
///
/// Bytes are staged in a temporary file next to the target and renamed into
/// place, so a failed write never leaves a truncated export behind.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&mut self, blob: ExportBlob) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.dir)?;
        let path = blob.filename.to_path(&self.dir);

        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(&blob.bytes)?;
        staged.persist(&path).map_err(|e| ExportError::Io(e.error))?;
        log::info!(
            "Saved {} ({}, {} bytes)",
            path.display(),
            blob.mime,
            blob.bytes.len()
        );
        Ok(path)
    }
}

/// Keeps delivered artifacts in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub delivered: Vec<ExportBlob>,
}

impl DownloadSink for MemorySink {
    fn deliver(&mut self, blob: ExportBlob) -> Result<PathBuf, ExportError> {
        let path = PathBuf::from(blob.filename.as_str());
        self.delivered.push(blob);
        Ok(path)
    }
}
