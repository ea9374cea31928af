//! Async file writer that only exposes complete files.
//!
//! Bytes go to a temporary file next to the destination, which replaces
//! the destination in one rename on `finish()`. A writer dropped before
//! `finish()` removes its temporary file, so a cancelled or failed export
//! never leaves a half-written CSV behind.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

pub struct AtomicFileWriter {
    temp: NamedTempFile,
    file: File,
    final_path: PathBuf,
    bytes_written: u64,
}

impl AtomicFileWriter {
    /// Creates the temporary file in the destination's directory, creating
    /// that directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the directory or temporary file
    /// cannot be created.
    pub async fn create(final_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let final_path = final_path.as_ref().to_path_buf();
        let parent_dir = match final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        tokio::fs::create_dir_all(&parent_dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create output directory: {}", e)))?;

        let temp = NamedTempFile::new_in(&parent_dir)
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {}", e)))?;
        let std_file = temp
            .reopen()
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {}", e)))?;

        Ok(Self {
            temp,
            file: File::from_std(std_file),
            final_path,
            bytes_written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), AppError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| AppError::Internal(format!("Error writing to file: {}", e)))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes, syncs and renames the temporary file onto the destination.
    /// Returns the number of bytes written.
    pub async fn finish(mut self) -> Result<u64, AppError> {
        self.file
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to flush output file: {}", e)))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to sync output file: {}", e)))?;

        let final_path = self.final_path;
        self.temp.persist(&final_path).map_err(|e| {
            AppError::Internal(format!(
                "Failed to persist file to {}: {}",
                final_path.display(),
                e.error
            ))
        })?;

        Ok(self.bytes_written)
    }
}
