//! Filesystem bootstrapper
//!
//! Idempotently ensures a storage target file and its ancestor directories
//! exist before first use. Creation uses create-if-absent primitives that
//! treat "already exists" as success, so a concurrent creator between probe
//! and creation cannot surface a spurious failure. Results are memoized per
//! instance to avoid repeated existence probes on every read/write.

use crate::error::StorageError;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub struct FsBootstrapper {
    target: PathBuf,
    directory_ready: AtomicBool,
    file_ready: AtomicBool,
}

impl FsBootstrapper {
    pub fn new<P: Into<PathBuf>>(target: P) -> Self {
        Self {
            target: target.into(),
            directory_ready: AtomicBool::new(false),
            file_ready: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Ensure every ancestor directory of the target exists.
    pub fn ensure_directory(&self) -> Result<(), StorageError> {
        if self.directory_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let parent = match self.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => {
                self.directory_ready.store(true, Ordering::Release);
                return Ok(());
            }
        };

        match fs::create_dir_all(parent) {
            Ok(()) => {
                debug!(directory = %parent.display(), "storage directory ready");
                self.directory_ready.store(true, Ordering::Release);
                Ok(())
            }
            // A concurrent creator may have won the race; re-check before
            // surfacing the failure.
            Err(err) if parent.is_dir() => {
                debug!(
                    directory = %parent.display(),
                    error = %err,
                    "directory appeared concurrently"
                );
                self.directory_ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => Err(StorageError::Bootstrap(format!(
                "failed to create directory {}: {}",
                parent.display(),
                err
            ))),
        }
    }

    /// Ensure the target file exists, creating it empty if absent.
    pub fn ensure_file(&self) -> Result<(), StorageError> {
        if self.file_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.target)
        {
            Ok(_) => {
                debug!(file = %self.target.display(), "created empty storage file");
                self.file_ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                self.file_ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => Err(StorageError::Bootstrap(format!(
                "failed to create file {}: {}",
                self.target.display(),
                err
            ))),
        }
    }

    /// Ensure the directory chain, then the file.
    pub fn ensure_target(&self) -> Result<(), StorageError> {
        self.ensure_directory()?;
        self.ensure_file()
    }
}
