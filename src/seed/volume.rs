//! Reference-counted registry of open storage volumes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::download::DownloadError;

/// Tracks how many users hold each storage volume open.
///
/// A volume is opened on its first acquire and forgotten when the last
/// holder releases it. One registry is shared per process.
#[derive(Debug, Default)]
pub struct VolumeRegistry {
    open: Mutex<HashMap<PathBuf, usize>>,
}

impl VolumeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reference to the volume rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `Io` when the first acquire finds `root` missing or not a directory.
    pub fn acquire(&self, root: &Path) -> Result<(), DownloadError> {
        let mut open = self.lock();
        if let Some(count) = open.get_mut(root) {
            *count += 1;
            return Ok(());
        }

        let metadata = std::fs::metadata(root).map_err(|e| DownloadError::io(root, e))?;
        if !metadata.is_dir() {
            return Err(DownloadError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "volume root is not a directory"),
            ));
        }
        debug!(root = %root.display(), "volume opened");
        open.insert(root.to_path_buf(), 1);
        Ok(())
    }

    /// Drops a reference, closing the volume when it was the last.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `root` is not open.
    pub fn release(&self, root: &Path) -> Result<(), DownloadError> {
        let mut open = self.lock();
        let Some(count) = open.get_mut(root) else {
            return Err(DownloadError::invalid_argument(format!(
                "volume {} is not open",
                root.display()
            )));
        };
        *count -= 1;
        if *count == 0 {
            open.remove(root);
            debug!(root = %root.display(), "volume closed");
        }
        Ok(())
    }

    /// Acquires `root` and returns a guard that releases it on drop.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`acquire`](Self::acquire).
    pub fn guard(&self, root: &Path) -> Result<VolumeGuard<'_>, DownloadError> {
        self.acquire(root)?;
        Ok(VolumeGuard {
            registry: self,
            root: root.to_path_buf(),
        })
    }

    /// Current reference count of `root` (0 when not open).
    #[must_use]
    pub fn open_count(&self, root: &Path) -> usize {
        self.lock().get(root).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, usize>> {
        // Counts stay consistent across a panicking holder; keep using them.
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds one reference to a volume for its lifetime.
#[derive(Debug)]
pub struct VolumeGuard<'a> {
    registry: &'a VolumeRegistry,
    root: PathBuf,
}

impl VolumeGuard<'_> {
    /// Root of the held volume.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for VolumeGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.registry.release(&self.root) {
            debug!(error = %error, "volume already released");
        }
    }
}
