use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// File-tree abstraction for the generated-source engine.
///
/// The trait is intentionally small so it can be implemented for different
/// backends (local FS, test fixtures, workspace adapters).
pub trait SourceTree: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Creates a single directory; the parent must exist.
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    fn delete_file(&self, path: &Path) -> io::Result<()>;

    /// Deletes an empty directory.
    fn delete_dir(&self, path: &Path) -> io::Result<()>;

    fn is_dir_empty(&self, path: &Path) -> io::Result<bool>;

    /// Marks a file or folder as machine-generated output.
    fn mark_derived(&self, path: &Path);

    fn is_derived(&self, path: &Path) -> bool;
}

/// Local OS file system implementation.
///
/// The local filesystem has no "derived" attribute, so derived markers are
/// session metadata held in memory.
#[derive(Debug, Default)]
pub struct LocalTree {
    derived: Mutex<HashSet<PathBuf>>,
}

impl LocalTree {
    pub fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    fn lock_derived(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        match self.derived.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "arbor.vfs",
                    file = loc.file(),
                    line = loc.line(),
                    error = %err,
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

impl SourceTree for LocalTree {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn delete_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)?;
        self.lock_derived().remove(path);
        Ok(())
    }

    fn is_dir_empty(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::read_dir(path)?.next().is_none())
    }

    fn mark_derived(&self, path: &Path) {
        self.lock_derived().insert(path.to_path_buf());
    }

    fn is_derived(&self, path: &Path) -> bool {
        self.lock_derived().contains(path)
    }
}
