use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::document::Document;
use crate::fs::SourceTree;

/// Handle to an acquired in-memory buffer.
///
/// Deliberately not `Clone`: every acquire is matched by exactly one
/// [`BufferProvider::discard`], and ownership of the handle is how the
/// pairing is enforced.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
}

impl WorkingCopy {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Provider of editable in-memory buffers.
///
/// An acquired buffer is independent of on-disk state until explicitly
/// committed. Implementations refcount by path: acquiring an already-open
/// path returns a second handle onto the same content.
pub trait BufferProvider: Send + Sync {
    /// Acquires a buffer for `path`, seeding it with `initial_text` when it
    /// was not already open. `None` on failure (logged by the implementation).
    fn acquire(&self, path: &Path, initial_text: &str) -> Option<WorkingCopy>;

    /// Replaces the buffer content. Returns `true` iff the content changed.
    fn set_contents(&self, wc: &WorkingCopy, text: &str) -> bool;

    fn text_of(&self, path: &Path) -> Option<String>;

    fn is_open(&self, path: &Path) -> bool;

    /// Writes the buffer content to disk through `tree`.
    fn commit_to_disk(&self, wc: &WorkingCopy, tree: &dyn SourceTree) -> io::Result<()>;

    /// Releases one handle; the buffer is dropped when the last handle goes.
    fn discard(&self, wc: WorkingCopy);
}

#[derive(Debug)]
struct BufferEntry {
    doc: Document,
    refs: usize,
}

/// In-memory [`BufferProvider`] used by tests and headless embedding.
#[derive(Debug, Default)]
pub struct InMemoryBuffers {
    inner: Mutex<HashMap<PathBuf, BufferEntry>>,
}

impl InMemoryBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open buffers.
    pub fn open_count(&self) -> usize {
        self.lock_inner().len()
    }

    #[track_caller]
    fn lock_inner(&self) -> MutexGuard<'_, HashMap<PathBuf, BufferEntry>> {
        match self.inner.lock() {
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

impl BufferProvider for InMemoryBuffers {
    fn acquire(&self, path: &Path, initial_text: &str) -> Option<WorkingCopy> {
        let mut inner = self.lock_inner();
        let entry = inner
            .entry(path.to_path_buf())
            .or_insert_with(|| BufferEntry {
                doc: Document::new(initial_text),
                refs: 0,
            });
        entry.refs += 1;
        Some(WorkingCopy::new(path.to_path_buf()))
    }

    fn set_contents(&self, wc: &WorkingCopy, text: &str) -> bool {
        let mut inner = self.lock_inner();
        match inner.get_mut(wc.path()) {
            Some(entry) => entry.doc.set_text(text),
            None => {
                tracing::error!(
                    target = "arbor.vfs",
                    path = %wc.path().display(),
                    "set_contents on a buffer that is not open"
                );
                false
            }
        }
    }

    fn text_of(&self, path: &Path) -> Option<String> {
        let inner = self.lock_inner();
        inner.get(path).map(|entry| entry.doc.text().to_owned())
    }

    fn is_open(&self, path: &Path) -> bool {
        self.lock_inner().contains_key(path)
    }

    fn commit_to_disk(&self, wc: &WorkingCopy, tree: &dyn SourceTree) -> io::Result<()> {
        let text = {
            let inner = self.lock_inner();
            match inner.get(wc.path()) {
                Some(entry) => entry.doc.text_arc(),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("buffer not open: {}", wc.path().display()),
                    ))
                }
            }
        };
        tree.write_file(wc.path(), text.as_bytes())
    }

    fn discard(&self, wc: WorkingCopy) {
        let mut inner = self.lock_inner();
        match inner.get_mut(wc.path()) {
            Some(entry) if entry.refs > 1 => entry.refs -= 1,
            Some(_) => {
                inner.remove(wc.path());
            }
            None => {
                tracing::error!(
                    target = "arbor.vfs",
                    path = %wc.path().display(),
                    "discard of a buffer that is not open"
                );
            }
        }
    }
}
