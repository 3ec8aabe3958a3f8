use std::path::Path;
use std::sync::Arc;

use arbor_core::TypeName;
use arbor_vfs::{BufferProvider, WorkingCopy};

/// Thin wrapper around acquiring/updating/discarding an editable buffer.
///
/// Intentionally simple: it exists to centralize the exactly-once
/// acquire/release discipline and the logging of acquisition failures. The
/// lifecycle manager's registries are the sole owner of outstanding handles.
#[derive(Clone)]
pub struct WorkingCopyHelper {
    buffers: Arc<dyn BufferProvider>,
}

impl WorkingCopyHelper {
    pub fn new(buffers: Arc<dyn BufferProvider>) -> Self {
        Self { buffers }
    }

    /// Acquires a working copy for `type_name` under `root`.
    ///
    /// `None` on failure; the failure is logged, never propagated.
    pub fn acquire(
        &self,
        root: &Path,
        type_name: &TypeName,
        initial_text: &str,
    ) -> Option<WorkingCopy> {
        let path = root.join(type_name.relative_source_path());
        self.acquire_path(&path, initial_text)
    }

    pub fn acquire_path(&self, path: &Path, initial_text: &str) -> Option<WorkingCopy> {
        let wc = self.buffers.acquire(path, initial_text);
        if wc.is_none() {
            tracing::warn!(
                target = "arbor.gen",
                path = %path.display(),
                "failed to acquire working copy"
            );
        }
        wc
    }

    /// Replaces the buffer content; returns `true` iff it changed.
    pub fn set_contents(&self, wc: &WorkingCopy, text: &str) -> bool {
        self.buffers.set_contents(wc, text)
    }

    /// Releases a handle. Every acquire is matched by exactly one release.
    pub fn release(&self, wc: WorkingCopy) {
        self.buffers.discard(wc);
    }
}
