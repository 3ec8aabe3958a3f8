use std::collections::HashSet;
use std::path::PathBuf;

use crate::manager::GeneratedFileManager;

/// External lifecycle notifications, reduced to a closed set of variants.
///
/// Whoever composes the manager owns the event source and forwards events
/// here explicitly; there is no global listener registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// A source file was deleted on disk.
    FileDeleted(PathBuf),
    /// A folder (and everything under it) was deleted on disk.
    FolderDeleted(PathBuf),
    /// An editor buffer was closed / its working copy discarded.
    WorkingCopyClosed(PathBuf),
    ProjectCleaned,
    ProjectClosed,
    ProjectDeleted,
}

impl GeneratedFileManager {
    /// Routes an external event to the matching lifecycle operation.
    ///
    /// A deleted parent is treated as a parent that stopped producing
    /// everything: its generated files are pruned exactly as after a build
    /// in which it generated nothing.
    pub fn handle_event(&self, event: ResourceEvent) {
        match event {
            ResourceEvent::FileDeleted(path) => {
                if self.is_tracked_parent(&path) {
                    self.prune_after_build(&path, &HashSet::new());
                }
            }
            ResourceEvent::FolderDeleted(folder) => {
                for parent in self.tracked_build_parents_under(&folder) {
                    self.prune_after_build(&parent, &HashSet::new());
                }
            }
            ResourceEvent::WorkingCopyClosed(path) => {
                self.working_copy_discarded(&path);
            }
            ResourceEvent::ProjectCleaned => self.on_clean(),
            ResourceEvent::ProjectClosed => self.on_closed(),
            ResourceEvent::ProjectDeleted => self.on_deleted(),
        }
    }
}
