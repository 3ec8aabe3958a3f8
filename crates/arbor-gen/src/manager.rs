use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arbor_config::ArborConfig;
use arbor_core::TypeName;
use arbor_deps::{write_state_file, BidiMultiMap, FileFlag, PersistedDependencyMap};
use arbor_vfs::{BufferProvider, SourceTree, WorkingCopy};

use crate::integrity;
use crate::problem::{Problem, ProblemSink};
use crate::working_copy::WorkingCopyHelper;

/// Hard cap on nested reconcile passes triggered by edits to generated
/// buffers. A processor whose output keeps triggering itself would otherwise
/// loop forever.
const MAX_REANALYSIS_STEPS: usize = 10_000;

/// What a build-time generation call produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenTarget {
    /// A compilable Java type; resolves to `<root>/com/example/Foo.java`.
    Type(TypeName),
    /// An opaque resource (text/XML/...), addressed relative to the
    /// generated-source root.
    Resource(PathBuf),
}

impl GenTarget {
    fn relative_path(&self) -> PathBuf {
        match self {
            GenTarget::Type(name) => name.relative_source_path(),
            GenTarget::Resource(rel) => rel.clone(),
        }
    }

    fn flags(&self) -> &'static [FileFlag] {
        match self {
            GenTarget::Type(_) => &[],
            GenTarget::Resource(_) => &[FileFlag::NonSource],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildGenerated {
    pub path: PathBuf,
    /// Whether the on-disk content actually changed.
    pub modified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileGenerated {
    pub path: PathBuf,
    /// Whether the in-memory content actually changed.
    pub modified: bool,
}

/// Receives buffers that need a nested reconcile pass because their
/// generated content changed in memory. The driver re-enters
/// [`GeneratedFileManager::generate_during_reconcile`] from here; the
/// manager drains such requests as a work list, never via recursion.
pub trait ReanalysisSink: Send + Sync {
    fn reanalyze(&self, path: &Path);
}

/// External collaborators wired in by whoever composes the manager.
/// No static/global registration; subscription lifetime is the manager's.
pub struct Collaborators {
    pub tree: Arc<dyn SourceTree>,
    pub buffers: Arc<dyn BufferProvider>,
    pub problems: Arc<dyn ProblemSink>,
    pub reanalysis: Option<Arc<dyn ReanalysisSink>>,
}

pub(crate) struct ManagerState {
    /// Persisted parent → generated edges from on-disk builds.
    pub(crate) build_deps: PersistedDependencyMap,
    /// Transient parent → generated edges from in-memory reconciles.
    pub(crate) reconcile_deps: BidiMultiMap<PathBuf, PathBuf>,
    /// (parent, child) pairs present in the build graph but *not*
    /// regenerated by that parent's most recent reconcile: the child is
    /// logically absent during reconcile even though it exists on disk.
    pub(crate) non_deps: BidiMultiMap<PathBuf, PathBuf>,
    /// Working copies currently holding real generated content.
    pub(crate) visible: HashMap<PathBuf, WorkingCopy>,
    /// Working copies forced blank to mask on-disk content.
    pub(crate) hidden: HashMap<PathBuf, WorkingCopy>,
    /// Build-generated files whose processors opted into "regenerate during
    /// reconcile or mask me".
    pub(crate) clear_during_reconcile: HashSet<PathBuf>,
    /// Set when the generated-source root is misconfigured; cleared at the
    /// start of the next build.
    pub(crate) generation_disabled: bool,
}

/// Coordinates which files were generated by which parents, across on-disk
/// builds and in-memory reconciles. One instance per generated-source root
/// (main and test scopes get separate instances and state files).
///
/// Locking: a single mutex guards all graph/registry bookkeeping. The lock
/// is never held across disk I/O or buffer content mutation; operations are
/// sequenced compute-under-lock → unlock → I/O → re-lock for follow-up
/// bookkeeping.
pub struct GeneratedFileManager {
    project_root: PathBuf,
    generated_root: PathBuf,
    state_path: PathBuf,
    enabled: bool,
    recursive_reconcile: bool,
    integrity_checks: bool,
    tree: Arc<dyn SourceTree>,
    helper: WorkingCopyHelper,
    buffers: Arc<dyn BufferProvider>,
    problems: Arc<dyn ProblemSink>,
    reanalysis: Option<Arc<dyn ReanalysisSink>>,
    state: Mutex<ManagerState>,
    pending_reanalysis: Mutex<VecDeque<PathBuf>>,
    draining: AtomicBool,
}

impl GeneratedFileManager {
    pub fn new(
        project_root: &Path,
        generated_root: &Path,
        state_path: &Path,
        config: &ArborConfig,
        collab: Collaborators,
    ) -> Self {
        let build_deps = PersistedDependencyMap::load(project_root, state_path);
        Self {
            project_root: project_root.to_path_buf(),
            generated_root: generated_root.to_path_buf(),
            state_path: state_path.to_path_buf(),
            enabled: config.generation.enabled,
            recursive_reconcile: config.generation.recursive_reconcile,
            integrity_checks: config.integrity_checks,
            tree: collab.tree,
            helper: WorkingCopyHelper::new(Arc::clone(&collab.buffers)),
            buffers: collab.buffers,
            problems: collab.problems,
            reanalysis: collab.reanalysis,
            state: Mutex::new(ManagerState {
                build_deps,
                reconcile_deps: BidiMultiMap::new(),
                non_deps: BidiMultiMap::new(),
                visible: HashMap::new(),
                hidden: HashMap::new(),
                clear_during_reconcile: HashSet::new(),
                generation_disabled: false,
            }),
            pending_reanalysis: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn generated_root(&self) -> &Path {
        &self.generated_root
    }

    /// Resolves a type name to its target path under the generated root.
    pub fn path_for_type(&self, type_name: &TypeName) -> PathBuf {
        self.generated_root.join(type_name.relative_source_path())
    }

    // --- build-time lifecycle -------------------------------------------

    /// Called by the build driver at the start of a build round. A prior
    /// misconfiguration only disables generation for the rest of *that*
    /// build.
    pub fn begin_build(&self) {
        self.lock_state().generation_disabled = false;
    }

    /// Registers a file generated during an on-disk build and writes it.
    ///
    /// Returns `None` when generation is disabled or when this file's own
    /// I/O failed (logged); the rest of the build round proceeds either way.
    pub fn generate_during_build(
        &self,
        parents: &[PathBuf],
        target: &GenTarget,
        contents: &[u8],
        clear_during_reconcile: bool,
    ) -> Option<BuildGenerated> {
        if !self.enabled {
            return None;
        }
        if self.lock_state().generation_disabled {
            return None;
        }

        if let Err(err) = self.ensure_generated_root() {
            // Misconfigured output location: report once, disable for the
            // remainder of this build.
            self.lock_state().generation_disabled = true;
            self.problems.report(Problem::error(
                format!(
                    "generated-source root {} is unusable: {err}",
                    self.generated_root.display()
                ),
                Some(self.generated_root.clone()),
            ));
            tracing::error!(
                target = "arbor.gen",
                root = %self.generated_root.display(),
                error = %err,
                "generation disabled for this build"
            );
            return None;
        }

        let path = self.generated_root.join(target.relative_path());

        let existing = match self.tree.read_bytes(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(
                    target = "arbor.gen",
                    path = %path.display(),
                    error = %err,
                    "cannot read existing generated file; skipping"
                );
                return None;
            }
        };
        let modified = existing.as_deref() != Some(contents);

        if modified {
            if let Err(err) = self.write_generated_bytes(&path, contents) {
                tracing::warn!(
                    target = "arbor.gen",
                    path = %path.display(),
                    error = %err,
                    "failed to write generated file; skipping"
                );
                return None;
            }
        }
        self.tree.mark_derived(&path);

        {
            let mut state = self.lock_state();
            for parent in parents {
                state.build_deps.put(parent, &path, target.flags());
            }
            if clear_during_reconcile {
                state.clear_during_reconcile.insert(path.clone());
            }
        }
        self.maybe_check_integrity("generate_during_build");

        Some(BuildGenerated { path, modified })
    }

    /// Prunes files that `parent` generated in an earlier build but no
    /// longer does. Fully obsolete files (no remaining parent) are deleted
    /// from disk, their empty derived ancestor folders removed, and the
    /// deleted *source* files returned so the compiler driver can drop them.
    ///
    /// Idempotent: a second call with the same `newly_generated` set finds
    /// nothing left to prune.
    pub fn prune_after_build(
        &self,
        parent: &Path,
        newly_generated: &HashSet<PathBuf>,
    ) -> Vec<PathBuf> {
        struct Doomed {
            path: PathBuf,
            is_source: bool,
            hidden_wc: Option<WorkingCopy>,
        }

        let mut doomed = Vec::new();
        {
            let mut state = self.lock_state();
            let obsolete: Vec<PathBuf> = state
                .build_deps
                .children_of(parent)
                .into_iter()
                .filter(|child| !newly_generated.contains(child))
                .collect();

            for child in obsolete {
                let is_source = state.build_deps.is_source(&child);
                state.build_deps.remove(parent, &child);
                // This parent no longer produces the child, so its masking
                // opinion about it is void as well.
                state.non_deps.remove(&parent.to_path_buf(), &child);
                if state.build_deps.contains_child(&child) {
                    // Multiply-parented; survives until the last parent
                    // stops producing it.
                    continue;
                }
                state.clear_during_reconcile.remove(&child);
                state.non_deps.remove_value(&child);
                let hidden_wc = state.hidden.remove(&child);
                doomed.push(Doomed {
                    path: child,
                    is_source,
                    hidden_wc,
                });
            }
        }

        let mut deleted_sources = Vec::new();
        for entry in doomed {
            let deleted = match self.tree.delete_file(&entry.path) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        target = "arbor.gen",
                        path = %entry.path.display(),
                        error = %err,
                        "failed to delete obsolete generated file"
                    );
                    false
                }
            };
            if deleted {
                self.delete_empty_derived_ancestors(&entry.path);
                if entry.is_source {
                    deleted_sources.push(entry.path.clone());
                }
            } else if entry.hidden_wc.is_some() {
                // The edges are already gone, so the file will not be
                // re-masked; the stale on-disk content is visible until the
                // next successful build prune.
                tracing::warn!(
                    target = "arbor.gen",
                    path = %entry.path.display(),
                    "undeletable generated file is no longer masked; stale content is exposed"
                );
            }
            // Release only after the physical delete so the masked type
            // never becomes momentarily visible to a concurrent reconcile.
            if let Some(wc) = entry.hidden_wc {
                self.helper.release(wc);
            }
        }

        self.maybe_check_integrity("prune_after_build");
        deleted_sources
    }

    /// Persists the build dependency graph if it changed. Called by the
    /// build driver at the end of a build round.
    pub fn write_state(&self) -> io::Result<()> {
        let snapshot = self.lock_state().build_deps.snapshot_if_dirty();
        let Some(bytes) = snapshot else {
            return Ok(());
        };
        if let Err(err) = write_state_file(&self.state_path, &bytes) {
            self.lock_state().build_deps.mark_dirty();
            return Err(err);
        }
        Ok(())
    }

    // --- reconcile-time lifecycle ---------------------------------------

    /// Registers a file generated while `parent` is being re-analyzed in
    /// memory. No disk I/O happens on this path: a masked file is un-hidden,
    /// an existing visible copy is updated, or a fresh working copy is
    /// acquired.
    pub fn generate_during_reconcile(
        &self,
        parent: &Path,
        type_name: &TypeName,
        contents: &str,
    ) -> Option<ReconcileGenerated> {
        let result = self.reconcile_one(parent, type_name, contents);
        self.drain_reanalysis();
        result
    }

    fn reconcile_one(
        &self,
        parent: &Path,
        type_name: &TypeName,
        contents: &str,
    ) -> Option<ReconcileGenerated> {
        if !self.enabled {
            return None;
        }

        enum Plan {
            /// Handle taken out of a registry; update content, then put it
            /// back into the visible registry.
            Update(WorkingCopy),
            Acquire { was_open: bool },
        }

        let path = self.path_for_type(type_name);
        // Queried before taking the bookkeeping lock: the provider may take
        // its own lock, and no provider method is ever called under the
        // monitor.
        let was_open = self.buffers.is_open(&path);

        let plan = {
            let mut state = self.lock_state();
            if let Some(wc) = state.hidden.remove(&path) {
                // Un-hide: the same handle is relocated, no new acquire.
                state.non_deps.remove(&parent.to_path_buf(), &path);
                state.reconcile_deps.put(parent.to_path_buf(), path.clone());
                Plan::Update(wc)
            } else if let Some(wc) = state.visible.remove(&path) {
                state.reconcile_deps.put(parent.to_path_buf(), path.clone());
                Plan::Update(wc)
            } else {
                state.reconcile_deps.put(parent.to_path_buf(), path.clone());
                Plan::Acquire { was_open }
            }
        };

        let (wc, modified) = match plan {
            Plan::Update(wc) => {
                let modified = self.helper.set_contents(&wc, contents);
                (wc, modified)
            }
            Plan::Acquire { was_open } => {
                let Some(wc) = self.helper.acquire_path(&path, contents) else {
                    // Roll the edge back; this file's generation did not
                    // happen.
                    let mut state = self.lock_state();
                    state.reconcile_deps.remove(&parent.to_path_buf(), &path);
                    return None;
                };
                let modified = if was_open {
                    self.helper.set_contents(&wc, contents)
                } else {
                    true
                };
                (wc, modified)
            }
        };

        let duplicate = {
            let mut state = self.lock_state();
            if state.visible.contains_key(&path) {
                // A concurrent reconcile of another parent got here first;
                // our handle is surplus.
                Some(wc)
            } else {
                state.visible.insert(path.clone(), wc);
                None
            }
        };
        if let Some(extra) = duplicate {
            self.helper.release(extra);
        }

        if modified && self.recursive_reconcile {
            self.enqueue_reanalysis(path.clone());
        }

        self.maybe_check_integrity("generate_during_reconcile");
        Some(ReconcileGenerated { path, modified })
    }

    /// Reconciles the two sources of obsolescence after a reconcile of
    /// `parent`:
    ///
    /// (a) files `parent` generated during an earlier reconcile but not this
    /// round lose their edge; with no reconcile parent left they were purely
    /// in-memory and their working copy is discarded (or reused for masking).
    ///
    /// (b) build-generated, reconcile-capable files `parent` no longer
    /// produces gain a non-dependency edge; once no parent believes in the
    /// child any more, its working copy is forced blank and registered
    /// hidden. The on-disk bytes are never touched here.
    pub fn prune_after_reconcile(&self, parent: &Path, newly_generated: &HashSet<PathBuf>) {
        let mut freed: Vec<WorkingCopy> = Vec::new();
        let mut to_mask: Vec<PathBuf> = Vec::new();

        {
            let mut state = self.lock_state();

            let stale: Vec<PathBuf> = state
                .reconcile_deps
                .values_of(&parent.to_path_buf())
                .into_iter()
                .filter(|child| !newly_generated.contains(child))
                .collect();
            for child in stale {
                state.reconcile_deps.remove(&parent.to_path_buf(), &child);
                if !state.reconcile_deps.contains_value(&child) {
                    if let Some(wc) = state.visible.remove(&child) {
                        freed.push(wc);
                    }
                }
            }

            let masking_candidates: Vec<PathBuf> = state
                .build_deps
                .children_of(parent)
                .into_iter()
                .filter(|child| state.clear_during_reconcile.contains(child))
                .filter(|child| !newly_generated.contains(child))
                .collect();
            for child in masking_candidates {
                state.non_deps.put(parent.to_path_buf(), child.clone());

                let still_believed = state
                    .build_deps
                    .parents_of(&child)
                    .iter()
                    .any(|p| !state.non_deps.contains_pair(p, &child))
                    || state.reconcile_deps.contains_value(&child);
                if !still_believed && !state.hidden.contains_key(&child) {
                    to_mask.push(child);
                }
            }
        }

        // Blank the masked copies outside the lock, reusing handles freed in
        // (a) where the paths line up.
        let mut masked: Vec<(PathBuf, WorkingCopy)> = Vec::new();
        for child in to_mask {
            let wc = match freed.iter().position(|wc| wc.path() == child) {
                Some(idx) => freed.swap_remove(idx),
                None => match self.helper.acquire_path(&child, "") {
                    Some(wc) => wc,
                    None => continue,
                },
            };
            self.helper.set_contents(&wc, "");
            masked.push((child, wc));
        }

        let mut surplus: Vec<WorkingCopy> = Vec::new();
        {
            let mut state = self.lock_state();
            for (child, wc) in masked {
                if state.hidden.contains_key(&child) {
                    surplus.push(wc);
                } else {
                    state.hidden.insert(child, wc);
                }
            }
        }

        for wc in freed.into_iter().chain(surplus) {
            self.helper.release(wc);
        }

        self.maybe_check_integrity("prune_after_reconcile");
    }

    /// The reconcile-graph analogue of [`Self::prune_after_build`], fired
    /// when `parent`'s working copy is discarded (editor closed). Purely
    /// in-memory children with no surviving reconcile parent are discarded;
    /// masking edges owned by `parent` are dropped and hidden copies
    /// released once no other parent masks them. Nothing touches the disk.
    pub fn working_copy_discarded(&self, parent: &Path) {
        let mut pending: Vec<WorkingCopy> = Vec::new();
        {
            let mut state = self.lock_state();

            for child in state.reconcile_deps.values_of(&parent.to_path_buf()) {
                state.reconcile_deps.remove(&parent.to_path_buf(), &child);
                if !state.reconcile_deps.contains_value(&child) {
                    if let Some(wc) = state.visible.remove(&child) {
                        pending.push(wc);
                    }
                }
            }

            for child in state.non_deps.values_of(&parent.to_path_buf()) {
                state.non_deps.remove(&parent.to_path_buf(), &child);
                if !state.non_deps.contains_value(&child) {
                    if let Some(wc) = state.hidden.remove(&child) {
                        pending.push(wc);
                    }
                }
            }
        }

        for wc in pending {
            self.helper.release(wc);
        }
        self.maybe_check_integrity("working_copy_discarded");
    }

    // --- project teardown ------------------------------------------------

    /// Project clean: discard persisted build state and hidden masking
    /// copies. Reconcile bookkeeping survives — a live editor is not
    /// disturbed by someone else cleaning the project.
    pub fn on_clean(&self) {
        let mut pending: Vec<WorkingCopy> = Vec::new();
        {
            let mut state = self.lock_state();
            state.build_deps.clear();
            state.clear_during_reconcile.clear();
            state.non_deps.clear();
            pending.extend(state.hidden.drain().map(|(_, wc)| wc));
        }

        for wc in pending {
            self.helper.release(wc);
        }
        self.delete_state_file_quietly();
        self.maybe_check_integrity("on_clean");
    }

    /// Project closed: discard all transient bookkeeping and working copies
    /// but keep the persisted build state on disk for when the project
    /// reopens.
    pub fn on_closed(&self) {
        let mut pending: Vec<WorkingCopy> = Vec::new();
        {
            let mut state = self.lock_state();
            state.build_deps.forget();
            state.reconcile_deps.clear();
            state.non_deps.clear();
            state.clear_during_reconcile.clear();
            pending.extend(state.visible.drain().map(|(_, wc)| wc));
            pending.extend(state.hidden.drain().map(|(_, wc)| wc));
        }

        for wc in pending {
            self.helper.release(wc);
        }
        self.maybe_check_integrity("on_closed");
    }

    /// Project deleted: everything `on_closed` does, plus the persisted
    /// state file is removed.
    pub fn on_deleted(&self) {
        self.on_closed();
        {
            let mut state = self.lock_state();
            state.build_deps.clear();
        }
        self.delete_state_file_quietly();
        self.maybe_check_integrity("on_deleted");
    }

    // --- queries ---------------------------------------------------------

    pub fn build_children(&self, parent: &Path) -> HashSet<PathBuf> {
        self.lock_state().build_deps.children_of(parent)
    }

    pub fn build_parents(&self, child: &Path) -> HashSet<PathBuf> {
        self.lock_state().build_deps.parents_of(child)
    }

    pub fn reconcile_children(&self, parent: &Path) -> HashSet<PathBuf> {
        self.lock_state().reconcile_deps.values_of(&parent.to_path_buf())
    }

    /// Whether `path` currently has a blank working copy masking its on-disk
    /// content.
    pub fn is_masked(&self, path: &Path) -> bool {
        self.lock_state().hidden.contains_key(path)
    }

    pub fn has_visible_copy(&self, path: &Path) -> bool {
        self.lock_state().visible.contains_key(path)
    }

    pub fn is_tracked_parent(&self, parent: &Path) -> bool {
        let state = self.lock_state();
        state.build_deps.contains_parent(parent)
            || state.reconcile_deps.contains_key(&parent.to_path_buf())
    }

    pub(crate) fn tracked_build_parents_under(&self, folder: &Path) -> Vec<PathBuf> {
        let state = self.lock_state();
        state
            .build_deps
            .parents()
            .filter(|parent| parent.starts_with(folder))
            .cloned()
            .collect()
    }

    // --- internals -------------------------------------------------------

    #[track_caller]
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "arbor.gen",
                    file = loc.file(),
                    line = loc.line(),
                    error = %err,
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }

    #[track_caller]
    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<PathBuf>> {
        match self.pending_reanalysis.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "arbor.gen",
                    file = loc.file(),
                    line = loc.line(),
                    error = %err,
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }

    fn ensure_generated_root(&self) -> io::Result<()> {
        if self.tree.is_dir(&self.generated_root) {
            return Ok(());
        }
        self.ensure_dir_chain(&self.generated_root)
    }

    /// Creates every missing directory between the project root and `dir`,
    /// marking only the newly created ones as derived.
    fn ensure_dir_chain(&self, dir: &Path) -> io::Result<()> {
        let rel = dir.strip_prefix(&self.project_root).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is outside the project root", dir.display()),
            )
        })?;

        let mut current = self.project_root.clone();
        for component in rel.components() {
            current.push(component);
            if !self.tree.is_dir(&current) {
                self.tree.create_dir(&current)?;
                self.tree.mark_derived(&current);
            }
        }
        Ok(())
    }

    fn write_generated_bytes(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            self.ensure_dir_chain(parent)?;
        }

        // Tolerate a build running while an editor holds this file open:
        // route the new content through the open buffer so the two views
        // cannot diverge.
        if self.buffers.is_open(path) {
            let text = String::from_utf8_lossy(contents);
            if let Some(wc) = self.buffers.acquire(path, &text) {
                self.buffers.set_contents(&wc, &text);
                let result = self.buffers.commit_to_disk(&wc, self.tree.as_ref());
                self.buffers.discard(wc);
                return result;
            }
        }
        self.tree.write_file(path, contents)
    }

    /// Walks up from `path`, deleting each now-empty, derived folder until a
    /// non-empty or non-derived one (or the generated root) is reached.
    fn delete_empty_derived_ancestors(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.generated_root || dir == self.project_root {
                break;
            }
            if !self.tree.is_derived(dir) {
                break;
            }
            match self.tree.is_dir_empty(dir) {
                Ok(true) => {}
                _ => break,
            }
            if let Err(err) = self.tree.delete_dir(dir) {
                tracing::debug!(
                    target = "arbor.gen",
                    dir = %dir.display(),
                    error = %err,
                    "stopping derived-folder cleanup"
                );
                break;
            }
            current = dir.parent();
        }
    }

    fn delete_state_file_quietly(&self) {
        match std::fs::remove_file(&self.state_path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    target = "arbor.gen",
                    path = %self.state_path.display(),
                    error = %err,
                    "failed to delete dependency state file"
                );
            }
        }
    }

    fn enqueue_reanalysis(&self, path: PathBuf) {
        if self.reanalysis.is_none() {
            return;
        }
        self.lock_pending().push_back(path);
    }

    /// Drains pending nested-reconcile requests to a fixed point. Re-entrant
    /// calls (the sink calling back into `generate_during_reconcile`) see
    /// the `draining` flag set and return immediately; their enqueued work
    /// is picked up by the outermost drain loop.
    fn drain_reanalysis(&self) {
        let Some(sink) = &self.reanalysis else {
            return;
        };

        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                // Another frame (possibly ours, lower on the stack) is
                // already draining.
                return;
            }

            let mut steps = 0usize;
            while let Some(path) = self.lock_pending().pop_front() {
                steps += 1;
                if steps > MAX_REANALYSIS_STEPS {
                    tracing::error!(
                        target = "arbor.gen",
                        "nested reconcile did not reach a fixed point; dropping remaining work"
                    );
                    self.lock_pending().clear();
                    break;
                }
                sink.reanalyze(&path);
            }

            self.draining.store(false, Ordering::Release);
            if self.lock_pending().is_empty() {
                return;
            }
            // Work raced in between the final pop and the flag reset; loop
            // and claim the drain again.
        }
    }

    fn maybe_check_integrity(&self, operation: &str) {
        if !self.integrity_checks {
            return;
        }
        let state = self.lock_state();
        for violation in integrity::check(&state) {
            tracing::error!(
                target = "arbor.gen",
                operation,
                violation = %violation,
                "internal state integrity violation"
            );
        }
    }
}
