use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::multimap::BidiMultiMap;

/// Bumped on any incompatible change to the state-file layout.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Upper bound on any count or string length read from a state file.
/// A corrupt file must not be able to request a huge allocation.
const MAX_STATE_ITEM: u32 = 1 << 20;

/// Per-file attribute flags.
///
/// Flags are a property of the generated file, not of an edge: when several
/// parents disagree, the last writer wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileFlag {
    /// The file is an opaque resource (text/XML/...), not compilable source.
    NonSource,
}

impl FileFlag {
    pub fn name(self) -> &'static str {
        match self {
            FileFlag::NonSource => "non-source",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "non-source" => Some(FileFlag::NonSource),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StateReadError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("incompatible state version: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("truncated state file")]
    Truncated,
    #[error("state file path is not valid UTF-8")]
    BadUtf8,
    #[error("implausible {what} ({len}) in state file")]
    Oversized { what: &'static str, len: u32 },
}

/// The persisted build-time dependency graph: parent → generated edges plus
/// per-file flags, serialized to one binary state file per scope.
///
/// Loading happens once, at construction; a missing, corrupt, or
/// version-mismatched file yields an empty map (the cost is a future full
/// rebuild, never an error). Writing is skipped while the in-memory state is
/// clean, and rewrites the whole file atomically otherwise.
#[derive(Debug)]
pub struct PersistedDependencyMap {
    project_root: PathBuf,
    state_path: PathBuf,
    map: BidiMultiMap<PathBuf, PathBuf>,
    flags: HashMap<PathBuf, HashSet<FileFlag>>,
    dirty: bool,
}

impl PersistedDependencyMap {
    /// Creates the map, synchronously loading any existing state file.
    pub fn load(project_root: &Path, state_path: &Path) -> Self {
        let mut this = Self {
            project_root: project_root.to_path_buf(),
            state_path: state_path.to_path_buf(),
            map: BidiMultiMap::new(),
            flags: HashMap::new(),
            dirty: false,
        };

        let bytes = match std::fs::read(state_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return this,
            Err(err) => {
                tracing::warn!(
                    target = "arbor.deps",
                    path = %state_path.display(),
                    error = %err,
                    "failed to read dependency state; starting empty"
                );
                return this;
            }
        };

        if let Err(err) = this.decode(&bytes) {
            tracing::warn!(
                target = "arbor.deps",
                path = %state_path.display(),
                error = %err,
                "discarding unreadable dependency state"
            );
            this.map.clear();
            this.flags.clear();
        }
        this
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Adds an edge and overwrites the child's flag set (last writer wins).
    /// Returns `true` iff the edge was not already present.
    pub fn put(&mut self, parent: &Path, child: &Path, flags: &[FileFlag]) -> bool {
        let inserted = self.map.put(parent.to_path_buf(), child.to_path_buf());

        let new_flags: HashSet<FileFlag> = flags.iter().copied().collect();
        let flags_changed = if new_flags.is_empty() {
            self.flags.remove(child).is_some()
        } else {
            self.flags.get(child) != Some(&new_flags) && {
                self.flags.insert(child.to_path_buf(), new_flags);
                true
            }
        };

        if inserted || flags_changed {
            self.dirty = true;
        }
        inserted
    }

    pub fn remove(&mut self, parent: &Path, child: &Path) -> bool {
        let removed = self.map.remove(&parent.to_path_buf(), &child.to_path_buf());
        if removed {
            self.dirty = true;
            self.drop_flags_if_orphaned(child);
        }
        removed
    }

    pub fn remove_parent(&mut self, parent: &Path) -> bool {
        let children = self.map.values_of(&parent.to_path_buf());
        let removed = self.map.remove_key(&parent.to_path_buf());
        if removed {
            self.dirty = true;
            for child in &children {
                self.drop_flags_if_orphaned(child);
            }
        }
        removed
    }

    pub fn remove_child(&mut self, child: &Path) -> bool {
        let removed = self.map.remove_value(&child.to_path_buf());
        if removed {
            self.dirty = true;
            self.flags.remove(child);
        }
        removed
    }

    pub fn children_of(&self, parent: &Path) -> HashSet<PathBuf> {
        self.map.values_of(&parent.to_path_buf())
    }

    pub fn parents_of(&self, child: &Path) -> HashSet<PathBuf> {
        self.map.keys_of(&child.to_path_buf())
    }

    pub fn contains_parent(&self, parent: &Path) -> bool {
        self.map.contains_key(&parent.to_path_buf())
    }

    pub fn contains_child(&self, child: &Path) -> bool {
        self.map.contains_value(&child.to_path_buf())
    }

    pub fn contains_pair(&self, parent: &Path, child: &Path) -> bool {
        self.map
            .contains_pair(&parent.to_path_buf(), &child.to_path_buf())
    }

    pub fn parents(&self) -> impl Iterator<Item = &PathBuf> {
        self.map.keys()
    }

    pub fn children(&self) -> impl Iterator<Item = &PathBuf> {
        self.map.values()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// `true` unless the child carries the `NonSource` flag.
    pub fn is_source(&self, child: &Path) -> bool {
        !self
            .flags
            .get(child)
            .is_some_and(|flags| flags.contains(&FileFlag::NonSource))
    }

    /// Empties the map and marks it dirty, so the next write truncates the
    /// state file. Used by project clean/delete.
    pub fn clear(&mut self) {
        if !self.map.is_empty() || !self.flags.is_empty() {
            self.dirty = true;
        }
        self.map.clear();
        self.flags.clear();
    }

    /// Empties the in-memory map without touching dirtiness, leaving any
    /// on-disk state for the next session. Used by project close.
    pub fn forget(&mut self) {
        self.map.clear();
        self.flags.clear();
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn check_integrity(&self) -> Result<(), String> {
        self.map.check_integrity()?;
        for child in self.flags.keys() {
            if !self.map.contains_value(child) {
                return Err(format!(
                    "flags recorded for untracked file {}",
                    child.display()
                ));
            }
        }
        Ok(())
    }

    /// Encodes the current state and clears the dirty flag, or `None` when
    /// clean. The caller is expected to pass the bytes to
    /// [`write_state_file`] (outside any lock guarding this map) and call
    /// [`Self::mark_dirty`] if that write fails.
    pub fn snapshot_if_dirty(&mut self) -> Option<Vec<u8>> {
        if !self.dirty {
            return None;
        }
        let bytes = self.encode();
        self.dirty = false;
        Some(bytes)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Writes the state file if dirty; no-op otherwise.
    ///
    /// The file is fully rewritten through a unique temp file and an
    /// atomic rename; there is no incremental patching.
    pub fn write(&mut self) -> io::Result<()> {
        let Some(bytes) = self.snapshot_if_dirty() else {
            return Ok(());
        };
        if let Err(err) = write_state_file(&self.state_path, &bytes) {
            self.dirty = true;
            return Err(err);
        }
        Ok(())
    }

    /// Removes the on-disk state file (project deletion).
    pub fn delete_state_file(&mut self) -> io::Result<()> {
        match std::fs::remove_file(&self.state_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn drop_flags_if_orphaned(&mut self, child: &Path) {
        if !self.map.contains_value(&child.to_path_buf()) {
            self.flags.remove(child);
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_u32(&mut out, STATE_FORMAT_VERSION);

        let mut parents: Vec<&PathBuf> = self.map.keys().collect();
        parents.sort();
        write_u32(&mut out, parents.len() as u32);
        for parent in parents {
            write_path(&mut out, &self.project_root, parent);
            let mut children: Vec<PathBuf> = self.map.values_of(parent).into_iter().collect();
            children.sort();
            write_u32(&mut out, children.len() as u32);
            for child in &children {
                write_path(&mut out, &self.project_root, child);
            }
        }

        let mut flagged: Vec<(&PathBuf, &HashSet<FileFlag>)> = self
            .flags
            .iter()
            .filter(|(_, flags)| !flags.is_empty())
            .collect();
        flagged.sort_by(|a, b| a.0.cmp(b.0));
        write_u32(&mut out, flagged.len() as u32);
        for (path, flags) in flagged {
            write_path(&mut out, &self.project_root, path);
            let mut names: Vec<&'static str> = flags.iter().map(|f| f.name()).collect();
            names.sort();
            write_u32(&mut out, names.len() as u32);
            for name in names {
                write_str(&mut out, name);
            }
        }

        out
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<(), StateReadError> {
        let mut cursor = Cursor::new(bytes);

        let version = cursor.read_u32()?;
        if version != STATE_FORMAT_VERSION {
            return Err(StateReadError::VersionMismatch {
                expected: STATE_FORMAT_VERSION,
                found: version,
            });
        }

        let parent_count = cursor.read_count("parent count")?;
        for _ in 0..parent_count {
            let parent = cursor.read_path(&self.project_root)?;
            let child_count = cursor.read_count("child count")?;
            for _ in 0..child_count {
                let child = cursor.read_path(&self.project_root)?;
                self.map.put(parent.clone(), child);
            }
        }

        let flagged_count = cursor.read_count("flagged count")?;
        for _ in 0..flagged_count {
            let path = cursor.read_path(&self.project_root)?;
            let flag_count = cursor.read_count("flag count")?;
            let mut flags = HashSet::new();
            for _ in 0..flag_count {
                let name = cursor.read_str()?;
                match FileFlag::from_name(&name) {
                    Some(flag) => {
                        flags.insert(flag);
                    }
                    // Unknown flags from a newer-but-same-version writer are
                    // dropped rather than treated as corruption.
                    None => tracing::warn!(
                        target = "arbor.deps",
                        flag = %name,
                        "ignoring unknown file flag in state file"
                    ),
                }
            }
            if !flags.is_empty() {
                self.flags.insert(path, flags);
            }
        }

        Ok(())
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u32(&mut self) -> Result<u32, StateReadError> {
        let end = self.pos.checked_add(4).ok_or(StateReadError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(StateReadError::Truncated)?;
        self.pos = end;
        Ok(u32::from_le_bytes(slice.try_into().expect("4-byte slice")))
    }

    fn read_count(&mut self, what: &'static str) -> Result<u32, StateReadError> {
        let count = self.read_u32()?;
        if count > MAX_STATE_ITEM {
            return Err(StateReadError::Oversized { what, len: count });
        }
        Ok(count)
    }

    fn read_str(&mut self) -> Result<String, StateReadError> {
        let len = self.read_u32()?;
        if len > MAX_STATE_ITEM {
            return Err(StateReadError::Oversized {
                what: "string length",
                len,
            });
        }
        let end = self
            .pos
            .checked_add(len as usize)
            .ok_or(StateReadError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(StateReadError::Truncated)?;
        self.pos = end;
        String::from_utf8(slice.to_vec()).map_err(|_| StateReadError::BadUtf8)
    }

    fn read_path(&mut self, root: &Path) -> Result<PathBuf, StateReadError> {
        let rel = self.read_str()?;
        Ok(arbor_core::paths::from_portable_relative(root, &rel))
    }
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn write_path(out: &mut Vec<u8>, root: &Path, path: &Path) {
    let rel = arbor_core::paths::to_portable_relative(root, path)
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    write_str(out, &rel);
}

/// Atomically replaces the state file at `path` with `bytes`
/// (unique temp file + rename).
pub fn write_state_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Err(io::Error::other("state path has no parent directory"));
    };
    std::fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = open_unique_tmp_file(path, parent)?;
    let write_result = (|| -> io::Result<()> {
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(err) = write_result {
        drop(file);
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }
    drop(file);

    if let Err(err) = rename_overwrite(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

static STATE_TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, std::fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = STATE_TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

fn rename_overwrite(src: &Path, dest: &Path) -> io::Result<()> {
    const MAX_RENAME_ATTEMPTS: usize = 1024;
    let mut attempts = 0usize;

    loop {
        match std::fs::rename(src, dest) {
            Ok(()) => return Ok(()),
            Err(err)
                if cfg!(windows)
                    && (err.kind() == io::ErrorKind::AlreadyExists || dest.exists()) =>
            {
                match std::fs::remove_file(dest) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => return Err(remove_err),
                }

                attempts += 1;
                if attempts >= MAX_RENAME_ATTEMPTS {
                    return Err(err);
                }
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}
