//! Dependency bookkeeping between parent files and the files they generate.
//!
//! [`BidiMultiMap`] is the raw many-to-many association with O(1) lookup in
//! both directions. [`PersistedDependencyMap`] layers per-file flags and a
//! versioned binary state file on top; it backs the build-time dependency
//! graph that must survive workspace restarts.

mod multimap;
mod persisted;

pub use multimap::BidiMultiMap;
pub use persisted::{
    write_state_file, FileFlag, PersistedDependencyMap, StateReadError, STATE_FORMAT_VERSION,
};
