//! Configuration for the Arbor generated-source engine.
//!
//! Configuration lives in a project-local JSON file (`.arbor/config.json`).
//! A missing file yields defaults; a malformed file is an error surfaced to
//! the caller so it can be reported, not silently ignored.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory (relative to the project root) holding Arbor state and config.
pub const ARBOR_DIR: &str = ".arbor";

/// Config file name inside [`ARBOR_DIR`].
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading config: {0}")]
    Io(#[from] io::Error),
    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Whether generated sources are produced and tracked at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether an in-memory edit of a generated file triggers a nested
    /// reconcile pass of that file (drained as a work list, not recursion).
    #[serde(default = "default_true")]
    pub recursive_reconcile: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recursive_reconcile: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArborConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Run internal graph/registry integrity checks after every mutating
    /// operation. Defaults to on in debug builds.
    #[serde(default = "default_integrity_checks")]
    pub integrity_checks: bool,
    /// Override for the state directory; relative paths resolve against the
    /// project root. Defaults to [`ARBOR_DIR`].
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for ArborConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            integrity_checks: default_integrity_checks(),
            state_dir: None,
        }
    }
}

impl ArborConfig {
    /// Loads the config from `project_root/.arbor/config.json`.
    ///
    /// A missing file is not an error; defaults are returned.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(ARBOR_DIR).join(CONFIG_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Absolute state directory for `project_root`.
    pub fn state_dir(&self, project_root: &Path) -> PathBuf {
        match &self.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_root.join(dir),
            None => project_root.join(ARBOR_DIR),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_integrity_checks() -> bool {
    cfg!(debug_assertions)
}

/// Installs a global tracing subscriber honoring `ARBOR_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_env("ARBOR_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
