use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A dotted Java type name, e.g. `com.example.GeneratedFoo`.
///
/// Nested types use their binary-ish dotted form; the last segment is the
/// top-level compilation unit name for path resolution purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    pub fn from_dotted(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The relative source path for this type under a source root,
    /// e.g. `com/example/GeneratedFoo.java`.
    pub fn relative_source_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for segment in self.0.split('.') {
            path.push(segment);
        }
        path.set_extension("java");
        path
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(value: &str) -> Self {
        Self::from_dotted(value)
    }
}
