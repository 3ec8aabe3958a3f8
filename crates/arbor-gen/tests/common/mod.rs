#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arbor_config::ArborConfig;
use arbor_core::TypeName;
use arbor_gen::{Collaborators, CollectingSink, GenTarget, GeneratedFileManager, ReanalysisSink};
use arbor_vfs::{InMemoryBuffers, LocalTree};

pub struct Fixture {
    pub temp: tempfile::TempDir,
    pub tree: Arc<LocalTree>,
    pub buffers: Arc<InMemoryBuffers>,
    pub sink: Arc<CollectingSink>,
    pub manager: GeneratedFileManager,
}

impl Fixture {
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn gen_root(&self) -> PathBuf {
        self.root().join("gen")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root().join(".arbor").join("generated-deps.bin")
    }

    pub fn parent(&self, name: &str) -> PathBuf {
        self.root().join("src").join(name)
    }

    /// Build-generates a Java type and returns its path.
    pub fn build_generate(
        &self,
        parents: &[PathBuf],
        type_name: &str,
        contents: &str,
        clear_during_reconcile: bool,
    ) -> PathBuf {
        let generated = self
            .manager
            .generate_during_build(
                parents,
                &GenTarget::Type(TypeName::from_dotted(type_name)),
                contents.as_bytes(),
                clear_during_reconcile,
            )
            .expect("build generation failed");
        generated.path
    }

    pub fn disk_text(&self, path: &Path) -> String {
        std::fs::read_to_string(path).expect("generated file missing on disk")
    }
}

pub fn set_of(paths: &[PathBuf]) -> HashSet<PathBuf> {
    paths.iter().cloned().collect()
}

pub fn fixture() -> Fixture {
    fixture_with(None)
}

pub fn fixture_with(reanalysis: Option<Arc<dyn ReanalysisSink>>) -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().to_path_buf();
    std::fs::create_dir_all(root.join("src")).unwrap();

    let tree = Arc::new(LocalTree::new());
    let buffers = Arc::new(InMemoryBuffers::new());
    let sink = Arc::new(CollectingSink::new());

    let config = ArborConfig {
        integrity_checks: true,
        ..Default::default()
    };

    let manager = GeneratedFileManager::new(
        &root,
        &root.join("gen"),
        &root.join(".arbor").join("generated-deps.bin"),
        &config,
        Collaborators {
            tree: Arc::clone(&tree) as _,
            buffers: Arc::clone(&buffers) as _,
            problems: Arc::clone(&sink) as _,
            reanalysis,
        },
    );

    Fixture {
        temp,
        tree,
        buffers,
        sink,
        manager,
    }
}
