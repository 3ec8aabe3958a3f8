mod common;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arbor_config::ArborConfig;
use arbor_core::TypeName;
use arbor_gen::{Collaborators, CollectingSink, GenTarget, GeneratedFileManager};
use arbor_vfs::{BufferProvider, InMemoryBuffers, LocalTree, SourceTree};

use common::{fixture, set_of};

#[test]
fn generate_writes_file_and_records_dependency() {
    let fx = fixture();
    let parent = fx.parent("A.java");

    let generated = fx
        .manager
        .generate_during_build(
            &[parent.clone()],
            &GenTarget::Type(TypeName::from_dotted("com.example.GenA")),
            b"class GenA {}",
            false,
        )
        .unwrap();

    assert!(generated.modified);
    assert_eq!(generated.path, fx.gen_root().join("com/example/GenA.java"));
    assert_eq!(fx.disk_text(&generated.path), "class GenA {}");
    assert!(fx.manager.build_children(&parent).contains(&generated.path));
    assert!(fx.manager.build_parents(&generated.path).contains(&parent));

    // Regenerating identical content is not a modification.
    let again = fx
        .manager
        .generate_during_build(
            &[parent],
            &GenTarget::Type(TypeName::from_dotted("com.example.GenA")),
            b"class GenA {}",
            false,
        )
        .unwrap();
    assert!(!again.modified);
}

#[test]
fn single_parent_prune_deletes_file_exactly_once() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let gen = fx.build_generate(&[parent.clone()], "com.example.GenA", "class GenA {}", false);

    let deleted = fx.manager.prune_after_build(&parent, &HashSet::new());
    assert_eq!(deleted, vec![gen.clone()]);
    assert!(!gen.exists());
    assert!(fx.manager.build_children(&parent).is_empty());

    // Second prune with the same inputs is a no-op.
    let deleted = fx.manager.prune_after_build(&parent, &HashSet::new());
    assert!(deleted.is_empty());
}

#[test]
fn multiply_parented_file_survives_until_last_parent_stops() {
    let fx = fixture();
    let p1 = fx.parent("A.java");
    let p2 = fx.parent("B.java");
    let gen = fx.build_generate(
        &[p1.clone(), p2.clone()],
        "com.example.Shared",
        "class Shared {}",
        false,
    );

    let deleted = fx.manager.prune_after_build(&p1, &HashSet::new());
    assert!(deleted.is_empty());
    assert!(gen.exists());
    assert!(fx.manager.build_parents(&gen).contains(&p2));

    let deleted = fx.manager.prune_after_build(&p2, &HashSet::new());
    assert_eq!(deleted, vec![gen.clone()]);
    assert!(!gen.exists());
}

#[test]
fn pruning_keeps_files_still_generated() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let kept = fx.build_generate(&[parent.clone()], "com.example.Kept", "class Kept {}", false);
    let dropped = fx.build_generate(
        &[parent.clone()],
        "com.example.Dropped",
        "class Dropped {}",
        false,
    );

    let deleted = fx.manager.prune_after_build(&parent, &set_of(&[kept.clone()]));
    assert_eq!(deleted, vec![dropped.clone()]);
    assert!(kept.exists());
    assert!(!dropped.exists());
}

#[test]
fn resources_are_deleted_but_not_reported_as_sources() {
    let fx = fixture();
    let parent = fx.parent("A.java");

    let generated = fx
        .manager
        .generate_during_build(
            &[parent.clone()],
            &GenTarget::Resource(PathBuf::from("META-INF/services.xml")),
            b"<services/>",
            false,
        )
        .unwrap();
    assert!(generated.path.exists());

    let deleted = fx.manager.prune_after_build(&parent, &HashSet::new());
    assert!(deleted.is_empty());
    assert!(!generated.path.exists());
}

#[test]
fn empty_derived_package_folders_are_cleaned_up() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let gen = fx.build_generate(&[parent.clone()], "a.b.C", "class C {}", false);

    let package_dir = fx.gen_root().join("a/b");
    assert!(package_dir.is_dir());

    fx.manager.prune_after_build(&parent, &HashSet::new());
    assert!(!gen.exists());
    assert!(!package_dir.exists());
    assert!(!fx.gen_root().join("a").exists());
    // The generated root itself stays.
    assert!(fx.gen_root().is_dir());
}

#[test]
fn pre_existing_folders_are_never_deleted() {
    let fx = fixture();
    // The package folder exists before generation, so it was not created by
    // us and is not derived.
    std::fs::create_dir_all(fx.gen_root().join("a/b")).unwrap();

    let parent = fx.parent("A.java");
    let gen = fx.build_generate(&[parent.clone()], "a.b.C", "class C {}", false);

    fx.manager.prune_after_build(&parent, &HashSet::new());
    assert!(!gen.exists());
    assert!(fx.gen_root().join("a/b").is_dir());
}

#[test]
fn state_survives_restart() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let gen = fx.build_generate(&[parent.clone()], "com.example.GenA", "class GenA {}", false);
    fx.manager.write_state().unwrap();
    assert!(fx.state_path().exists());

    // Simulate a workspace restart: a fresh manager over the same project.
    let config = ArborConfig {
        integrity_checks: true,
        ..Default::default()
    };
    let manager = GeneratedFileManager::new(
        fx.root(),
        &fx.gen_root(),
        &fx.state_path(),
        &config,
        Collaborators {
            tree: Arc::new(LocalTree::new()),
            buffers: Arc::new(InMemoryBuffers::new()),
            problems: Arc::new(CollectingSink::new()),
            reanalysis: None,
        },
    );

    assert!(manager.build_children(&parent).contains(&gen));
    let deleted = manager.prune_after_build(&parent, &HashSet::new());
    assert_eq!(deleted, vec![gen.clone()]);
    assert!(!gen.exists());
}

#[test]
fn misconfigured_generated_root_disables_generation_for_the_build() {
    let outside = tempfile::tempdir().unwrap();
    let fx = fixture();

    // A generated root outside the project cannot be provisioned.
    let config = ArborConfig {
        integrity_checks: true,
        ..Default::default()
    };
    let manager = GeneratedFileManager::new(
        fx.root(),
        &outside.path().join("gen"),
        &fx.state_path(),
        &config,
        Collaborators {
            tree: Arc::clone(&fx.tree) as _,
            buffers: Arc::clone(&fx.buffers) as _,
            problems: Arc::clone(&fx.sink) as _,
            reanalysis: None,
        },
    );

    let target = GenTarget::Type(TypeName::from_dotted("com.example.GenA"));
    assert!(manager
        .generate_during_build(&[fx.parent("A.java")], &target, b"x", false)
        .is_none());
    assert!(manager
        .generate_during_build(&[fx.parent("A.java")], &target, b"x", false)
        .is_none());

    // Reported once, not per call.
    assert_eq!(fx.sink.take().len(), 1);

    // The next build round gets a fresh chance (and a fresh report).
    manager.begin_build();
    assert!(manager
        .generate_during_build(&[fx.parent("A.java")], &target, b"x", false)
        .is_none());
    assert_eq!(fx.sink.take().len(), 1);
}

#[test]
fn build_write_routes_through_an_open_buffer() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let gen_path = fx.gen_root().join("com/example/GenA.java");

    // An editor holds the soon-to-be-generated file open.
    let editor = fx.buffers.acquire(&gen_path, "stale editor view").unwrap();

    let gen = fx.build_generate(&[parent], "com.example.GenA", "class GenA {}", false);
    assert_eq!(gen, gen_path);

    // Both the buffer and the disk see the new content.
    assert_eq!(fx.buffers.text_of(&gen_path).unwrap(), "class GenA {}");
    assert_eq!(fx.disk_text(&gen_path), "class GenA {}");

    fx.buffers.discard(editor);
}

/// A tree whose file deletes always fail, as on a permission-locked output
/// folder.
struct UndeletableTree {
    inner: LocalTree,
}

impl SourceTree for UndeletableTree {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read_bytes(path)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_file(path, bytes)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir(path)
    }

    fn delete_file(&self, _path: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }

    fn delete_dir(&self, path: &Path) -> io::Result<()> {
        self.inner.delete_dir(path)
    }

    fn is_dir_empty(&self, path: &Path) -> io::Result<bool> {
        self.inner.is_dir_empty(path)
    }

    fn mark_derived(&self, path: &Path) {
        self.inner.mark_derived(path)
    }

    fn is_derived(&self, path: &Path) -> bool {
        self.inner.is_derived(path)
    }
}

#[test]
fn failed_delete_keeps_the_file_but_drops_the_bookkeeping() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().to_path_buf();
    std::fs::create_dir_all(root.join("src")).unwrap();

    let buffers = Arc::new(InMemoryBuffers::new());
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
            tree: Arc::new(UndeletableTree {
                inner: LocalTree::new(),
            }),
            buffers: Arc::clone(&buffers) as _,
            problems: Arc::new(CollectingSink::new()),
            reanalysis: None,
        },
    );
    let parent = root.join("src").join("A.java");

    let gen = manager
        .generate_during_build(
            &[parent.clone()],
            &GenTarget::Type(TypeName::from_dotted("com.example.GenA")),
            b"class GenA {}",
            true,
        )
        .unwrap()
        .path;
    // Mask it, as a live reconcile of the parent would have.
    manager.prune_after_reconcile(&parent, &HashSet::new());
    assert!(manager.is_masked(&gen));

    let deleted = manager.prune_after_build(&parent, &HashSet::new());

    // The delete failed, so nothing is reported and the bytes stay put.
    assert!(deleted.is_empty());
    assert!(gen.exists());
    // The bookkeeping is gone regardless, and the masking copy was released
    // exactly once.
    assert!(manager.build_children(&parent).is_empty());
    assert!(!manager.is_masked(&gen));
    assert_eq!(buffers.open_count(), 0);

    // A second prune finds nothing left.
    assert!(manager.prune_after_build(&parent, &HashSet::new()).is_empty());
}
