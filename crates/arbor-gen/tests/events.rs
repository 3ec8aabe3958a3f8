mod common;

use arbor_core::TypeName;
use arbor_gen::ResourceEvent;
use arbor_vfs::BufferProvider as _;

use common::{fixture, set_of};

#[test]
fn deleting_a_parent_file_prunes_its_generated_files() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let gen = fx.build_generate(&[parent.clone()], "com.example.GenA", "class GenA {}", false);

    fx.manager.handle_event(ResourceEvent::FileDeleted(parent.clone()));
    assert!(!gen.exists());
    assert!(fx.manager.build_children(&parent).is_empty());
}

#[test]
fn deleting_an_untracked_file_is_ignored() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let gen = fx.build_generate(&[parent], "com.example.GenA", "class GenA {}", false);

    fx.manager
        .handle_event(ResourceEvent::FileDeleted(fx.parent("Unrelated.java")));
    assert!(gen.exists());
}

#[test]
fn deleting_a_folder_prunes_every_parent_under_it() {
    let fx = fixture();
    let p1 = fx.parent("A.java");
    let p2 = fx.parent("B.java");
    let other = fx.root().join("lib").join("C.java");

    let g1 = fx.build_generate(&[p1], "com.example.GenA", "class GenA {}", false);
    let g2 = fx.build_generate(&[p2], "com.example.GenB", "class GenB {}", false);
    let g3 = fx.build_generate(&[other], "com.example.GenC", "class GenC {}", false);

    fx.manager
        .handle_event(ResourceEvent::FolderDeleted(fx.root().join("src")));
    assert!(!g1.exists());
    assert!(!g2.exists());
    assert!(g3.exists());
}

#[test]
fn editor_close_routes_to_working_copy_discarded() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let generated = fx
        .manager
        .generate_during_reconcile(
            &parent,
            &TypeName::from_dotted("com.example.GenA"),
            "class GenA {}",
        )
        .unwrap();

    fx.manager
        .handle_event(ResourceEvent::WorkingCopyClosed(parent));
    assert!(!fx.manager.has_visible_copy(&generated.path));
    assert_eq!(fx.buffers.open_count(), 0);
}

#[test]
fn clean_discards_build_state_but_not_live_reconcile_copies() {
    let fx = fixture();
    let parent = fx.parent("A.java");

    let masked = fx.build_generate(
        &[parent.clone()],
        "com.example.Masked",
        "class Masked {}",
        true,
    );
    let in_memory = fx
        .manager
        .generate_during_reconcile(
            &parent,
            &TypeName::from_dotted("com.example.Fresh"),
            "class Fresh {}",
        )
        .unwrap()
        .path;
    fx.manager.prune_after_reconcile(&parent, &set_of(&[in_memory.clone()]));
    fx.manager.write_state().unwrap();
    assert!(fx.state_path().exists());
    assert!(fx.manager.is_masked(&masked));

    fx.manager.handle_event(ResourceEvent::ProjectCleaned);

    assert!(fx.manager.build_children(&parent).is_empty());
    assert!(!fx.state_path().exists());
    assert!(!fx.manager.is_masked(&masked));
    // The live editor's reconcile bookkeeping is untouched.
    assert!(fx.manager.has_visible_copy(&in_memory));
    assert_eq!(fx.buffers.text_of(&in_memory).unwrap(), "class Fresh {}");
}

#[test]
fn close_releases_copies_but_keeps_state_on_disk() {
    let fx = fixture();
    let parent = fx.parent("A.java");

    fx.build_generate(&[parent.clone()], "com.example.GenA", "class GenA {}", false);
    fx.manager
        .generate_during_reconcile(
            &parent,
            &TypeName::from_dotted("com.example.Fresh"),
            "class Fresh {}",
        )
        .unwrap();
    fx.manager.write_state().unwrap();

    fx.manager.handle_event(ResourceEvent::ProjectClosed);

    assert_eq!(fx.buffers.open_count(), 0);
    assert!(fx.manager.build_children(&parent).is_empty());
    // State stays on disk for the next session.
    assert!(fx.state_path().exists());
}

#[test]
fn delete_also_removes_the_state_file() {
    let fx = fixture();
    let parent = fx.parent("A.java");

    fx.build_generate(&[parent.clone()], "com.example.GenA", "class GenA {}", false);
    fx.manager.write_state().unwrap();
    assert!(fx.state_path().exists());

    fx.manager.handle_event(ResourceEvent::ProjectDeleted);

    assert_eq!(fx.buffers.open_count(), 0);
    assert!(!fx.state_path().exists());
    assert!(fx.manager.build_children(&parent).is_empty());

    // Nothing left to write either.
    fx.manager.write_state().unwrap();
    assert!(!fx.state_path().exists());
}

#[test]
fn pruning_with_the_same_set_twice_is_idempotent() {
    let fx = fixture();
    let parent = fx.parent("A.java");
    let kept = fx.build_generate(&[parent.clone()], "com.example.Kept", "class Kept {}", false);
    fx.build_generate(&[parent.clone()], "com.example.Dropped", "class Dropped {}", false);

    let first = fx.manager.prune_after_build(&parent, &set_of(&[kept.clone()]));
    assert_eq!(first.len(), 1);
    let second = fx.manager.prune_after_build(&parent, &set_of(&[kept.clone()]));
    assert!(second.is_empty());
    assert!(kept.exists());
}
