//! Lifecycle engine for generated source files.
//!
//! [`GeneratedFileManager`] tracks which files were generated by which parent
//! sources across two execution contexts: an on-disk build and an in-memory
//! reconcile of an edited buffer. It guarantees generated artifacts are
//! created, updated, hidden, or deleted exactly when the parent stops or
//! starts producing them, without leaving stale generated content visible to
//! a downstream compilation pass.
//!
//! The build-time dependency graph is persisted per project; the
//! reconcile-time graphs are transient. A build-generated file that an
//! in-memory reconcile no longer produces is never deleted from disk —
//! instead its working copy is forced blank ("masked") so the reconcile's
//! type system does not see it.

mod events;
mod integrity;
mod manager;
mod problem;
mod working_copy;

pub use events::ResourceEvent;
pub use manager::{
    BuildGenerated, Collaborators, GenTarget, GeneratedFileManager, ReanalysisSink,
    ReconcileGenerated,
};
pub use problem::{CollectingSink, Problem, ProblemSink, Severity};
pub use working_copy::WorkingCopyHelper;
