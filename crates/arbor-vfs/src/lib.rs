//! File-tree and working-copy abstractions for Arbor.
//!
//! The traits here are intentionally small: the lifecycle engine only needs
//! byte-level file access plus a "derived" marker ([`SourceTree`]), and an
//! in-memory editable buffer per file ([`BufferProvider`]). Real editor or
//! workspace backends implement the same traits.

mod buffers;
mod document;
mod fs;

pub use buffers::{BufferProvider, InMemoryBuffers, WorkingCopy};
pub use document::Document;
pub use fs::{LocalTree, SourceTree};
