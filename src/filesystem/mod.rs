//! Filesystem tree representation with change tracking capabilities.
//!
//! [`PathTree`] keeps the last observed state of one or more watched subtrees. Asking it
//! to update a path re-reads the filesystem through a [`FilesystemReader`], diffs the
//! result against the stored [`PathEntry`] nodes and reports every added, modified or
//! deleted node to a [`ChangeListener`].

mod listener;
mod path_entry;
mod path_tree;
mod reader;
mod scanner;

#[cfg(test)]
mod fake_reader;

pub use listener::{ChangeEvent, ChangeKind, ChangeListener, ChangeLog};
pub use path_entry::{EntryKind, PathEntry};
pub use path_tree::{PathTree, TreeError};
pub use reader::{ChildEntry, FilesystemReader, NodeMetadata, ReadError, StdFilesystemReader};
pub use scanner::ScanMode;
