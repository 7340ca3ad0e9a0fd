//! Polling filesystem watcher.
//!
//! Keeps an in-memory snapshot of watched directory trees and reports what was added,
//! modified or deleted each time it is asked to compare the snapshot with the disk.
//!
//! ```no_run
//! use treewatch::filesystem::{ChangeLog, PathTree, ScanMode};
//!
//! # fn example() -> Result<(), treewatch::filesystem::TreeError> {
//! let mut tree = PathTree::new(ChangeLog::default(), ScanMode::Recursive);
//! tree.add_path("/tmp/watch")?;
//!
//! // later, on whatever schedule the caller likes
//! tree.update_path("/tmp/watch")?;
//! for event in tree.listener().events() {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod ext;
pub mod filesystem;
