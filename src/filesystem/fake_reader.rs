use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::filesystem::{ChildEntry, EntryKind, FilesystemReader, NodeMetadata, ReadError};

#[derive(Debug, Clone)]
struct FakeNode {
    kind: EntryKind,
    modified: SystemTime,
    denied: bool,
    vanishes_on_list: bool,
}

/// In-memory filesystem for scenarios a real directory cannot stage reliably, such as
/// permission failures under root or a directory vanishing between its stat and its
/// listing (see [`vanish_on_list`](Self::vanish_on_list)).
///
/// Parent modification times are not bumped on child changes; tests touch explicitly.
#[derive(Debug, Default)]
pub(crate) struct FakeFilesystem {
    nodes: RefCell<BTreeMap<PathBuf, FakeNode>>,
    clock: Cell<u64>,
}

impl FakeFilesystem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> SystemTime {
        self.clock.set(self.clock.get() + 1);
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.clock.get())
    }

    fn insert(&self, path: &str, kind: EntryKind) -> &Self {
        let modified = self.tick();
        self.nodes.borrow_mut().insert(
            PathBuf::from(path),
            FakeNode {
                kind,
                modified,
                denied: false,
                vanishes_on_list: false,
            },
        );
        self
    }

    pub(crate) fn dir(&self, path: &str) -> &Self {
        self.insert(path, EntryKind::Directory)
    }

    pub(crate) fn file(&self, path: &str) -> &Self {
        self.insert(path, EntryKind::File)
    }

    pub(crate) fn touch(&self, path: &str) {
        let modified = self.tick();
        if let Some(node) = self.nodes.borrow_mut().get_mut(Path::new(path)) {
            node.modified = modified;
        }
    }

    /// Removes `path` and everything below it
    pub(crate) fn remove(&self, path: &str) {
        self.remove_subtree(Path::new(path));
    }

    fn remove_subtree(&self, path: &Path) {
        self.nodes
            .borrow_mut()
            .retain(|candidate, _| !candidate.starts_with(path));
    }

    /// The next listing of `path` removes it and reports NotFound, as if it was deleted
    /// right after being stat'ed.
    pub(crate) fn vanish_on_list(&self, path: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(Path::new(path)) {
            node.vanishes_on_list = true;
        }
    }

    pub(crate) fn deny(&self, path: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(Path::new(path)) {
            node.denied = true;
        }
    }

    pub(crate) fn allow(&self, path: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(Path::new(path)) {
            node.denied = false;
        }
    }

    fn node(&self, path: &Path) -> Result<FakeNode, ReadError> {
        let node = self
            .nodes
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| ReadError::from_io(path, ErrorKind::NotFound.into()))?;
        if node.denied {
            return Err(ReadError::from_io(path, ErrorKind::PermissionDenied.into()));
        }
        Ok(node)
    }
}

impl FilesystemReader for FakeFilesystem {
    fn metadata(&self, path: &Path) -> Result<NodeMetadata, ReadError> {
        let node = self.node(path)?;
        Ok(NodeMetadata {
            kind: node.kind,
            modified: Some(node.modified),
        })
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<ChildEntry>, ReadError> {
        let node = self.node(path)?;
        if node.vanishes_on_list {
            self.remove_subtree(path);
            return Err(ReadError::from_io(path, ErrorKind::NotFound.into()));
        }
        if node.kind != EntryKind::Directory {
            return Err(ReadError::from_io(path, ErrorKind::Other.into()));
        }

        Ok(self
            .nodes
            .borrow()
            .iter()
            .filter(|(candidate, _)| candidate.parent() == Some(path))
            .filter_map(|(candidate, node)| {
                Some(ChildEntry {
                    name: candidate.file_name()?.to_os_string(),
                    kind: node.kind,
                })
            })
            .collect())
    }
}
