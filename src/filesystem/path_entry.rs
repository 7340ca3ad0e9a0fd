use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs::FileType;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use derive_more::Display;

/// Represents the type of a filesystem node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EntryKind {
    #[display("file")]
    File,
    #[display("directory")]
    Directory,
    /// Tracked as a leaf, never followed
    #[display("symlink")]
    Symlink,
}

impl From<FileType> for EntryKind {
    fn from(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

/// Last observed state of a single watched node.
///
/// A directory whose contents are tracked carries `Some(children)` and is called
/// *expanded*. Directories below the tracked depth of a flat scan carry `None`, as do
/// files and symlinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    path: PathBuf,
    kind: EntryKind,
    modified: Option<SystemTime>,
    children: Option<BTreeMap<OsString, PathEntry>>,
}

impl PathEntry {
    pub(crate) fn new(
        path: PathBuf,
        kind: EntryKind,
        modified: Option<SystemTime>,
        expanded: bool,
    ) -> Self {
        let children = (kind == EntryKind::Directory && expanded).then(BTreeMap::new);
        Self {
            path,
            kind,
            modified,
            children,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    /// Tracked children in name order. Empty for anything that is not expanded.
    pub fn children(&self) -> impl Iterator<Item = &PathEntry> {
        self.children.iter().flat_map(BTreeMap::values)
    }

    pub fn child(&self, name: &OsStr) -> Option<&PathEntry> {
        self.children.as_ref()?.get(name)
    }

    /// Walks `relative` (a path below this entry) down the tracked children.
    pub fn descendant(&self, relative: &Path) -> Option<&PathEntry> {
        relative
            .components()
            .try_fold(self, |entry, component| match component {
                Component::Normal(name) => entry.child(name),
                _ => None,
            })
    }

    /// Number of tracked nodes in this subtree, this entry included.
    pub fn len(&self) -> usize {
        1 + self.children().map(PathEntry::len).sum::<usize>()
    }

    pub(crate) fn descendant_mut(&mut self, relative: &Path) -> Option<&mut PathEntry> {
        let mut current = self;
        for component in relative.components() {
            let Component::Normal(name) = component else {
                return None;
            };
            current = current.children.as_mut()?.get_mut(name)?;
        }
        Some(current)
    }

    pub(crate) fn set_modified(&mut self, modified: Option<SystemTime>) {
        self.modified = modified;
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut BTreeMap<OsString, PathEntry>> {
        self.children.as_mut()
    }

    /// Starts tracking the contents of a directory. No effect on other kinds.
    pub(crate) fn expand(&mut self) {
        if self.is_directory() && self.children.is_none() {
            self.children = Some(BTreeMap::new());
        }
    }

    /// Stops tracking the contents and hands them back.
    pub(crate) fn collapse(&mut self) -> Option<BTreeMap<OsString, PathEntry>> {
        self.children.take()
    }

    pub(crate) fn into_children(self) -> impl Iterator<Item = PathEntry> {
        self.children.into_iter().flat_map(BTreeMap::into_values)
    }

    /// Visits this entry before its children
    pub(crate) fn visit_pre_order(&self, visit: &mut impl FnMut(&PathEntry)) {
        visit(self);
        for child in self.children() {
            child.visit_pre_order(visit);
        }
    }
}
