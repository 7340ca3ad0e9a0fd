use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};

use crate::ext::{NormalizePathError, NormalizePathExt};
use crate::filesystem::scanner::Scanner;
use crate::filesystem::{
    ChangeListener, ChangeLog, FilesystemReader, PathEntry, ReadError, ScanMode,
    StdFilesystemReader,
};

/// Snapshot of every watched path and its last observed metadata.
///
/// The tree owns all entries and the listener. Nothing outside holds references into it;
/// observers learn about changes only through listener calls carrying paths.
///
/// Operations are synchronous and take `&mut self` whenever they may change the
/// snapshot, so a tree shared between threads has to sit behind a lock.
#[derive(Debug)]
pub struct PathTree<L, R = StdFilesystemReader> {
    /// Entries not contained in any other tracked entry, keyed by path
    entries: BTreeMap<PathBuf, PathEntry>,
    /// Paths registered through `add_path`, tracked or not
    roots: BTreeSet<PathBuf>,
    listener: L,
    reader: R,
    mode: ScanMode,
}

impl<L: ChangeListener> PathTree<L> {
    pub fn new(listener: L, mode: ScanMode) -> Self {
        Self::with_reader(listener, StdFilesystemReader, mode)
    }

    /// Creates a tree and adds `paths` in order, failing on the first path that cannot
    /// be watched.
    pub fn with_paths<I, P>(listener: L, mode: ScanMode, paths: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut tree = Self::new(listener, mode);
        for path in paths {
            tree.add_path(path)?;
        }
        Ok(tree)
    }
}

impl<L: ChangeListener, R: FilesystemReader> PathTree<L, R> {
    pub fn with_reader(listener: L, reader: R, mode: ScanMode) -> Self {
        Self {
            entries: BTreeMap::new(),
            roots: BTreeSet::new(),
            listener,
            reader,
            mode,
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    /// Registered roots, including ones currently missing from disk
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    /// Every tracked path as of the last scan, each parent before its children.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(self.len());
        for entry in self.entries.values() {
            entry.visit_pre_order(&mut |entry| paths.push(entry.path().to_path_buf()));
        }
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(PathEntry::len).sum()
    }

    /// `true` when no node is tracked. Registered roots that are missing from disk do
    /// not count; see [`roots`](Self::roots).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, path: impl AsRef<Path>) -> Option<&PathEntry> {
        let path = path.as_ref().normalize_path().ok()?;
        find(&self.entries, &path)
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entry(path).is_some()
    }

    /// Starts watching `path`.
    ///
    /// The path has to exist and be readable. Its subtree is scanned (one level deep in
    /// flat mode) and every discovered node is reported as added, parents first, before
    /// this returns. If anything fails the tree and listener are left untouched.
    ///
    /// Adding a path that is already tracked inside another root registers it without
    /// announcing it again. Adding an ancestor of existing roots absorbs their entries.
    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<(), TreeError> {
        let path = path.as_ref().normalize_path().context(InvalidPathSnafu)?;
        self.reader.resolved_metadata(&path).context(ScanSnafu)?;

        if self.roots.contains(&path) && find(&self.entries, &path).is_some() {
            debug!("{} is already watched", path.display());
            return Ok(());
        }

        let mut roots = self.roots.clone();
        roots.insert(path.clone());

        let orphans: BTreeMap<PathBuf, PathEntry> = self
            .entries
            .iter()
            .filter(|(key, _)| is_strictly_below(key, &path))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        let orphan_keys: Vec<PathBuf> = orphans.keys().cloned().collect();

        let inside_parent = path
            .parent()
            .and_then(|parent| find(&self.entries, parent))
            .is_some_and(PathEntry::is_expanded);
        let mut slot = if inside_parent {
            find(&self.entries, &path).cloned()
        } else {
            None
        };

        // Staged on copies so a failure leaves nothing half-registered
        let mut staged_events = ChangeLog::default();
        let mut scanner = Scanner::new(&self.reader, &mut staged_events, &roots, self.mode)
            .with_orphans(orphans);
        scanner.reconcile(&path, &mut slot).context(ScanSnafu)?;
        let unreached = scanner.into_orphans();

        let Some(entry) = slot else {
            return Err(ReadError::NotFoundError { path }).context(ScanSnafu);
        };

        for key in orphan_keys.iter().filter(|key| !unreached.contains_key(*key)) {
            self.entries.remove(key);
        }
        let tracked = entry.len();
        if inside_parent {
            let children = path
                .parent()
                .and_then(|parent| find_mut(&mut self.entries, parent))
                .and_then(PathEntry::children_mut);
            if let (Some(children), Some(name)) = (children, path.file_name()) {
                children.insert(name.to_os_string(), entry);
            }
        } else {
            self.entries.insert(path.clone(), entry);
        }
        self.roots = roots;

        info!(
            "Watching {} ({} mode, {} tracked paths)",
            path.display(),
            self.mode,
            tracked
        );
        staged_events.replay_into(&mut self.listener);
        Ok(())
    }

    /// Stops watching the root at `path`. Entries that only this root covered are
    /// dropped without notifications, since nothing changed on disk.
    ///
    /// Returns `false` if `path` was not a registered root.
    pub fn remove_path(&mut self, path: impl AsRef<Path>) -> Result<bool, TreeError> {
        let path = path.as_ref().normalize_path().context(InvalidPathSnafu)?;
        if !self.roots.remove(&path) {
            return Ok(false);
        }

        let mut detached = BTreeMap::new();
        if let Some(entry) = self.entries.remove(&path) {
            for child in entry.into_children() {
                detach_registered(child, &self.roots, &mut detached);
            }
        } else if !self.mode.is_recursive() {
            // Still a child of another flat root: keep the node, forget its contents
            let collapsed = find_mut(&mut self.entries, &path).and_then(PathEntry::collapse);
            for child in collapsed.into_iter().flat_map(BTreeMap::into_values) {
                detach_registered(child, &self.roots, &mut detached);
            }
        }
        self.entries.extend(detached);

        info!("Stopped watching {}", path.display());
        Ok(true)
    }

    /// Reconciles the subtree at `path` with the filesystem and reports the changes.
    ///
    /// `path` may be a tracked path, a new path directly inside a tracked directory, a
    /// registered root or an ancestor of roots. Anything else is ignored. NotFound is
    /// handled as deletion. Any other read failure stops the scan of the affected
    /// subtree and is returned; changes reported before it stay applied.
    pub fn update_path(&mut self, path: impl AsRef<Path>) -> Result<(), TreeError> {
        let path = path.as_ref().normalize_path().context(InvalidPathSnafu)?;

        let inside_parent = path
            .parent()
            .and_then(|parent| find(&self.entries, parent))
            .is_some_and(PathEntry::is_expanded);

        let top_level =
            self.entries.contains_key(&path) || (!inside_parent && self.roots.contains(&path));
        if top_level {
            self.reconcile_top_level(&path)?;
        } else if inside_parent {
            self.reconcile_child(&path)?;
        }

        // Flat scans stop above separately registered roots, so visit those directly
        let below = self.roots_strictly_below(&path);
        if !top_level && !inside_parent && below.is_empty() {
            debug!("Nothing watched at or below {}", path.display());
            return Ok(());
        }
        for root in below {
            if self.entries.contains_key(&root) || find(&self.entries, &root).is_none() {
                self.reconcile_top_level(&root)?;
            }
        }
        Ok(())
    }

    /// Reconciles every registered root. A failing root does not stop the others; the
    /// first error is returned once all have been visited.
    pub fn update_all(&mut self) -> Result<(), TreeError> {
        let targets: BTreeSet<PathBuf> = self
            .entries
            .keys()
            .chain(&self.roots)
            .cloned()
            .collect();

        let mut first_error = None;
        for root in targets {
            let top_level = self.entries.contains_key(&root);
            if !top_level && find(&self.entries, &root).is_some() {
                // absorbed by an ancestor reconciled earlier in this pass
                continue;
            }

            if let Err(err) = self.reconcile_top_level(&root) {
                warn!("Failed to reconcile {}: {}", root.display(), err);
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Top-level keys and registered roots strictly below `path`, shallowest first
    fn roots_strictly_below(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.entries
            .keys()
            .chain(&self.roots)
            .filter(|root| is_strictly_below(root, path))
            .cloned()
            .collect()
    }

    fn reconcile_top_level(&mut self, path: &Path) -> Result<(), TreeError> {
        let orphans = take_strictly_below(&mut self.entries, path);
        let mut slot = self.entries.remove(path);

        let mut scanner = Scanner::new(&self.reader, &mut self.listener, &self.roots, self.mode)
            .with_orphans(orphans);
        let result = scanner.reconcile(path, &mut slot);
        let unreached = scanner.into_orphans();

        if let Some(entry) = slot {
            self.entries.insert(path.to_path_buf(), entry);
        }
        self.entries.extend(unreached);
        result.context(ScanSnafu)
    }

    fn reconcile_child(&mut self, path: &Path) -> Result<(), TreeError> {
        let orphans = take_strictly_below(&mut self.entries, path);

        let children = path
            .parent()
            .and_then(|parent| find_mut(&mut self.entries, parent))
            .and_then(PathEntry::children_mut);
        let (Some(children), Some(name)) = (children, path.file_name()) else {
            self.entries.extend(orphans);
            return Ok(());
        };

        let mut slot = children.remove(name);
        let mut scanner = Scanner::new(&self.reader, &mut self.listener, &self.roots, self.mode)
            .with_orphans(orphans);
        let result = scanner.reconcile(path, &mut slot);
        let unreached = scanner.into_orphans();

        if let Some(entry) = slot {
            children.insert(name.to_os_string(), entry);
        }
        self.entries.extend(unreached);
        result.context(ScanSnafu)
    }
}

fn is_strictly_below(candidate: &Path, ancestor: &Path) -> bool {
    candidate != ancestor && candidate.starts_with(ancestor)
}

/// Looks `path` up below the deepest top-level entry that contains it.
fn find<'a>(entries: &'a BTreeMap<PathBuf, PathEntry>, path: &Path) -> Option<&'a PathEntry> {
    entries.iter().rev().find_map(|(key, entry)| {
        let relative = path.strip_prefix(key).ok()?;
        entry.descendant(relative)
    })
}

fn find_mut<'a>(
    entries: &'a mut BTreeMap<PathBuf, PathEntry>,
    path: &Path,
) -> Option<&'a mut PathEntry> {
    entries.iter_mut().rev().find_map(|(key, entry)| {
        let relative = path.strip_prefix(key).ok()?;
        entry.descendant_mut(relative)
    })
}

fn take_strictly_below(
    entries: &mut BTreeMap<PathBuf, PathEntry>,
    path: &Path,
) -> BTreeMap<PathBuf, PathEntry> {
    let keys: Vec<PathBuf> = entries
        .keys()
        .filter(|key| is_strictly_below(key, path))
        .cloned()
        .collect();
    keys.into_iter()
        .filter_map(|key| entries.remove_entry(&key))
        .collect()
}

/// Moves registered roots found in `entry`'s subtree into `detached`, dropping the rest.
fn detach_registered(
    entry: PathEntry,
    roots: &BTreeSet<PathBuf>,
    detached: &mut BTreeMap<PathBuf, PathEntry>,
) {
    if roots.contains(entry.path()) {
        detached.insert(entry.path().to_path_buf(), entry);
        return;
    }
    for child in entry.into_children() {
        detach_registered(child, roots, detached);
    }
}

#[derive(Debug, Snafu)]
pub enum TreeError {
    #[snafu(display("Invalid path"))]
    InvalidPathError { source: NormalizePathError },
    #[snafu(display("Failed to scan {}", source.path().display()))]
    ScanError { source: ReadError },
}

impl TreeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TreeError::ScanError { source } if source.is_not_found())
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TreeError::ScanError { source } if source.is_permission_denied())
    }
}
