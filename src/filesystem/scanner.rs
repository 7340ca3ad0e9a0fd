use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use derive_more::Display;
use tracing::{debug, trace};

use crate::filesystem::{ChangeListener, FilesystemReader, NodeMetadata, PathEntry, ReadError};

/// How deep a scan goes below a watched root. Fixed for the lifetime of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ScanMode {
    /// Track every descendant
    #[display("recursive")]
    Recursive,
    /// Track roots and their immediate children only
    #[display("flat")]
    Flat,
}

impl ScanMode {
    pub fn is_recursive(self) -> bool {
        self == ScanMode::Recursive
    }
}

impl From<bool> for ScanMode {
    fn from(recursive: bool) -> Self {
        if recursive {
            ScanMode::Recursive
        } else {
            ScanMode::Flat
        }
    }
}

/// Reconciles stored entries against the live filesystem, one subtree at a time.
///
/// Every change is applied to the entry and reported to the listener as soon as it is
/// found. When a read fails the scan stops where it is: changes already applied stay
/// applied and the error is returned.
///
/// `orphans` holds separately registered roots lying below the subtree being scanned.
/// When the scan reaches one of them it continues from that entry instead of
/// announcing the path as new, so a path is never tracked twice.
pub(crate) struct Scanner<'a, R: ?Sized, L: ?Sized> {
    reader: &'a R,
    listener: &'a mut L,
    roots: &'a BTreeSet<PathBuf>,
    mode: ScanMode,
    orphans: BTreeMap<PathBuf, PathEntry>,
}

impl<'a, R, L> Scanner<'a, R, L>
where
    R: FilesystemReader + ?Sized,
    L: ChangeListener + ?Sized,
{
    pub(crate) fn new(
        reader: &'a R,
        listener: &'a mut L,
        roots: &'a BTreeSet<PathBuf>,
        mode: ScanMode,
    ) -> Self {
        Self {
            reader,
            listener,
            roots,
            mode,
            orphans: BTreeMap::new(),
        }
    }

    pub(crate) fn with_orphans(mut self, orphans: BTreeMap<PathBuf, PathEntry>) -> Self {
        self.orphans = orphans;
        self
    }

    /// Orphans the scan never reached
    pub(crate) fn into_orphans(self) -> BTreeMap<PathBuf, PathEntry> {
        self.orphans
    }

    /// Brings `slot`, the stored state of `path`, in line with the filesystem.
    ///
    /// `None` in `slot` means the path is not tracked. On return `slot` is `None` if the
    /// path no longer exists, even when an error is returned.
    pub(crate) fn reconcile(
        &mut self,
        path: &Path,
        slot: &mut Option<PathEntry>,
    ) -> Result<(), ReadError> {
        let read = if self.roots.contains(path) {
            self.reader.resolved_metadata(path)
        } else {
            self.reader.metadata(path)
        };
        let live = match read {
            Ok(metadata) => metadata,
            Err(err) if err.is_not_found() => {
                if let Some(entry) = slot.take() {
                    self.emit_deleted(&entry);
                }
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if slot.is_none() {
            if let Some(orphan) = self.orphans.remove(path) {
                debug!("Adopting separately watched {}", path.display());
                *slot = Some(orphan);
            }
        }

        let still_present = match slot.as_ref().map(PathEntry::kind) {
            None => self.add(path, live, slot)?,
            Some(kind) if kind != live.kind => {
                debug!("{} changed from {} to {}", path.display(), kind, live.kind);
                if let Some(entry) = slot.take() {
                    self.emit_deleted(&entry);
                }
                self.add(path, live, slot)?
            }
            Some(_) => match slot.as_mut() {
                Some(entry) => self.refresh(entry, live)?,
                None => true,
            },
        };

        if !still_present {
            debug!("{} vanished during the scan", path.display());
            if let Some(entry) = slot.take() {
                self.emit_deleted(&entry);
            }
        }

        Ok(())
    }

    fn add(
        &mut self,
        path: &Path,
        live: NodeMetadata,
        slot: &mut Option<PathEntry>,
    ) -> Result<bool, ReadError> {
        let expanded = self.should_expand(path);
        let entry = slot.insert(PathEntry::new(
            path.to_path_buf(),
            live.kind,
            live.modified,
            expanded,
        ));

        trace!("added {}", path.display());
        self.listener.on_added(path);

        if entry.is_expanded() {
            return self.sync_children(entry);
        }
        Ok(true)
    }

    fn refresh(&mut self, entry: &mut PathEntry, live: NodeMetadata) -> Result<bool, ReadError> {
        if entry.modified() != live.modified {
            entry.set_modified(live.modified);
            trace!("modified {}", entry.path().display());
            self.listener.on_modified(entry.path());
        }

        if !entry.is_expanded() && self.should_expand(entry.path()) {
            entry.expand();
        }
        if entry.is_expanded() {
            return self.sync_children(entry);
        }
        Ok(true)
    }

    /// Diffs the tracked children of an expanded directory against a fresh listing.
    /// Returns `false` when the directory itself has disappeared.
    fn sync_children(&mut self, entry: &mut PathEntry) -> Result<bool, ReadError> {
        let path = entry.path().to_path_buf();
        let listing = match self.reader.read_dir(&path) {
            Ok(listing) => listing,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };
        let live_names: BTreeSet<OsString> = listing.into_iter().map(|child| child.name).collect();

        let Some(children) = entry.children_mut() else {
            return Ok(true);
        };

        let removed: Vec<OsString> = children
            .keys()
            .filter(|name| !live_names.contains(*name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(child) = children.remove(&name) {
                self.emit_deleted(&child);
            }
        }

        let (existing, added): (Vec<OsString>, Vec<OsString>) = live_names
            .into_iter()
            .partition(|name| children.contains_key(name));

        for name in existing.into_iter().chain(added) {
            let child_path = path.join(&name);
            let mut child = children.remove(&name);
            let result = self.reconcile(&child_path, &mut child);
            if let Some(child) = child {
                children.insert(name, child);
            }
            result?;
        }

        Ok(true)
    }

    /// Reports `entry` and everything below it as deleted, deepest first.
    fn emit_deleted(&mut self, entry: &PathEntry) {
        for child in entry.children() {
            self.emit_deleted(child);
        }
        trace!("deleted {}", entry.path().display());
        self.listener.on_deleted(entry.path());
    }

    fn should_expand(&self, path: &Path) -> bool {
        self.mode.is_recursive() || self.roots.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::fake_reader::FakeFilesystem;
    use crate::filesystem::{ChangeEvent, ChangeLog};
    use rstest::*;

    #[fixture]
    fn watch() -> FakeFilesystem {
        let fs = FakeFilesystem::new();
        fs.dir("/w")
            .file("/w/a.txt")
            .dir("/w/sub")
            .file("/w/sub/b.txt")
            .dir("/w/sub/deep")
            .file("/w/sub/deep/c.txt");
        fs
    }

    fn roots(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    fn scan(
        fs: &FakeFilesystem,
        mode: ScanMode,
        slot: &mut Option<PathEntry>,
    ) -> (Result<(), ReadError>, Vec<ChangeEvent>) {
        let roots = roots(&["/w"]);
        let mut log = ChangeLog::default();
        let result = Scanner::new(fs, &mut log, &roots, mode).reconcile(Path::new("/w"), slot);
        (result, log.into_events())
    }

    #[rstest]
    fn fresh_scan_adds_top_down(watch: FakeFilesystem) {
        let mut slot = None;
        let (result, events) = scan(&watch, ScanMode::Recursive, &mut slot);

        result.unwrap();
        assert_eq!(
            events,
            vec![
                ChangeEvent::added("/w"),
                ChangeEvent::added("/w/a.txt"),
                ChangeEvent::added("/w/sub"),
                ChangeEvent::added("/w/sub/b.txt"),
                ChangeEvent::added("/w/sub/deep"),
                ChangeEvent::added("/w/sub/deep/c.txt"),
            ]
        );
        assert_eq!(slot.unwrap().len(), 6);
    }

    #[rstest]
    fn flat_scan_stops_after_one_level(watch: FakeFilesystem) {
        let mut slot = None;
        let (result, events) = scan(&watch, ScanMode::Flat, &mut slot);

        result.unwrap();
        assert_eq!(
            events,
            vec![
                ChangeEvent::added("/w"),
                ChangeEvent::added("/w/a.txt"),
                ChangeEvent::added("/w/sub"),
            ]
        );
        let root = slot.unwrap();
        assert!(root.is_expanded());
        assert!(!root.child("sub".as_ref()).unwrap().is_expanded());
    }

    #[rstest]
    fn unchanged_filesystem_emits_nothing(watch: FakeFilesystem) {
        let mut slot = None;
        scan(&watch, ScanMode::Recursive, &mut slot).0.unwrap();
        let before = slot.clone();

        let (result, events) = scan(&watch, ScanMode::Recursive, &mut slot);

        result.unwrap();
        assert!(events.is_empty());
        assert_eq!(slot, before);
    }

    #[rstest]
    fn removed_subtree_is_deleted_bottom_up(watch: FakeFilesystem) {
        let mut slot = None;
        scan(&watch, ScanMode::Recursive, &mut slot).0.unwrap();

        watch.remove("/w/sub");
        let (result, events) = scan(&watch, ScanMode::Recursive, &mut slot);

        result.unwrap();
        assert_eq!(
            events,
            vec![
                ChangeEvent::deleted("/w/sub/b.txt"),
                ChangeEvent::deleted("/w/sub/deep/c.txt"),
                ChangeEvent::deleted("/w/sub/deep"),
                ChangeEvent::deleted("/w/sub"),
            ]
        );
        assert_eq!(slot.unwrap().len(), 2);
    }

    #[rstest]
    fn directory_modification_precedes_child_changes(watch: FakeFilesystem) {
        let mut slot = None;
        scan(&watch, ScanMode::Recursive, &mut slot).0.unwrap();

        watch.remove("/w/a.txt");
        watch.file("/w/new.txt");
        watch.touch("/w/sub/b.txt");
        watch.touch("/w");
        let (result, events) = scan(&watch, ScanMode::Recursive, &mut slot);

        result.unwrap();
        assert_eq!(
            events,
            vec![
                ChangeEvent::modified("/w"),
                ChangeEvent::deleted("/w/a.txt"),
                ChangeEvent::modified("/w/sub/b.txt"),
                ChangeEvent::added("/w/new.txt"),
            ]
        );
    }

    #[rstest]
    fn kind_change_is_delete_then_add(watch: FakeFilesystem) {
        let mut slot = None;
        scan(&watch, ScanMode::Recursive, &mut slot).0.unwrap();

        watch.remove("/w/sub");
        watch.file("/w/sub");
        let (result, events) = scan(&watch, ScanMode::Recursive, &mut slot);

        result.unwrap();
        assert_eq!(
            events,
            vec![
                ChangeEvent::deleted("/w/sub/b.txt"),
                ChangeEvent::deleted("/w/sub/deep/c.txt"),
                ChangeEvent::deleted("/w/sub/deep"),
                ChangeEvent::deleted("/w/sub"),
                ChangeEvent::added("/w/sub"),
            ]
        );
    }

    #[rstest]
    fn permission_denied_is_not_a_deletion(watch: FakeFilesystem) {
        let mut slot = None;
        scan(&watch, ScanMode::Recursive, &mut slot).0.unwrap();

        watch.touch("/w/a.txt");
        watch.deny("/w/sub");
        watch.file("/w/zzz.txt");
        let (result, events) = scan(&watch, ScanMode::Recursive, &mut slot);

        let err = result.unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(err.path(), Path::new("/w/sub"));
        // siblings reconciled before the failure stay applied, the ones after are skipped
        assert_eq!(events, vec![ChangeEvent::modified("/w/a.txt")]);

        let root = slot.unwrap();
        assert!(root.descendant(Path::new("sub/deep/c.txt")).is_some());
        assert!(root.child("zzz.txt".as_ref()).is_none());
    }

    #[rstest]
    fn directory_vanishing_before_listing_is_deleted(watch: FakeFilesystem) {
        let mut slot = None;
        scan(&watch, ScanMode::Recursive, &mut slot).0.unwrap();

        watch.vanish_on_list("/w/sub");
        let (result, events) = scan(&watch, ScanMode::Recursive, &mut slot);

        result.unwrap();
        assert_eq!(
            events,
            vec![
                ChangeEvent::deleted("/w/sub/b.txt"),
                ChangeEvent::deleted("/w/sub/deep/c.txt"),
                ChangeEvent::deleted("/w/sub/deep"),
                ChangeEvent::deleted("/w/sub"),
            ]
        );
        let root = slot.unwrap();
        assert!(root.child("sub".as_ref()).is_none());
        assert_eq!(root.len(), 2);

        let (result, events) = scan(&watch, ScanMode::Recursive, &mut Some(root));
        result.unwrap();
        assert!(events.is_empty());
    }

    #[rstest]
    fn vanished_root_is_deleted(watch: FakeFilesystem) {
        let mut slot = None;
        scan(&watch, ScanMode::Flat, &mut slot).0.unwrap();

        watch.remove("/w");
        let (result, events) = scan(&watch, ScanMode::Flat, &mut slot);

        result.unwrap();
        assert!(slot.is_none());
        assert_eq!(
            events,
            vec![
                ChangeEvent::deleted("/w/a.txt"),
                ChangeEvent::deleted("/w/sub"),
                ChangeEvent::deleted("/w"),
            ]
        );
    }

    #[rstest]
    fn missing_untracked_path_is_a_no_op(watch: FakeFilesystem) {
        let roots = roots(&[]);
        let mut log = ChangeLog::default();
        let mut slot = None;

        Scanner::new(&watch, &mut log, &roots, ScanMode::Recursive)
            .reconcile(Path::new("/elsewhere"), &mut slot)
            .unwrap();

        assert!(slot.is_none());
        assert!(log.is_empty());
    }

    #[rstest]
    fn orphan_is_adopted_instead_of_announced(watch: FakeFilesystem) {
        let roots = roots(&["/w", "/w/sub"]);

        let mut orphan_slot = None;
        let mut log = ChangeLog::default();
        Scanner::new(&watch, &mut log, &roots, ScanMode::Recursive)
            .reconcile(Path::new("/w/sub"), &mut orphan_slot)
            .unwrap();
        let orphan = orphan_slot.unwrap();

        watch.touch("/w/sub/b.txt");
        let mut log = ChangeLog::default();
        let mut slot = None;
        let mut scanner = Scanner::new(&watch, &mut log, &roots, ScanMode::Recursive)
            .with_orphans(BTreeMap::from([(PathBuf::from("/w/sub"), orphan)]));
        scanner.reconcile(Path::new("/w"), &mut slot).unwrap();
        assert!(scanner.into_orphans().is_empty());

        assert_eq!(
            log.into_events(),
            vec![
                ChangeEvent::added("/w"),
                ChangeEvent::added("/w/a.txt"),
                ChangeEvent::modified("/w/sub/b.txt"),
            ]
        );
        assert_eq!(slot.unwrap().len(), 6);
    }

    #[rstest]
    fn flat_mode_expands_registered_children(watch: FakeFilesystem) {
        let roots = roots(&["/w", "/w/sub"]);
        let mut log = ChangeLog::default();
        let mut slot = None;

        Scanner::new(&watch, &mut log, &roots, ScanMode::Flat)
            .reconcile(Path::new("/w"), &mut slot)
            .unwrap();

        assert_eq!(
            log.into_events(),
            vec![
                ChangeEvent::added("/w"),
                ChangeEvent::added("/w/a.txt"),
                ChangeEvent::added("/w/sub"),
                ChangeEvent::added("/w/sub/b.txt"),
                ChangeEvent::added("/w/sub/deep"),
            ]
        );
    }

    #[test]
    fn scan_mode_from_flag() {
        assert_eq!(ScanMode::from(true), ScanMode::Recursive);
        assert_eq!(ScanMode::from(false), ScanMode::Flat);
        assert_eq!(ScanMode::Flat.to_string(), "flat");
    }
}
