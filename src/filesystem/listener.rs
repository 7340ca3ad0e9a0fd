use std::path::{Path, PathBuf};

use derive_more::Display;

/// Receives change notifications from a [`PathTree`](crate::filesystem::PathTree).
///
/// Calls are made synchronously, in the order the scanner discovers changes; the scan
/// waits for each call to return before continuing.
pub trait ChangeListener {
    fn on_added(&mut self, path: &Path);
    fn on_modified(&mut self, path: &Path);
    fn on_deleted(&mut self, path: &Path);

    fn on_change(&mut self, event: &ChangeEvent) {
        match event.kind {
            ChangeKind::Added => self.on_added(&event.path),
            ChangeKind::Modified => self.on_modified(&event.path),
            ChangeKind::Deleted => self.on_deleted(&event.path),
        }
    }
}

impl<L: ChangeListener + ?Sized> ChangeListener for &mut L {
    fn on_added(&mut self, path: &Path) {
        (**self).on_added(path);
    }

    fn on_modified(&mut self, path: &Path) {
        (**self).on_modified(path);
    }

    fn on_deleted(&mut self, path: &Path) {
        (**self).on_deleted(path);
    }
}

impl<L: ChangeListener + ?Sized> ChangeListener for Box<L> {
    fn on_added(&mut self, path: &Path) {
        (**self).on_added(path);
    }

    fn on_modified(&mut self, path: &Path) {
        (**self).on_modified(path);
    }

    fn on_deleted(&mut self, path: &Path) {
        (**self).on_deleted(path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ChangeKind {
    #[display("added")]
    Added,
    #[display("modified")]
    Modified,
    #[display("deleted")]
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{kind} {}", path.display())]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Added,
            path: path.into(),
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Modified,
            path: path.into(),
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            path: path.into(),
        }
    }
}

/// Listener that records every notification in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLog {
    events: Vec<ChangeEvent>,
}

impl ChangeLog {
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.events
    }

    /// Forwards the recorded events, in order, to another listener.
    pub fn replay_into<L: ChangeListener + ?Sized>(self, listener: &mut L) {
        for event in &self.events {
            listener.on_change(event);
        }
    }
}

impl ChangeListener for ChangeLog {
    fn on_added(&mut self, path: &Path) {
        self.events.push(ChangeEvent::added(path));
    }

    fn on_modified(&mut self, path: &Path) {
        self.events.push(ChangeEvent::modified(path));
    }

    fn on_deleted(&mut self, path: &Path) {
        self.events.push(ChangeEvent::deleted(path));
    }
}
