use std::path::Path;

use colored::Colorize;
use supports_color::Stream;
use treewatch::filesystem::{ChangeKind, ChangeListener};

/// Prints one line per change to stdout. The default listener prints plain markers.
#[derive(Debug, Default)]
pub struct ConsoleListener {
    colored: bool,
}

impl ConsoleListener {
    /// Colours the markers when stdout supports it
    pub fn for_stdout() -> Self {
        Self {
            colored: supports_color::on(Stream::Stdout).is_some(),
        }
    }

    fn render(&self, kind: ChangeKind, path: &Path) -> String {
        let marker = match kind {
            ChangeKind::Added => "+",
            ChangeKind::Modified => "~",
            ChangeKind::Deleted => "-",
        };
        if !self.colored {
            return format!("{marker} {}", path.display());
        }

        let marker = match kind {
            ChangeKind::Added => marker.green().bold(),
            ChangeKind::Modified => marker.yellow().bold(),
            ChangeKind::Deleted => marker.red().bold(),
        };
        format!("{marker} {}", path.display())
    }
}

impl ChangeListener for ConsoleListener {
    fn on_added(&mut self, path: &Path) {
        println!("{}", self.render(ChangeKind::Added, path));
    }

    fn on_modified(&mut self, path: &Path) {
        println!("{}", self.render(ChangeKind::Modified, path));
    }

    fn on_deleted(&mut self, path: &Path) {
        println!("{}", self.render(ChangeKind::Deleted, path));
    }
}
