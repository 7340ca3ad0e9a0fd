use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use snafu::Snafu;
use tracing::trace;

use crate::filesystem::EntryKind;

/// What a single stat of a path reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMetadata {
    pub kind: EntryKind,
    pub modified: Option<SystemTime>,
}

impl From<&Metadata> for NodeMetadata {
    fn from(metadata: &Metadata) -> Self {
        Self {
            kind: metadata.file_type().into(),
            modified: metadata.modified().ok(),
        }
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: OsString,
    pub kind: EntryKind,
}

/// Read access to the filesystem. Every live read the tree performs goes through this.
///
/// Implementations must report a missing path as [`ReadError::NotFoundError`] and a
/// refused one as [`ReadError::PermissionDeniedError`]: the first means "deleted" to the
/// scanner, the second is surfaced to the caller.
pub trait FilesystemReader {
    /// Stats `path` without following a final symlink.
    fn metadata(&self, path: &Path) -> Result<NodeMetadata, ReadError>;

    /// Stats `path`, resolving a final symlink. Used for watched roots only, so a root
    /// that links to a directory is scanned like the directory itself.
    fn resolved_metadata(&self, path: &Path) -> Result<NodeMetadata, ReadError> {
        self.metadata(path)
    }

    /// Lists the immediate children of the directory at `path`.
    fn read_dir(&self, path: &Path) -> Result<Vec<ChildEntry>, ReadError>;

    fn exists(&self, path: &Path) -> Result<bool, ReadError> {
        match self.metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl<R: FilesystemReader + ?Sized> FilesystemReader for &R {
    fn metadata(&self, path: &Path) -> Result<NodeMetadata, ReadError> {
        (**self).metadata(path)
    }

    fn resolved_metadata(&self, path: &Path) -> Result<NodeMetadata, ReadError> {
        (**self).resolved_metadata(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<ChildEntry>, ReadError> {
        (**self).read_dir(path)
    }
}

/// [`FilesystemReader`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFilesystemReader;

impl FilesystemReader for StdFilesystemReader {
    fn metadata(&self, path: &Path) -> Result<NodeMetadata, ReadError> {
        let metadata =
            fs::symlink_metadata(path).map_err(|source| ReadError::from_io(path, source))?;
        Ok(NodeMetadata::from(&metadata))
    }

    fn resolved_metadata(&self, path: &Path) -> Result<NodeMetadata, ReadError> {
        let metadata = fs::metadata(path).map_err(|source| ReadError::from_io(path, source))?;
        Ok(NodeMetadata::from(&metadata))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<ChildEntry>, ReadError> {
        let mut children = Vec::new();

        for entry in fs::read_dir(path).map_err(|source| ReadError::from_io(path, source))? {
            let entry = entry.map_err(|source| ReadError::from_io(path, source))?;
            match entry.file_type() {
                Ok(file_type) => children.push(ChildEntry {
                    name: entry.file_name(),
                    kind: file_type.into(),
                }),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    trace!("{} vanished while listing", entry.path().display());
                }
                Err(source) => return Err(ReadError::from_io(&entry.path(), source)),
            }
        }

        Ok(children)
    }
}

#[derive(Debug, Snafu)]
pub enum ReadError {
    #[snafu(display("Path {} does not exist", path.display()))]
    NotFoundError { path: PathBuf },
    #[snafu(display("Permission denied while reading {}", path.display()))]
    PermissionDeniedError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to read {}", path.display()))]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ReadError {
    /// Classifies an I/O failure on `path`
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            ErrorKind::NotFound => ReadError::NotFoundError { path },
            ErrorKind::PermissionDenied => ReadError::PermissionDeniedError { path, source },
            _ => ReadError::IoError { path, source },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ReadError::NotFoundError { path }
            | ReadError::PermissionDeniedError { path, .. }
            | ReadError::IoError { path, .. } => path,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadError::NotFoundError { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ReadError::PermissionDeniedError { .. })
    }
}
