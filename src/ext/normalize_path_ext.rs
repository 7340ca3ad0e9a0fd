use std::env;
use std::path::{Component, Path, PathBuf};

use snafu::{ResultExt, Snafu, ensure};

/// Turns `path` into the identifier the tree uses for it: absolute, with `.` and `..`
/// resolved lexically and no trailing separator. Symlinks are not resolved.
pub fn normalize_path(path: &Path) -> Result<PathBuf, NormalizePathError> {
    ensure!(!path.as_os_str().is_empty(), EmptyPathSnafu);
    ensure!(
        !path.as_os_str().as_encoded_bytes().contains(&0),
        NulBytePathSnafu {
            path: path.to_path_buf()
        }
    );

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().context(CurrentDirSnafu)?.join(path)
    };

    Ok(collapse_components(&absolute))
}

fn collapse_components(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` never climbs above the root or a drive prefix
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

pub trait NormalizePathExt {
    fn normalize_path(&self) -> Result<PathBuf, NormalizePathError>;
}

impl<P: AsRef<Path> + ?Sized> NormalizePathExt for P {
    fn normalize_path(&self) -> Result<PathBuf, NormalizePathError> {
        normalize_path(self.as_ref())
    }
}

#[derive(Debug, Snafu)]
pub enum NormalizePathError {
    #[snafu(display("Path is empty"))]
    EmptyPathError,
    #[snafu(display("Path {} contains a NUL byte", path.display()))]
    NulBytePathError { path: PathBuf },
    #[snafu(display("Failed to obtain current dir"))]
    CurrentDirError { source: std::io::Error },
}
