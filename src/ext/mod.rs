mod normalize_path_ext;

pub use normalize_path_ext::{NormalizePathError, NormalizePathExt, normalize_path};
