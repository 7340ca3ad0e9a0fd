use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    string::FromUtf8Error,
};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "treewatch.yaml";

/// Settings read from a `treewatch.yaml` file. Unset fields defer to the command line
/// or to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchConfig {
    pub roots: Vec<PathBuf>,
    pub recursive: Option<bool>,
    pub interval_ms: Option<u64>,
}

impl WatchConfig {
    /// Reads `treewatch.yaml` from `dir`. A missing file yields the defaults.
    pub async fn read_default(dir: &Path) -> Result<Self, WatchConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        match fs::read(&path).await {
            Ok(bytes) => Self::from_bytes(&path, bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, dir.display());
                Ok(Self::default())
            }
            Err(source) => Err(WatchConfigError::ReadError {
                file_path: path.display().to_string(),
                source,
            }),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, WatchConfigError> {
        debug!("Reading config file: {}", path.display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.display().to_string(),
        })?;
        Self::from_bytes(path, bytes)
    }

    /// Relative roots are taken relative to the directory holding the config file
    fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self, WatchConfigError> {
        debug!("Read config file: {} bytes", bytes.len());
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.display().to_string(),
        })?;
        let mut config = Self::try_from(contents.as_str())?;

        if let Some(base) = path.parent() {
            config.roots = config.roots.into_iter().map(|root| base.join(root)).collect();
        }
        Ok(config)
    }

    fn parse_roots(value: &Yaml) -> Result<Vec<PathBuf>, WatchConfigError> {
        value
            .as_sequence()
            .context(RootsNotSequenceSnafu)?
            .iter()
            .map(|item| {
                item.as_str()
                    .filter(|root| !root.is_empty())
                    .map(PathBuf::from)
                    .context(InvalidValueSnafu { key: "roots" })
            })
            .collect()
    }

    fn parse_recursive(value: &Yaml) -> Result<bool, WatchConfigError> {
        match value {
            Yaml::Value(Scalar::Boolean(recursive)) => Ok(*recursive),
            _ => InvalidValueSnafu { key: "recursive" }.fail(),
        }
    }

    fn parse_interval(value: &Yaml) -> Result<u64, WatchConfigError> {
        match value {
            Yaml::Value(Scalar::Integer(ms)) => u64::try_from(*ms)
                .ok()
                .filter(|ms| *ms > 0)
                .context(InvalidValueSnafu { key: "interval_ms" }),
            _ => InvalidValueSnafu { key: "interval_ms" }.fail(),
        }
    }

    fn parse_top_level(top_level: &LinkedHashMap<Yaml, Yaml>) -> Result<Self, WatchConfigError> {
        let mut config = Self::default();
        for (key, value) in top_level {
            match key.as_str() {
                Some("roots") => config.roots = Self::parse_roots(value)?,
                Some("recursive") => config.recursive = Some(Self::parse_recursive(value)?),
                Some("interval_ms") => config.interval_ms = Some(Self::parse_interval(value)?),
                _ => debug!("Ignoring unknown config key: {:?}", key),
            }
        }
        Ok(config)
    }
}

impl TryFrom<&str> for WatchConfig {
    type Error = WatchConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().context(MalformedConfigSnafu)?;
        let top_level = document.as_mapping().context(TopLevelNotMapSnafu)?;

        Self::parse_top_level(top_level)
    }
}

#[derive(Debug, Snafu)]
pub enum WatchConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Config file {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted config file"))]
    MalformedConfig,
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("'roots' should be a list of paths"))]
    RootsNotSequence,
    #[snafu(display("Invalid value for '{}'", key))]
    InvalidValue { key: String },
}
