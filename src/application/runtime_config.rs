use std::{path::PathBuf, time::Duration};

use treewatch::filesystem::ScanMode;

use crate::{cli::Cli, config::WatchConfig};

const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Settings the watch loop runs with, after the command line has been layered over
/// the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub roots: Vec<PathBuf>,
    pub mode: ScanMode,
    pub interval: Duration,
    pub once: bool,
}

impl RuntimeConfig {
    pub fn resolve(cli: Cli, config: WatchConfig) -> Self {
        let roots = if !cli.roots.is_empty() {
            cli.roots
        } else if !config.roots.is_empty() {
            config.roots
        } else {
            vec![PathBuf::from(".")]
        };

        let recursive = !cli.flat && config.recursive.unwrap_or(true);
        let interval_ms = cli
            .interval_ms
            .or(config.interval_ms)
            .unwrap_or(DEFAULT_INTERVAL_MS)
            .max(1);

        Self {
            roots,
            mode: ScanMode::from(recursive),
            interval: Duration::from_millis(interval_ms),
            once: cli.once,
        }
    }
}
