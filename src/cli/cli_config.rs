use std::path::PathBuf;

use clap::Parser;

use crate::cli::LogLevel;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Polls directory trees and prints what changed")]
pub struct Cli {
    /// Paths to watch. Falls back to the roots of the config file, then to `.`
    pub roots: Vec<PathBuf>,

    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// Config file to read instead of `treewatch.yaml` in the current directory
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Track only the roots and their immediate children
    #[clap(long)]
    pub flat: bool,

    /// Milliseconds between two scans
    #[clap(long, short)]
    pub interval_ms: Option<u64>,

    /// Print the initial scan and exit
    #[clap(long)]
    pub once: bool,
}
