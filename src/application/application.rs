use std::{path::Path, pin::pin, time::Duration};

use futures::{FutureExt as _, select};
use snafu::{Report, prelude::*};
use tracing::{debug, info, warn};
use treewatch::filesystem::PathTree;

use crate::{
    application::{ConsoleListener, RuntimeConfig},
    cli::Cli,
    config::{WatchConfig, WatchConfigError},
};

pub struct Application;

impl Application {
    pub async fn run(cli: Cli) -> Result<(), ApplicationError> {
        let config = match &cli.config {
            Some(path) => WatchConfig::from_path(path).await,
            None => WatchConfig::read_default(Path::new(".")).await,
        }
        .context(ConfigSnafu)?;
        debug!("Loaded config: {:?}", config);

        let runtime_config = RuntimeConfig::resolve(cli, config);
        debug!("Runtime config: {:?}", runtime_config);

        let mut tree = Self::build_tree(&runtime_config)?;
        info!(
            "Watching {} roots, {} nodes tracked",
            runtime_config.roots.len(),
            tree.len()
        );

        if runtime_config.once {
            return Ok(());
        }
        Self::poll(&mut tree, runtime_config.interval).await;

        Ok(())
    }

    fn build_tree(
        runtime_config: &RuntimeConfig,
    ) -> Result<PathTree<ConsoleListener>, ApplicationError> {
        let mut tree = PathTree::new(ConsoleListener::for_stdout(), runtime_config.mode);
        for root in &runtime_config.roots {
            if let Err(err) = tree.add_path(root) {
                warn!("Cannot watch {}: {}", root.display(), Report::from_error(err));
            }
        }
        ensure!(tree.roots().next().is_some(), NoWatchableRootSnafu);
        Ok(tree)
    }

    async fn poll(tree: &mut PathTree<ConsoleListener>, interval: Duration) {
        let mut ticker = compio::time::interval(interval);
        let mut shutdown = pin!(compio::signal::ctrl_c().fuse());

        loop {
            select! {
                result = shutdown => {
                    if let Err(err) = result {
                        warn!("Failed to listen for ctrl-c: {}", err);
                    }
                    info!("Stopping watch");
                    break;
                }
                _ = ticker.tick().fuse() => {
                    if let Err(err) = tree.update_all() {
                        warn!("Scan incomplete: {}", Report::from_error(err));
                    }
                }
            }
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: WatchConfigError },
    #[snafu(display("None of the requested roots could be watched"))]
    NoWatchableRootError,
}
