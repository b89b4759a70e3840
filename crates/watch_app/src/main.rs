mod api;
mod config;
mod logging;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use engine_logging::engine_info;
use watch_engine::{LocalStore, SiteStore};

use crate::config::AppConfig;
use crate::runner::Runner;

/// Watches web pages and reports when what matters on them changes.
#[derive(Debug, Parser)]
#[command(name = "sitewatch", version)]
struct Cli {
    /// RON settings file; missing fields and a missing file use defaults.
    #[arg(long, default_value = "sitewatch.ron")]
    config: PathBuf,

    /// Run a single scan cycle now, ignoring active hours, then exit.
    #[arg(long)]
    once: bool,

    /// Do not serve the management API.
    #[arg(long)]
    no_api: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    logging::initialize(config.log_destination);

    let store = LocalStore::open(&config.store_path)
        .with_context(|| format!("opening store {:?}", config.store_path))?;
    let store: Arc<dyn SiteStore> = Arc::new(store);
    engine_info!("sitewatch started with store {:?}", config.store_path);

    if !cli.no_api && !cli.once {
        api::spawn(config.api_addr, store.clone());
    }

    let mut runner = Runner::new(&config, store)?;
    if cli.once {
        runner.run_once();
        return Ok(());
    }
    runner.run_forever()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from(["sitewatch", "--once", "--config", "other.ron"]);
        assert!(cli.once);
        assert!(!cli.no_api);
        assert_eq!(cli.config, PathBuf::from("other.ron"));

        let cli = Cli::parse_from(["sitewatch"]);
        assert_eq!(cli.config, PathBuf::from("sitewatch.ron"));
    }
}
