mod aave;
mod compound;
mod contracts;
mod dashboard;
mod filter;
mod merger;
mod metadata;
mod poller;
mod types;
mod utils;
mod view;

use crate::types::{Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("[main] Starting up...");

    let config = Config::from_env()?;
    log::info!(
        "[main] Aave LendingPool {:?}, Compound Comptroller {:?}, refresh every {:?}",
        config.aave_lending_pool,
        config.compound_comptroller,
        config.poll_interval
    );

    dashboard::run(config).await?;

    log::info!("[main] All tasks finished. Exiting.");
    Ok(())
}
