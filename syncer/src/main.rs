//! Catalog sync binary.
//!
//! Loads the configuration, initializes tracing and metrics, then runs one reconciliation of the
//! local record store against the reference catalog.

use ::config::shared::SyncerConfig;
use telemetry::metrics::init_metrics;
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_syncer_config;
use crate::core::start_syncer_with_config;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    let syncer_config = load_syncer_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    init_metrics(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(syncer_config))?;

    Ok(())
}

async fn async_main(syncer_config: SyncerConfig) -> anyhow::Result<()> {
    if let Err(err) = start_syncer_with_config(syncer_config).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
