use ::config::load_config;
use ::config::shared::SyncerConfig;

/// Loads and validates the syncer configuration.
pub fn load_syncer_config() -> anyhow::Result<SyncerConfig> {
    let config = load_config::<SyncerConfig>()?;
    config.validate()?;

    Ok(config)
}
