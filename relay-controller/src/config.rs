use relay_config::load_config;
use relay_config::shared::ControllerConfig;

/// Loads the [`ControllerConfig`] and validates it.
pub fn load_controller_config() -> anyhow::Result<ControllerConfig> {
    let config = load_config::<ControllerConfig>()?;
    config.validate()?;

    Ok(config)
}
