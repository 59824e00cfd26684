use crate::config::load_controller_config;
use crate::core::start_controller_with_config;
use relay_config::shared::ControllerConfig;
use relay_telemetry::tracing::init_tracing;
use tracing::error;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    let controller_config = load_controller_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(controller_config))?;

    Ok(())
}

async fn async_main(controller_config: ControllerConfig) -> anyhow::Result<()> {
    if let Err(err) = start_controller_with_config(controller_config).await {
        error!("an error occurred in the controller: {err}");

        return Err(err);
    }

    Ok(())
}
