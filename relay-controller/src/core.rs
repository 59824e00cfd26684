use relay::channel::MessageSource;
use relay::channel::memory::MemoryMessageSource;
use relay::channel::pubsub::PubSubMessageSource;
use relay::controller::Controller;
use relay::discovery::ServiceResolver;
use relay::discovery::kube::KubeServiceResolver;
use relay::dispatch::Dispatcher;
use relay::dispatch::http::HttpDispatcher;
use relay::watch::TriggerFeed;
use relay::watch::kube::KubeTriggerFeed;
use relay_config::shared::{ControllerConfig, RetryConfig, SourceConfig, WatchConfig};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

/// Starts the controller service with the provided configuration.
///
/// Connects to the cluster, wires the trigger feed, service resolver, and
/// dispatcher to the configured message source, and runs the controller
/// until it finishes or a shutdown signal arrives.
pub async fn start_controller_with_config(
    controller_config: ControllerConfig,
) -> anyhow::Result<()> {
    info!("starting controller service");

    log_config(&controller_config);

    // A single cluster client is shared by the trigger watch and the service
    // resolver.
    let client = kube::Client::try_default().await?;
    let feed = KubeTriggerFeed::new(client.clone(), &controller_config.watch);
    let resolver = KubeServiceResolver::new(client, controller_config.watch.namespace.as_deref());
    let dispatcher = HttpDispatcher::new();

    let controller_config = Arc::new(controller_config);

    // For each source, we start the controller. This is more verbose due to
    // static dispatch, but we prefer more performance at the cost of
    // ergonomics.
    match &controller_config.source {
        SourceConfig::Memory => {
            let source = MemoryMessageSource::new();

            let controller =
                Controller::new(controller_config.clone(), feed, source, resolver, dispatcher);
            start_controller(controller).await?;
        }
        SourceConfig::PubSub {
            service_account_key,
        } => {
            let source = PubSubMessageSource::new(
                service_account_key
                    .as_ref()
                    .map(|key| key.expose_secret().to_string()),
            );

            let controller =
                Controller::new(controller_config.clone(), feed, source, resolver, dispatcher);
            start_controller(controller).await?;
        }
    }

    info!("controller service completed");

    Ok(())
}

fn log_config(config: &ControllerConfig) {
    log_source_config(&config.source);
    log_watch_config(&config.watch);
    log_retry_config(&config.retry);
}

fn log_source_config(config: &SourceConfig) {
    match config {
        SourceConfig::Memory => {
            debug!("using memory channel source config");
        }
        SourceConfig::PubSub {
            service_account_key,
        } => {
            debug!(
                has_service_account_key = service_account_key.is_some(),
                "using pub/sub channel source config"
            );
        }
    }
}

fn log_watch_config(config: &WatchConfig) {
    debug!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        timeout_secs = config.timeout_secs,
        "trigger watch config"
    );
}

fn log_retry_config(config: &RetryConfig) {
    debug!(
        max_attempts = config.max_attempts,
        initial_delay_ms = config.initial_delay_ms,
        max_delay_ms = config.max_delay_ms,
        backoff_factor = config.backoff_factor,
        "retry config"
    );
}

/// Starts a controller and handles graceful shutdown signals.
///
/// Launches the controller, sets up signal handlers for SIGTERM and SIGINT,
/// and ensures proper cleanup on shutdown. Trigger workers finish their
/// in-flight message before terminating.
async fn start_controller<F, S, R, D>(
    mut controller: Controller<F, S, R, D>,
) -> anyhow::Result<()>
where
    F: TriggerFeed + Clone + Send + Sync + 'static,
    S: MessageSource + Clone + Send + Sync + 'static,
    R: ServiceResolver + Clone + Send + Sync + 'static,
    D: Dispatcher + Clone + Send + Sync + 'static,
{
    // Start the controller.
    controller.start().await?;

    // Spawn a task to listen for shutdown signals and trigger shutdown.
    let shutdown_tx = controller.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        // Listen for SIGTERM, sent by Kubernetes before SIGKILL during pod
        // termination.
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT (Ctrl+C) received, shutting down controller");
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down controller");
            }
        }

        if let Err(e) = shutdown_tx.shutdown() {
            warn!("failed to send shutdown signal: {:?}", e);
            return;
        }

        info!("controller shutdown successfully")
    });

    // Wait for the controller to finish (either normally or via shutdown).
    let result = controller.wait().await;

    // Ensure the shutdown task is finished before returning.
    // If the controller finished before a signal arrived, the task is still
    // waiting on one and must be aborted.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    // Propagate any controller error as anyhow error.
    result?;

    Ok(())
}
