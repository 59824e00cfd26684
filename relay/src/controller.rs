use relay_config::shared::ControllerConfig;
use std::sync::Arc;
use tracing::{error, info};

use crate::bail;
use crate::channel::MessageSource;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::discovery::ServiceResolver;
use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, RelayResult};
use crate::watch::TriggerFeed;
use crate::watch::reconcile::{ReconcileWorker, ReconcileWorkerHandle};
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::registry::TriggerRegistry;

enum ControllerState {
    NotStarted,
    Started {
        reconcile_worker: ReconcileWorkerHandle,
    },
}

/// Ties together a trigger feed, a message source, a service resolver, and a
/// dispatcher into the running relay service.
///
/// Starting the controller launches the reconcile worker, which in turn
/// starts one trigger worker per trigger in the feed. Shutdown stops the
/// reconcile worker first; it then stops every trigger worker and waits for
/// each to finish its in-flight message.
pub struct Controller<F, S, R, D> {
    config: Arc<ControllerConfig>,
    feed: F,
    source: S,
    resolver: R,
    dispatcher: D,
    registry: TriggerRegistry,
    state: ControllerState,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<F, S, R, D> Controller<F, S, R, D>
where
    F: TriggerFeed + Clone + Send + Sync + 'static,
    S: MessageSource + Clone + Send + Sync + 'static,
    R: ServiceResolver + Clone + Send + Sync + 'static,
    D: Dispatcher + Clone + Send + Sync + 'static,
{
    pub fn new(
        config: Arc<ControllerConfig>,
        feed: F,
        source: S,
        resolver: R,
        dispatcher: D,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Self {
            config,
            feed,
            source,
            resolver,
            dispatcher,
            registry: TriggerRegistry::new(),
            state: ControllerState::NotStarted,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Starts the controller's reconcile worker.
    ///
    /// Fails when the controller was already started.
    pub async fn start(&mut self) -> RelayResult<()> {
        if let ControllerState::Started { .. } = self.state {
            bail!(ErrorKind::InvalidState, "Controller already started");
        }

        info!("starting controller");

        let worker = ReconcileWorker::new(
            self.config.clone(),
            self.feed.clone(),
            self.source.clone(),
            self.resolver.clone(),
            self.dispatcher.clone(),
            self.registry.clone(),
            self.shutdown_rx.clone(),
        );
        let reconcile_worker = worker.start().await?;
        self.state = ControllerState::Started { reconcile_worker };

        Ok(())
    }

    /// Waits for the controller to terminate.
    ///
    /// The controller terminates once shutdown has been requested and every
    /// trigger worker has stopped. Waiting on a controller that was never
    /// started returns immediately.
    pub async fn wait(self) -> RelayResult<()> {
        match self.state {
            ControllerState::NotStarted => {
                info!("controller was never started");
                Ok(())
            }
            ControllerState::Started { reconcile_worker } => {
                let result = reconcile_worker.wait().await;
                info!("controller stopped");
                result
            }
        }
    }

    /// Requests a graceful shutdown.
    pub fn shutdown(&self) {
        info!("controller shutdown requested");
        if let Err(err) = self.shutdown_tx.shutdown() {
            error!(error = %err, "failed to send shutdown signal");
        }
    }

    /// Requests a graceful shutdown and waits for it to complete.
    pub async fn shutdown_and_wait(self) -> RelayResult<()> {
        self.shutdown();
        self.wait().await
    }

    /// Returns the registry of running trigger workers.
    pub fn registry(&self) -> TriggerRegistry {
        self.registry.clone()
    }

    /// Returns a handle that can request shutdown from elsewhere.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }
}
