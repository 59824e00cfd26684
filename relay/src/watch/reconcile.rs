use futures::StreamExt;
use relay_config::shared::ControllerConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::channel::MessageSource;
use crate::concurrency::shutdown::ShutdownRx;
use crate::discovery::ServiceResolver;
use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, RelayError, RelayResult};
use crate::relay_error;
use crate::types::{ChangeEvent, ChangeKind, Cursor};
use crate::utils::backoff::ExponentialBackoff;
use crate::watch::base::TriggerFeed;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::registry::TriggerRegistry;

/// Handle to the running reconcile worker.
#[derive(Debug)]
pub struct ReconcileWorkerHandle {
    handle: Option<JoinHandle<RelayResult<()>>>,
}

impl WorkerHandle<()> for ReconcileWorkerHandle {
    fn state(&self) {}

    async fn wait(mut self) -> RelayResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            relay_error!(
                ErrorKind::TriggerWorkerPanic,
                "Reconcile worker task failed",
                err.to_string()
            )
        })?
    }
}

/// Worker that keeps the trigger registry in sync with the trigger feed.
///
/// Runs the list-then-watch loop: list all triggers, apply them, then apply
/// changes from the watch stream while advancing a cursor. The cursor only
/// advances past events whose apply succeeded, so a restarted watch replays
/// everything the registry does not yet reflect. On an expired cursor the
/// loop falls back to a fresh listing.
pub struct ReconcileWorker<F, S, R, D> {
    config: Arc<ControllerConfig>,
    feed: F,
    source: S,
    resolver: R,
    dispatcher: D,
    registry: TriggerRegistry,
    shutdown_rx: ShutdownRx,
}

impl<F, S, R, D> ReconcileWorker<F, S, R, D> {
    pub fn new(
        config: Arc<ControllerConfig>,
        feed: F,
        source: S,
        resolver: R,
        dispatcher: D,
        registry: TriggerRegistry,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            config,
            feed,
            source,
            resolver,
            dispatcher,
            registry,
            shutdown_rx,
        }
    }
}

impl<F, S, R, D> Worker<ReconcileWorkerHandle, ()> for ReconcileWorker<F, S, R, D>
where
    F: TriggerFeed + Send + Sync + 'static,
    S: MessageSource + Clone + Send + Sync + 'static,
    R: ServiceResolver + Clone + Send + Sync + 'static,
    D: Dispatcher + Clone + Send + Sync + 'static,
{
    type Error = RelayError;

    async fn start(self) -> RelayResult<ReconcileWorkerHandle> {
        info!("starting reconcile worker");

        let reconcile_span = info_span!("reconcile_worker");
        let handle = tokio::spawn(
            start_reconcile_loop(
                self.feed,
                self.registry,
                self.source,
                self.resolver,
                self.dispatcher,
                self.config,
                self.shutdown_rx,
            )
            .instrument(reconcile_span),
        );

        Ok(ReconcileWorkerHandle {
            handle: Some(handle),
        })
    }
}

async fn start_reconcile_loop<F, S, R, D>(
    feed: F,
    registry: TriggerRegistry,
    source: S,
    resolver: R,
    dispatcher: D,
    config: Arc<ControllerConfig>,
    mut shutdown_rx: ShutdownRx,
) -> RelayResult<()>
where
    F: TriggerFeed + Send + Sync + 'static,
    S: MessageSource + Clone + Send + Sync + 'static,
    R: ServiceResolver + Clone + Send + Sync + 'static,
    D: Dispatcher + Clone + Send + Sync + 'static,
{
    let mut cursor: Option<Cursor> = None;
    let mut backoff = ExponentialBackoff::new(config.retry.clone());

    'session: loop {
        if cursor.is_none() {
            match feed.list().await {
                Ok((triggers, listed)) => {
                    info!(triggers = triggers.len(), "replaying trigger listing");

                    for resource in triggers {
                        let event = ChangeEvent {
                            kind: ChangeKind::Added,
                            resource,
                            cursor: None,
                        };
                        if let Err(err) = registry
                            .apply(event, &source, &resolver, &dispatcher, &config.retry)
                            .await
                        {
                            error!(error = %err, "failed to apply listed trigger");
                        }
                    }

                    cursor = Some(listed);
                    backoff.reset();
                }
                Err(err) => {
                    error!(error = %err, "failed to list triggers");
                    if wait_for_retry(&mut backoff, &mut shutdown_rx).await {
                        break 'session;
                    }
                    continue 'session;
                }
            }
        }

        let mut events = match feed.watch(cursor.as_ref()).await {
            Ok(events) => events,
            Err(err) if err.kind() == ErrorKind::CursorExpired => {
                warn!("trigger watch cursor expired, relisting");
                cursor = None;
                continue 'session;
            }
            Err(err) => {
                error!(error = %err, "failed to start trigger watch");
                if wait_for_retry(&mut backoff, &mut shutdown_rx).await {
                    break 'session;
                }
                continue 'session;
            }
        };

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!("reconcile worker shutting down");
                    break 'session;
                }

                event = events.next() => {
                    match event {
                        Some(Ok(event)) => {
                            let event_cursor = event.cursor.clone();
                            match registry
                                .apply(event, &source, &resolver, &dispatcher, &config.retry)
                                .await
                            {
                                Ok(()) => {
                                    // The cursor only advances past applied
                                    // events, so a failed apply is replayed
                                    // after the next watch restart.
                                    if let Some(event_cursor) = event_cursor {
                                        cursor = Some(event_cursor);
                                    }
                                    backoff.reset();
                                }
                                Err(err) => {
                                    error!(error = %err, "failed to apply trigger change");
                                }
                            }
                        }
                        Some(Err(err)) if err.kind() == ErrorKind::CursorExpired => {
                            warn!("trigger watch cursor expired, relisting");
                            cursor = None;
                            break;
                        }
                        Some(Err(err)) => {
                            error!(error = %err, "trigger watch stream failed");
                            if wait_for_retry(&mut backoff, &mut shutdown_rx).await {
                                break 'session;
                            }
                            break;
                        }
                        None => {
                            // Watch sessions expire routinely, so an ended
                            // stream is reopened from the cursor right away.
                            debug!("trigger watch stream ended, restarting watch");
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("stopping all trigger workers");
    registry.stop_all().await
}

/// Waits out the next backoff delay, unless shutdown is requested first.
///
/// Returns whether shutdown was requested.
async fn wait_for_retry(backoff: &mut ExponentialBackoff, shutdown_rx: &mut ShutdownRx) -> bool {
    let delay = backoff.next_delay_unbounded();
    warn!(delay_ms = delay.as_millis() as u64, "retrying trigger watch");

    tokio::select! {
        biased;

        _ = shutdown_rx.changed() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
