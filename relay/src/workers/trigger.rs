use relay_config::shared::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::channel::{MessageSource, MessageSubscription, SourceMessage};
use crate::concurrency::future::ReactiveFuture;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::discovery::ServiceResolver;
use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, RelayError, RelayResult};
use crate::relay_error;
use crate::types::{ChannelRef, PubSubTriggerSpec};
use crate::utils::backoff::ExponentialBackoff;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::registry::TriggerRegistry;

/// Interval at which a phase waiter rechecks the current phase.
///
/// A phase change can slip in between reading the phase and starting to wait
/// for the next notification, so waits are bounded and the phase is reread on
/// every wakeup.
const PHASE_CHANGE_REFRESH_FREQUENCY: Duration = Duration::from_millis(100);

/// Lifecycle phase of a trigger worker.
///
/// Workers move `Starting` → `Running` → `Stopping` → `Stopped`. A worker
/// that fails during startup or crashes goes straight to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerWorkerPhase {
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug)]
struct TriggerWorkerStateInner {
    trigger_name: String,
    phase: TriggerWorkerPhase,
    phase_change: Arc<Notify>,
}

impl TriggerWorkerStateInner {
    fn set_phase(&mut self, phase: TriggerWorkerPhase) {
        info!(
            trigger = %self.trigger_name,
            from = ?self.phase,
            to = ?phase,
            "trigger worker phase changed"
        );
        self.phase = phase;
        self.phase_change.notify_waiters();
    }
}

/// Observable state of a trigger worker.
///
/// The state outlives the worker, so a holder can still read the terminal
/// phase after the worker is gone.
#[derive(Debug, Clone)]
pub struct TriggerWorkerState {
    inner: Arc<RwLock<TriggerWorkerStateInner>>,
}

impl TriggerWorkerState {
    fn new(trigger_name: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TriggerWorkerStateInner {
                trigger_name,
                phase: TriggerWorkerPhase::Starting,
                phase_change: Arc::new(Notify::new()),
            })),
        }
    }

    /// Returns the current phase.
    pub async fn phase(&self) -> TriggerWorkerPhase {
        self.inner.read().await.phase
    }

    pub(crate) async fn set_phase(&self, phase: TriggerWorkerPhase) {
        self.inner.write().await.set_phase(phase);
    }

    /// Waits until the worker reaches the given phase.
    pub async fn wait_for_phase(&self, phase: TriggerWorkerPhase) {
        loop {
            let phase_change = {
                let inner = self.inner.read().await;
                if inner.phase == phase {
                    return;
                }

                inner.phase_change.clone()
            };

            let _ = tokio::time::timeout(PHASE_CHANGE_REFRESH_FREQUENCY, phase_change.notified())
                .await;
        }
    }
}

/// Handle to a running trigger worker.
#[derive(Debug)]
pub struct TriggerWorkerHandle {
    state: TriggerWorkerState,
    stop_tx: ShutdownTx,
    handle: Option<JoinHandle<RelayResult<()>>>,
}

impl TriggerWorkerHandle {
    /// Signals the worker to stop once the in-flight message, if any, has
    /// been fully processed.
    pub fn stop(&self) {
        if self.stop_tx.shutdown().is_err() {
            debug!("trigger worker already stopped");
        }
    }
}

impl WorkerHandle<TriggerWorkerState> for TriggerWorkerHandle {
    fn state(&self) -> TriggerWorkerState {
        self.state.clone()
    }

    async fn wait(mut self) -> RelayResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            relay_error!(
                ErrorKind::TriggerWorkerPanic,
                "Trigger worker task failed",
                err.to_string()
            )
        })?
    }
}

/// Worker consuming one channel on behalf of one trigger.
///
/// The worker subscribes to the trigger's channel and, for every message,
/// resolves the trigger's selector to endpoints, fans the payload out, and
/// acknowledges the message. Acknowledgment is unconditional, so delivery is
/// at most once and a failed delivery is never retried.
pub struct TriggerWorker<S, R, D> {
    trigger_name: String,
    spec: PubSubTriggerSpec,
    source: S,
    resolver: R,
    dispatcher: D,
    retry_config: RetryConfig,
    registry: TriggerRegistry,
}

impl<S, R, D> TriggerWorker<S, R, D>
where
    S: MessageSource + Send + Sync + 'static,
    R: ServiceResolver + Send + Sync + 'static,
    D: Dispatcher + Send + Sync + 'static,
{
    pub fn new(
        trigger_name: String,
        spec: PubSubTriggerSpec,
        source: S,
        resolver: R,
        dispatcher: D,
        retry_config: RetryConfig,
        registry: TriggerRegistry,
    ) -> Self {
        Self {
            trigger_name,
            spec,
            source,
            resolver,
            dispatcher,
            retry_config,
            registry,
        }
    }

    pub fn trigger_name(&self) -> &str {
        &self.trigger_name
    }

    pub fn spec(&self) -> &PubSubTriggerSpec {
        &self.spec
    }

    async fn run(self, state: TriggerWorkerState, mut stop_rx: ShutdownRx) -> RelayResult<()> {
        let channel = self.spec.channel_ref();
        let selector = self.spec.selector();

        let Some(mut subscription) = self.subscribe_with_backoff(&channel, &mut stop_rx).await?
        else {
            // Stop requested before the subscription was established.
            state.set_phase(TriggerWorkerPhase::Stopping).await;
            return Ok(());
        };

        state.set_phase(TriggerWorkerPhase::Running).await;
        info!(channel = %channel, selector = %selector, "trigger worker consuming messages");

        loop {
            tokio::select! {
                biased;

                _ = stop_rx.changed() => {
                    info!("trigger worker stop requested");
                    state.set_phase(TriggerWorkerPhase::Stopping).await;
                    return Ok(());
                }

                message = subscription.next_message() => {
                    match message {
                        Some(message) => self.process_message(&selector, message).await,
                        None => {
                            warn!(channel = %channel, "message stream ended, resubscribing");

                            let Some(renewed) =
                                self.subscribe_with_backoff(&channel, &mut stop_rx).await?
                            else {
                                state.set_phase(TriggerWorkerPhase::Stopping).await;
                                return Ok(());
                            };
                            subscription = renewed;
                        }
                    }
                }
            }
        }
    }

    /// Subscribes to the channel, retrying per the retry policy.
    ///
    /// Returns `Ok(None)` when a stop was requested while waiting between
    /// attempts, and the last subscription error once the policy's attempts
    /// are exhausted.
    async fn subscribe_with_backoff(
        &self,
        channel: &ChannelRef,
        stop_rx: &mut ShutdownRx,
    ) -> RelayResult<Option<S::Subscription>> {
        let mut backoff = ExponentialBackoff::new(self.retry_config.clone());

        loop {
            match self.source.subscribe(channel).await {
                Ok(subscription) => return Ok(Some(subscription)),
                Err(err) => {
                    let Some(delay) = backoff.next_delay() else {
                        error!(channel = %channel, "channel subscription attempts exhausted");
                        return Err(err);
                    };

                    warn!(
                        channel = %channel,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "channel subscription failed, retrying"
                    );

                    tokio::select! {
                        biased;

                        _ = stop_rx.changed() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Resolves, fans out, and settles one message.
    ///
    /// The message is acknowledged whatever happens before, including failed
    /// resolution or delivery, since delivery is at most once.
    async fn process_message(
        &self,
        selector: &str,
        message: <S::Subscription as MessageSubscription>::Message,
    ) {
        let payload = message.payload().clone();

        let endpoints = match self.resolver.resolve(selector).await {
            Ok(endpoints) => endpoints,
            Err(err) => {
                warn!(
                    selector,
                    error = %err,
                    "service resolution failed, delivering to no endpoints"
                );
                Vec::new()
            }
        };
        if endpoints.is_empty() {
            debug!(selector, "no endpoints matched the selector");
        }

        match self.dispatcher.dispatch(payload, &endpoints).await {
            Ok(report) => {
                debug!(
                    attempted = report.attempted(),
                    delivered = report.delivered(),
                    "message dispatched"
                );
                for (endpoint, err) in report.failures() {
                    warn!(endpoint = %endpoint.url(), error = %err, "message delivery failed");
                }
            }
            Err(err) => {
                warn!(error = %err, "message dispatch failed");
            }
        }

        if let Err(err) = message.ack().await {
            warn!(error = %err, "message acknowledgment failed");
        }
    }
}

impl<S, R, D> Worker<TriggerWorkerHandle, TriggerWorkerState> for TriggerWorker<S, R, D>
where
    S: MessageSource + Send + Sync + 'static,
    R: ServiceResolver + Send + Sync + 'static,
    D: Dispatcher + Send + Sync + 'static,
{
    type Error = RelayError;

    async fn start(self) -> RelayResult<TriggerWorkerHandle> {
        info!(trigger = %self.trigger_name, "starting trigger worker");

        let (stop_tx, stop_rx) = create_shutdown_channel();
        let state = TriggerWorkerState::new(self.trigger_name.clone());

        let trigger_name = self.trigger_name.clone();
        let registry = self.registry.clone();
        let worker_state = state.clone();
        let worker_span = info_span!("trigger_worker", trigger = %self.trigger_name);

        let worker_fut = async move {
            let result = self.run(worker_state.clone(), stop_rx).await;
            worker_state.set_phase(TriggerWorkerPhase::Stopped).await;
            result
        };
        let worker_fut =
            ReactiveFuture::new(worker_fut, trigger_name, registry).instrument(worker_span);
        let handle = tokio::spawn(worker_fut);

        Ok(TriggerWorkerHandle {
            state,
            stop_tx,
            handle: Some(handle),
        })
    }
}
