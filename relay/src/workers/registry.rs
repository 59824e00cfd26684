use relay_config::shared::RetryConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::bail;
use crate::channel::MessageSource;
use crate::discovery::ServiceResolver;
use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, RelayResult};
use crate::types::{ChangeEvent, ChangeKind, PubSubTriggerSpec};
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::trigger::{
    TriggerWorker, TriggerWorkerHandle, TriggerWorkerPhase, TriggerWorkerState,
};

#[derive(Debug)]
struct ActiveTrigger {
    spec: PubSubTriggerSpec,
    handle: TriggerWorkerHandle,
}

#[derive(Debug, Default)]
struct TriggerRegistryInner {
    /// Workers currently running, by trigger name.
    active: HashMap<String, ActiveTrigger>,
    /// Terminal results of workers that are gone, by trigger name.
    finished: HashMap<String, Vec<RelayResult<()>>>,
    /// Conditions waiting for a trigger to have no active worker.
    removal_conditions: Vec<(String, Arc<Notify>)>,
}

impl TriggerRegistryInner {
    fn check_removal_conditions(&mut self) {
        let active = &self.active;
        self.removal_conditions.retain(|(name, notify)| {
            let removed = !active.contains_key(name);
            if removed {
                notify.notify_one();
            }
            !removed
        });
    }
}

/// Registry of the trigger workers the controller is running.
///
/// The registry owns the desired-state reconciliation for a single trigger:
/// applying a change event starts, restarts, or stops that trigger's worker
/// so that at most one worker per trigger name exists at any time. Workers
/// report their termination back to the registry, so it also learns about
/// workers that die without having been asked to stop.
#[derive(Debug, Clone)]
pub struct TriggerRegistry {
    inner: Arc<Mutex<TriggerRegistryInner>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TriggerRegistryInner::default())),
        }
    }

    /// Applies one trigger change event.
    ///
    /// Reapplying an event the registry already reflects is a no-op, so a
    /// replayed history converges on the same set of workers: an add for a
    /// running, unchanged trigger keeps its worker, and a delete for an
    /// unknown trigger is ignored. A changed spec stops the old worker before
    /// starting one with the new spec, so the last event for a trigger always
    /// wins.
    pub async fn apply<S, R, D>(
        &self,
        event: ChangeEvent,
        source: &S,
        resolver: &R,
        dispatcher: &D,
        retry_config: &RetryConfig,
    ) -> RelayResult<()>
    where
        S: MessageSource + Clone + Send + Sync + 'static,
        R: ServiceResolver + Clone + Send + Sync + 'static,
        D: Dispatcher + Clone + Send + Sync + 'static,
    {
        let Some(name) = event.resource.metadata.name.clone() else {
            bail!(
                ErrorKind::InvalidTriggerResource,
                "Trigger resource has no name"
            );
        };

        match event.kind {
            ChangeKind::Added | ChangeKind::Modified => {
                let spec = event.resource.spec.clone();

                let unchanged = {
                    let inner = self.inner.lock().await;
                    inner
                        .active
                        .get(&name)
                        .is_some_and(|active| active.spec == spec)
                };
                if unchanged {
                    debug!(trigger = %name, "trigger unchanged, keeping its worker");
                    return Ok(());
                }

                if self.stop_worker(&name).await? {
                    info!(trigger = %name, "trigger changed, restarting its worker");
                }

                let worker = TriggerWorker::new(
                    name,
                    spec,
                    source.clone(),
                    resolver.clone(),
                    dispatcher.clone(),
                    retry_config.clone(),
                    self.clone(),
                );
                self.start_worker(worker).await?;
            }
            ChangeKind::Deleted => {
                if !self.stop_worker(&name).await? {
                    info!(trigger = %name, "delete for unknown trigger ignored");
                }
            }
        }

        Ok(())
    }

    /// Starts a worker and registers it under its trigger name.
    ///
    /// Returns `Ok(false)` without starting anything when a worker for that
    /// trigger is already registered.
    pub async fn start_worker<S, R, D>(&self, worker: TriggerWorker<S, R, D>) -> RelayResult<bool>
    where
        S: MessageSource + Send + Sync + 'static,
        R: ServiceResolver + Send + Sync + 'static,
        D: Dispatcher + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().await;

        let name = worker.trigger_name().to_string();
        if inner.active.contains_key(&name) {
            warn!(trigger = %name, "trigger worker already running");
            return Ok(false);
        }

        // The lock is held across start so a concurrent apply cannot register
        // a second worker for the same trigger. Start only spawns the worker
        // task and does not block on it.
        let spec = worker.spec().clone();
        let handle = worker.start().await?;
        inner.active.insert(name, ActiveTrigger { spec, handle });

        Ok(true)
    }

    /// Stops the worker of a trigger and waits for it to terminate.
    ///
    /// Returns `Ok(false)` when the trigger has no active worker.
    pub async fn stop_worker(&self, trigger_name: &str) -> RelayResult<bool> {
        let active = {
            let mut inner = self.inner.lock().await;
            inner.active.remove(trigger_name)
        };
        let Some(active) = active else {
            return Ok(false);
        };

        info!(trigger = %trigger_name, "stopping trigger worker");

        // The entry is removed before waiting, so the worker's termination
        // report finds it absent and records the stop as deliberate. Waiting
        // happens outside the lock since the report itself needs it.
        active.handle.stop();
        let result = active.handle.wait().await;

        {
            let mut inner = self.inner.lock().await;
            inner.check_removal_conditions();
        }

        result?;

        Ok(true)
    }

    /// Stops all workers and waits for each to terminate.
    ///
    /// Every worker is stopped even when some fail; the failures are
    /// aggregated into the returned error.
    pub async fn stop_all(&self) -> RelayResult<()> {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock().await;
            inner.active.drain().collect()
        };

        let mut errors = Vec::new();
        for (name, active) in drained {
            info!(trigger = %name, "stopping trigger worker");
            active.handle.stop();
            if let Err(err) = active.handle.wait().await {
                errors.push(err);
            }
        }

        {
            let mut inner = self.inner.lock().await;
            inner.check_removal_conditions();
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }

    /// Records the terminal result of a worker.
    ///
    /// Called by the worker's own task as its final act. A worker that is
    /// still registered here terminated on its own, which is worth a warning;
    /// one already removed was stopped deliberately.
    pub async fn mark_worker_finished(&self, trigger_name: &str, result: &RelayResult<()>) {
        let mut inner = self.inner.lock().await;

        match inner.active.remove(trigger_name) {
            Some(active) => {
                match result {
                    Ok(()) => {
                        warn!(trigger = %trigger_name, "trigger worker exited unexpectedly")
                    }
                    Err(err) => {
                        warn!(trigger = %trigger_name, error = %err, "trigger worker failed")
                    }
                }

                // A worker that crashed never reached its own terminal phase
                // transition, so it is finished here on its behalf.
                let state = active.handle.state();
                if state.phase().await != TriggerWorkerPhase::Stopped {
                    state.set_phase(TriggerWorkerPhase::Stopped).await;
                }
            }
            None => {
                debug!(trigger = %trigger_name, "trigger worker stopped deliberately");
            }
        }

        inner
            .finished
            .entry(trigger_name.to_string())
            .or_default()
            .push(result.clone());
        inner.check_removal_conditions();
    }

    /// Returns the state of the active worker for a trigger, if any.
    pub async fn get_active_worker_state(&self, trigger_name: &str) -> Option<TriggerWorkerState> {
        let inner = self.inner.lock().await;
        inner
            .active
            .get(trigger_name)
            .map(|active| active.handle.state())
    }

    /// Returns the names of all triggers with an active worker, sorted.
    pub async fn active_triggers(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut names: Vec<_> = inner.active.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the terminal results of all finished workers.
    pub async fn finished_workers(&self) -> HashMap<String, Vec<RelayResult<()>>> {
        let inner = self.inner.lock().await;
        inner.finished.clone()
    }

    /// Returns a [`Notify`] that fires once the trigger has no active worker.
    pub async fn notify_on_removal(&self, trigger_name: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner
            .removal_conditions
            .push((trigger_name.to_string(), notify.clone()));

        // The trigger may already have no worker by the time the condition is
        // registered, in which case it must fire immediately or it would
        // never fire at all.
        inner.check_removal_conditions();

        notify
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
