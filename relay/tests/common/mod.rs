//! Shared helpers for integration tests over the in-memory stack.

#![allow(dead_code)]

use relay::channel::memory::MemoryMessageSource;
use relay::controller::Controller;
use relay::discovery::memory::MemoryServiceResolver;
use relay::dispatch::memory::MemoryDispatcher;
use relay::error::RelayResult;
use relay::types::{
    ChangeEvent, ChangeKind, ChannelRef, FunctionSelector, PubSubTrigger, PubSubTriggerSpec,
    ServiceEndpoint,
};
use relay::watch::memory::MemoryTriggerFeed;
use relay::workers::registry::TriggerRegistry;
use relay::workers::trigger::TriggerWorkerState;
use relay_config::shared::{ControllerConfig, RetryConfig, SourceConfig, WatchConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub type MemoryController =
    Controller<MemoryTriggerFeed, MemoryMessageSource, MemoryServiceResolver, MemoryDispatcher>;

/// The full in-memory collaborator set of a controller under test.
#[derive(Clone)]
pub struct TestStack {
    pub feed: MemoryTriggerFeed,
    pub source: MemoryMessageSource,
    pub resolver: MemoryServiceResolver,
    pub dispatcher: MemoryDispatcher,
}

impl TestStack {
    pub fn new() -> Self {
        Self {
            feed: MemoryTriggerFeed::new(),
            source: MemoryMessageSource::new(),
            resolver: MemoryServiceResolver::new(),
            dispatcher: MemoryDispatcher::new(),
        }
    }
}

/// Builds a controller configuration with a fast retry schedule.
pub fn test_controller_config() -> Arc<ControllerConfig> {
    Arc::new(ControllerConfig {
        source: SourceConfig::Memory,
        watch: WatchConfig::default(),
        retry: test_retry_config(),
    })
}

/// Builds a retry policy short enough for tests to exhaust quickly.
pub fn test_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        backoff_factor: 2.0,
    }
}

/// Creates a controller over the given in-memory stack.
pub fn create_controller(stack: &TestStack) -> MemoryController {
    Controller::new(
        test_controller_config(),
        stack.feed.clone(),
        stack.source.clone(),
        stack.resolver.clone(),
        stack.dispatcher.clone(),
    )
}

/// Builds a trigger spec for the given channel and selector labels.
pub fn test_trigger_spec(
    project: &str,
    subscription: &str,
    labels: &[(&str, &str)],
) -> PubSubTriggerSpec {
    let match_labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    PubSubTriggerSpec {
        project: project.to_string(),
        subscription: subscription.to_string(),
        function_selector: FunctionSelector { match_labels },
    }
}

/// Builds a named trigger resource for the given channel and selector labels.
pub fn test_trigger(
    name: &str,
    project: &str,
    subscription: &str,
    labels: &[(&str, &str)],
) -> PubSubTrigger {
    PubSubTrigger::new(name, test_trigger_spec(project, subscription, labels))
}

pub fn added_event(trigger: PubSubTrigger) -> ChangeEvent {
    ChangeEvent {
        kind: ChangeKind::Added,
        resource: trigger,
        cursor: None,
    }
}

pub fn modified_event(trigger: PubSubTrigger) -> ChangeEvent {
    ChangeEvent {
        kind: ChangeKind::Modified,
        resource: trigger,
        cursor: None,
    }
}

pub fn deleted_event(trigger: PubSubTrigger) -> ChangeEvent {
    ChangeEvent {
        kind: ChangeKind::Deleted,
        resource: trigger,
        cursor: None,
    }
}

pub fn test_channel(project: &str, subscription: &str) -> ChannelRef {
    ChannelRef {
        project: project.to_string(),
        subscription: subscription.to_string(),
    }
}

pub fn test_endpoint(name: &str, port: u16) -> ServiceEndpoint {
    ServiceEndpoint {
        name: name.to_string(),
        namespace: "default".to_string(),
        address: format!("{name}.default"),
        port,
    }
}

/// Polls until the registry has an active worker for the trigger and returns
/// its state.
pub async fn wait_for_active_worker(registry: &TriggerRegistry, name: &str) -> TriggerWorkerState {
    loop {
        if let Some(state) = registry.get_active_worker_state(name).await {
            return state;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Polls until the trigger's workers have recorded at least one terminal
/// result, and returns all of them.
pub async fn wait_for_finished_worker(
    registry: &TriggerRegistry,
    name: &str,
) -> Vec<RelayResult<()>> {
    loop {
        let finished = registry.finished_workers().await;
        if let Some(results) = finished.get(name)
            && !results.is_empty()
        {
            return results.clone();
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
