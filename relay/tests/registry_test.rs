mod common;

use bytes::Bytes;
use relay::error::ErrorKind;
use relay::workers::registry::TriggerRegistry;
use relay::workers::trigger::{TriggerWorker, TriggerWorkerPhase};
use relay_telemetry::tracing::init_test_tracing;

use crate::common::{
    TestStack, added_event, deleted_event, modified_event, test_channel, test_endpoint,
    test_retry_config, test_trigger, test_trigger_spec, wait_for_active_worker,
};

#[tokio::test(flavor = "multi_thread")]
async fn apply_added_starts_a_running_worker() {
    init_test_tracing();

    let stack = TestStack::new();
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    registry
        .apply(
            added_event(test_trigger("t1", "proj1", "sub1", &[("app", "fn1")])),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();

    let worker = wait_for_active_worker(&registry, "t1").await;
    worker.wait_for_phase(TriggerWorkerPhase::Running).await;

    assert_eq!(registry.active_triggers().await, vec!["t1".to_string()]);
    assert_eq!(
        stack
            .source
            .subscribe_attempts(&test_channel("proj1", "sub1"))
            .await,
        1
    );

    registry.stop_all().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn reapplied_unchanged_trigger_keeps_its_worker() {
    init_test_tracing();

    let stack = TestStack::new();
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    let trigger = test_trigger("t1", "proj1", "sub1", &[("app", "fn1")]);
    registry
        .apply(
            added_event(trigger.clone()),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();

    let worker = wait_for_active_worker(&registry, "t1").await;
    worker.wait_for_phase(TriggerWorkerPhase::Running).await;

    // Replayed and repeated events carry the same spec; the worker must
    // survive them without resubscribing.
    registry
        .apply(
            added_event(trigger.clone()),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();
    registry
        .apply(
            modified_event(trigger),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();

    assert_eq!(worker.phase().await, TriggerWorkerPhase::Running);
    assert_eq!(registry.active_triggers().await, vec!["t1".to_string()]);
    assert_eq!(
        stack
            .source
            .subscribe_attempts(&test_channel("proj1", "sub1"))
            .await,
        1
    );

    registry.stop_all().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_spec_restarts_the_worker() {
    init_test_tracing();

    let stack = TestStack::new();
    stack
        .resolver
        .register(&[("app", "fn1")], test_endpoint("svc1", 8080))
        .await;
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    registry
        .apply(
            added_event(test_trigger("t1", "proj1", "sub1", &[("app", "fn1")])),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();
    let worker = wait_for_active_worker(&registry, "t1").await;
    worker.wait_for_phase(TriggerWorkerPhase::Running).await;

    registry
        .apply(
            modified_event(test_trigger("t1", "proj1", "sub2", &[("app", "fn1")])),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();

    // Applying the change stops the old worker before returning, so its
    // state is terminal here while the replacement is coming up.
    assert_eq!(worker.phase().await, TriggerWorkerPhase::Stopped);
    let replacement = wait_for_active_worker(&registry, "t1").await;
    replacement
        .wait_for_phase(TriggerWorkerPhase::Running)
        .await;

    let dispatched = stack.dispatcher.notify_on_dispatches(1).await;
    stack
        .source
        .publish(&test_channel("proj1", "sub2"), Bytes::from_static(b"data"))
        .await;
    dispatched.notified().await;

    assert_eq!(
        stack
            .source
            .subscribe_attempts(&test_channel("proj1", "sub1"))
            .await,
        1
    );
    assert_eq!(
        stack
            .source
            .subscribe_attempts(&test_channel("proj1", "sub2"))
            .await,
        1
    );

    registry.stop_all().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_trigger_stops_its_worker() {
    init_test_tracing();

    let stack = TestStack::new();
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    let trigger = test_trigger("t1", "proj1", "sub1", &[("app", "fn1")]);
    registry
        .apply(
            added_event(trigger.clone()),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();
    let worker = wait_for_active_worker(&registry, "t1").await;
    worker.wait_for_phase(TriggerWorkerPhase::Running).await;

    registry
        .apply(
            deleted_event(trigger),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();

    assert_eq!(worker.phase().await, TriggerWorkerPhase::Stopped);
    assert!(registry.active_triggers().await.is_empty());

    let finished = registry.finished_workers().await;
    let results = finished.get("t1").unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_of_unknown_trigger_is_a_noop() {
    init_test_tracing();

    let stack = TestStack::new();
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    registry
        .apply(
            deleted_event(test_trigger("ghost", "proj1", "sub1", &[])),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();

    assert!(registry.active_triggers().await.is_empty());
    assert!(registry.finished_workers().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn nameless_trigger_resource_is_rejected() {
    init_test_tracing();

    let stack = TestStack::new();
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    let mut trigger = test_trigger("t1", "proj1", "sub1", &[]);
    trigger.metadata.name = None;

    let err = registry
        .apply(
            added_event(trigger),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidTriggerResource);
    assert!(registry.active_triggers().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_create_delete_create_converges_to_the_last_spec() {
    init_test_tracing();

    let stack = TestStack::new();
    stack
        .resolver
        .register(&[("app", "fn1")], test_endpoint("svc1", 8080))
        .await;
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    let first = test_trigger("t1", "proj1", "sub1", &[("app", "fn1")]);
    let second = test_trigger("t1", "proj1", "sub2", &[("app", "fn1")]);

    registry
        .apply(
            added_event(first.clone()),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();
    registry
        .apply(
            deleted_event(first),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();
    registry
        .apply(
            added_event(second),
            &stack.source,
            &stack.resolver,
            &stack.dispatcher,
            &retry,
        )
        .await
        .unwrap();

    let worker = wait_for_active_worker(&registry, "t1").await;
    worker.wait_for_phase(TriggerWorkerPhase::Running).await;

    let dispatched = stack.dispatcher.notify_on_dispatches(1).await;
    stack
        .source
        .publish(&test_channel("proj1", "sub2"), Bytes::from_static(b"data"))
        .await;
    dispatched.notified().await;

    assert_eq!(registry.active_triggers().await, vec!["t1".to_string()]);

    registry.stop_all().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_all_stops_every_worker() {
    init_test_tracing();

    let stack = TestStack::new();
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    for (name, subscription) in [("t1", "sub1"), ("t2", "sub2")] {
        registry
            .apply(
                added_event(test_trigger(name, "proj1", subscription, &[])),
                &stack.source,
                &stack.resolver,
                &stack.dispatcher,
                &retry,
            )
            .await
            .unwrap();
    }

    let first = wait_for_active_worker(&registry, "t1").await;
    first.wait_for_phase(TriggerWorkerPhase::Running).await;
    let second = wait_for_active_worker(&registry, "t2").await;
    second.wait_for_phase(TriggerWorkerPhase::Running).await;

    registry.stop_all().await.unwrap();

    assert!(registry.active_triggers().await.is_empty());
    assert_eq!(first.phase().await, TriggerWorkerPhase::Stopped);
    assert_eq!(second.phase().await, TriggerWorkerPhase::Stopped);

    let finished = registry.finished_workers().await;
    assert!(finished.get("t1").unwrap()[0].is_ok());
    assert!(finished.get("t2").unwrap()[0].is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_worker_start_is_ignored() {
    init_test_tracing();

    let stack = TestStack::new();
    let registry = TriggerRegistry::new();
    let retry = test_retry_config();

    let build = || {
        TriggerWorker::new(
            "t1".to_string(),
            test_trigger_spec("proj1", "sub1", &[]),
            stack.source.clone(),
            stack.resolver.clone(),
            stack.dispatcher.clone(),
            retry.clone(),
            registry.clone(),
        )
    };

    assert!(registry.start_worker(build()).await.unwrap());
    assert!(!registry.start_worker(build()).await.unwrap());

    let worker = wait_for_active_worker(&registry, "t1").await;
    worker.wait_for_phase(TriggerWorkerPhase::Running).await;

    assert_eq!(registry.active_triggers().await, vec!["t1".to_string()]);
    assert_eq!(
        stack
            .source
            .subscribe_attempts(&test_channel("proj1", "sub1"))
            .await,
        1
    );

    registry.stop_all().await.unwrap();
}
