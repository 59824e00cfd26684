use futures::future::ready;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use kube::Api;
use kube::api::{ListParams, WatchEvent, WatchParams};
use relay_config::shared::WatchConfig;
use tracing::debug;

use crate::error::{ErrorKind, RelayError, RelayResult};
use crate::types::{ChangeEvent, ChangeKind, Cursor, PubSubTrigger};
use crate::watch::base::TriggerFeed;
use crate::{bail, relay_error};

/// Trigger feed backed by the Kubernetes API server.
///
/// Uses raw list and watch calls rather than an informer cache, since the
/// reconcile loop keeps its own cursor and handles expiry itself.
#[derive(Clone)]
pub struct KubeTriggerFeed {
    triggers: Api<PubSubTrigger>,
    timeout_secs: Option<u32>,
}

impl KubeTriggerFeed {
    pub fn new(client: kube::Client, config: &WatchConfig) -> Self {
        let triggers = match config.namespace.as_deref() {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };

        Self {
            triggers,
            timeout_secs: config.timeout_secs,
        }
    }
}

impl TriggerFeed for KubeTriggerFeed {
    type EventStream = BoxStream<'static, RelayResult<ChangeEvent>>;

    async fn list(&self) -> RelayResult<(Vec<PubSubTrigger>, Cursor)> {
        let list = self
            .triggers
            .list(&ListParams::default())
            .await
            .map_err(|err| {
                relay_error!(
                    ErrorKind::TriggerStreamFailed,
                    "Failed to list triggers",
                    err.to_string()
                )
            })?;

        let Some(version) = list.metadata.resource_version else {
            bail!(
                ErrorKind::TriggerStreamFailed,
                "Trigger listing did not carry a resource version"
            );
        };

        Ok((list.items, Cursor::new(version)))
    }

    async fn watch(&self, cursor: Option<&Cursor>) -> RelayResult<Self::EventStream> {
        let mut params = WatchParams::default();
        if let Some(timeout) = self.timeout_secs {
            params = params.timeout(timeout);
        }

        // Version "0" asks the server to start from any recent point, which
        // is only used before the first listing has produced a cursor.
        let version = cursor.map(Cursor::as_str).unwrap_or("0");
        let events = self
            .triggers
            .watch(&params, version)
            .await
            .map_err(classify_watch_error)?;

        Ok(events
            .map_err(|err| {
                relay_error!(
                    ErrorKind::TriggerStreamFailed,
                    "Trigger watch stream failed",
                    err.to_string()
                )
            })
            .map(|result| match result {
                Ok(event) => map_watch_event(event),
                Err(err) => Some(Err(err)),
            })
            .filter_map(ready)
            .boxed())
    }
}

fn classify_watch_error(err: kube::Error) -> RelayError {
    if let kube::Error::Api(ref response) = err
        && response.code == 410
    {
        return relay_error!(
            ErrorKind::CursorExpired,
            "Trigger watch cursor expired",
            response.message.clone()
        );
    }

    relay_error!(
        ErrorKind::TriggerStreamFailed,
        "Failed to start trigger watch",
        err.to_string()
    )
}

/// Maps a raw watch event to a change event, skipping bookmarks.
///
/// The server reports an expired cursor as an in-stream error event with code
/// 410, which surfaces here as `CursorExpired` exactly like an expired watch
/// call does.
fn map_watch_event(event: WatchEvent<PubSubTrigger>) -> Option<RelayResult<ChangeEvent>> {
    match event {
        WatchEvent::Added(resource) => Some(Ok(change_event(ChangeKind::Added, resource))),
        WatchEvent::Modified(resource) => Some(Ok(change_event(ChangeKind::Modified, resource))),
        WatchEvent::Deleted(resource) => Some(Ok(change_event(ChangeKind::Deleted, resource))),
        WatchEvent::Bookmark(_) => {
            debug!("skipping bookmark event");
            None
        }
        WatchEvent::Error(response) if response.code == 410 => Some(Err(relay_error!(
            ErrorKind::CursorExpired,
            "Trigger watch cursor expired",
            response.message
        ))),
        WatchEvent::Error(response) => Some(Err(relay_error!(
            ErrorKind::TriggerStreamFailed,
            "Trigger watch stream returned an error",
            format!("{} (code {})", response.message, response.code)
        ))),
    }
}

fn change_event(kind: ChangeKind, resource: PubSubTrigger) -> ChangeEvent {
    let cursor = resource.metadata.resource_version.clone().map(Cursor::new);

    ChangeEvent {
        kind,
        resource,
        cursor,
    }
}
