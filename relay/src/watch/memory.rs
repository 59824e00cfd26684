use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;
use crate::types::{ChangeEvent, ChangeKind, Cursor, PubSubTrigger};
use crate::watch::base::TriggerFeed;

#[derive(Debug, Default)]
struct Inner {
    /// Current triggers by name.
    triggers: HashMap<String, PubSubTrigger>,
    /// Version assigned to the most recent change.
    version: u64,
    /// Oldest version watches may resume from; older cursors are expired.
    min_version: u64,
    /// Change log ordered by version, used to replay watches from a cursor.
    log: Vec<(u64, ChangeEvent)>,
    /// Open watch streams.
    senders: Vec<mpsc::UnboundedSender<RelayResult<ChangeEvent>>>,
    /// Cursor argument of every watch call, in call order.
    watch_cursors: Vec<Option<Cursor>>,
}

impl Inner {
    fn record_change(&mut self, kind: ChangeKind, mut resource: PubSubTrigger) -> Cursor {
        self.version += 1;
        let version = self.version;
        resource.metadata.resource_version = Some(version.to_string());

        let name = resource.metadata.name.clone().unwrap_or_default();
        match kind {
            ChangeKind::Added | ChangeKind::Modified => {
                self.triggers.insert(name, resource.clone());
            }
            ChangeKind::Deleted => {
                self.triggers.remove(&name);
            }
        }

        let event = ChangeEvent {
            kind,
            resource,
            cursor: Some(Cursor::new(version.to_string())),
        };
        self.log.push((version, event.clone()));
        self.senders
            .retain(|sender| sender.send(Ok(event.clone())).is_ok());

        Cursor::new(version.to_string())
    }
}

/// In-process trigger feed with an explicit change log.
///
/// Changes made through the feed are replayed to watchers from their cursor
/// and broadcast to open streams, mirroring the list-then-watch protocol of
/// the cluster-backed feed. History can be expired to invalidate cursors,
/// and open streams can be interrupted to exercise reconnect paths.
#[derive(Debug, Clone)]
pub struct MemoryTriggerFeed {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTriggerFeed {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Adds a trigger and returns the cursor of the change.
    pub async fn add_trigger(&self, trigger: PubSubTrigger) -> Cursor {
        let mut inner = self.inner.lock().await;
        inner.record_change(ChangeKind::Added, trigger)
    }

    /// Modifies a trigger and returns the cursor of the change.
    pub async fn modify_trigger(&self, trigger: PubSubTrigger) -> Cursor {
        let mut inner = self.inner.lock().await;
        inner.record_change(ChangeKind::Modified, trigger)
    }

    /// Deletes a trigger by name and returns the cursor of the change, or
    /// `None` when no trigger with that name exists.
    pub async fn delete_trigger(&self, name: &str) -> Option<Cursor> {
        let mut inner = self.inner.lock().await;
        let resource = inner.triggers.get(name).cloned()?;

        Some(inner.record_change(ChangeKind::Deleted, resource))
    }

    /// Expires every cursor handed out so far.
    ///
    /// The change log is dropped and the version floor moves past the current
    /// head, so watches from any earlier cursor fail with an expired cursor
    /// and callers are forced through a fresh listing.
    pub async fn expire_history(&self) {
        let mut inner = self.inner.lock().await;
        inner.version += 1;
        inner.min_version = inner.version;
        inner.log.clear();
    }

    /// Fails every open watch stream and ends it.
    pub async fn interrupt_streams(&self) {
        let mut inner = self.inner.lock().await;
        for sender in inner.senders.drain(..) {
            let _ = sender.send(Err(relay_error!(
                ErrorKind::TriggerStreamFailed,
                "Trigger watch stream failed",
                "stream interrupted"
            )));
        }
    }

    /// Ends every open watch stream without an error.
    pub async fn end_streams(&self) {
        let mut inner = self.inner.lock().await;
        inner.senders.clear();
    }

    /// Returns the cursor argument of every watch call so far.
    pub async fn watched_from(&self) -> Vec<Option<Cursor>> {
        let inner = self.inner.lock().await;
        inner.watch_cursors.clone()
    }
}

impl Default for MemoryTriggerFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerFeed for MemoryTriggerFeed {
    type EventStream = BoxStream<'static, RelayResult<ChangeEvent>>;

    async fn list(&self) -> RelayResult<(Vec<PubSubTrigger>, Cursor)> {
        let inner = self.inner.lock().await;

        let mut triggers: Vec<_> = inner.triggers.values().cloned().collect();
        triggers.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

        Ok((triggers, Cursor::new(inner.version.to_string())))
    }

    async fn watch(&self, cursor: Option<&Cursor>) -> RelayResult<Self::EventStream> {
        let mut inner = self.inner.lock().await;
        inner.watch_cursors.push(cursor.cloned());

        let from = match cursor {
            Some(cursor) => cursor.as_str().parse::<u64>().map_err(|err| {
                relay_error!(
                    ErrorKind::TriggerStreamFailed,
                    "Trigger watch cursor is malformed",
                    format!("cursor {cursor}: {err}")
                )
            })?,
            None => inner.version,
        };
        if from < inner.min_version {
            return Err(relay_error!(
                ErrorKind::CursorExpired,
                "Trigger watch cursor expired",
                format!("cursor {from} is older than {}", inner.min_version)
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for (version, event) in &inner.log {
            if *version > from {
                // The receiver is alive until this function returns.
                let _ = tx.send(Ok(event.clone()));
            }
        }
        inner.senders.push(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(stream.boxed())
    }
}
