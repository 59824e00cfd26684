use futures::Stream;
use std::future::Future;

use crate::error::RelayResult;
use crate::types::{ChangeEvent, Cursor, PubSubTrigger};

/// Source of trigger definitions and their changes.
///
/// A feed implements the list-then-watch protocol: [`list`](TriggerFeed::list)
/// returns the current triggers together with the cursor the listing is
/// consistent with, and [`watch`](TriggerFeed::watch) streams changes from a
/// cursor onwards. Watching from a cursor the feed no longer remembers fails
/// with [`ErrorKind::CursorExpired`](crate::error::ErrorKind::CursorExpired),
/// at which point the caller starts over with a fresh list.
pub trait TriggerFeed {
    type EventStream: Stream<Item = RelayResult<ChangeEvent>> + Send + Unpin + 'static;

    /// Returns all current triggers and the cursor of the listing.
    fn list(&self) -> impl Future<Output = RelayResult<(Vec<PubSubTrigger>, Cursor)>> + Send;

    /// Opens a stream of changes occurring after `cursor`, or from the feed's
    /// horizon when no cursor is given.
    fn watch(
        &self,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = RelayResult<Self::EventStream>> + Send;
}
