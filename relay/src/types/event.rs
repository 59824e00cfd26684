use std::fmt;

use crate::types::trigger::PubSubTrigger;

/// Opaque resumption token for the trigger change stream.
///
/// Cursors are monotonic within one stream and only meaningful to the feed
/// that produced them. The reconcile loop stores the most recent cursor it
/// observed and hands it back when restarting the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of change observed on a trigger resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A single change observed on the trigger change stream.
///
/// Carries a snapshot of the resource as of the change and, when the stream
/// attached one, the cursor to resume from after this event. Events without a
/// cursor leave the resumption point unchanged.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub resource: PubSubTrigger,
    pub cursor: Option<Cursor>,
}
