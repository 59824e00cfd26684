use bytes::Bytes;
use std::future::Future;

use crate::error::RelayResult;
use crate::types::ChannelRef;

/// A single message pulled from a channel subscription.
///
/// Acknowledgment consumes the message; an unacknowledged message is
/// redelivered by the channel, so delivery downstream is at-most-once only
/// relative to the acknowledgment decision.
pub trait SourceMessage: Send {
    /// Returns the raw payload bytes.
    fn payload(&self) -> &Bytes;

    /// Acknowledges the message with the channel.
    fn ack(self) -> impl Future<Output = RelayResult<()>> + Send;
}

/// An open subscription to one channel.
pub trait MessageSubscription: Send {
    type Message: SourceMessage + 'static;

    /// Returns the next inbound message, or `None` once the subscription has
    /// closed and no further messages will arrive.
    fn next_message(&mut self) -> impl Future<Output = Option<Self::Message>> + Send;
}

/// Factory for channel subscriptions.
///
/// One subscription is opened per trigger worker, scoped to the channel the
/// trigger references.
pub trait MessageSource {
    type Subscription: MessageSubscription + 'static;

    /// Opens a subscription to the given channel.
    fn subscribe(
        &self,
        channel: &ChannelRef,
    ) -> impl Future<Output = RelayResult<Self::Subscription>> + Send;
}
