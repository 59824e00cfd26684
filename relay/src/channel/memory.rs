use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, mpsc};

use crate::channel::base::{MessageSource, MessageSubscription, SourceMessage};
use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;
use crate::types::ChannelRef;

#[derive(Debug, Default)]
struct Inner {
    /// Messages published to channels that currently have no open subscription.
    pending: HashMap<ChannelRef, VecDeque<Bytes>>,
    /// Live subscriptions indexed by channel.
    subscriptions: HashMap<ChannelRef, mpsc::UnboundedSender<Bytes>>,
    /// Acknowledged payloads per channel, in acknowledgment order.
    acked: HashMap<ChannelRef, Vec<Bytes>>,
    /// Number of `subscribe` calls seen per channel.
    subscribe_attempts: HashMap<ChannelRef, usize>,
    /// Remaining subscribe calls per channel that fail before succeeding.
    failing_subscriptions: HashMap<ChannelRef, u32>,
    /// Channels whose acknowledgments currently fail.
    failing_acks: HashSet<ChannelRef>,
    /// Conditions waiting for a channel to reach an acknowledgment count.
    ack_conditions: Vec<(ChannelRef, usize, Arc<Notify>)>,
}

impl Inner {
    fn check_ack_conditions(&mut self) {
        let acked = &self.acked;
        self.ack_conditions.retain(|(channel, expected, notify)| {
            let reached = acked.get(channel).map(Vec::len).unwrap_or(0) >= *expected;
            if reached {
                notify.notify_one();
            }
            !reached
        });
    }
}

/// In-process message source backed by per-channel queues.
///
/// Messages published before a subscription exists are buffered and delivered
/// once the channel is subscribed. Everything that flows through the source
/// is observable, so tests can assert on acknowledgments and subscription
/// attempts without polling.
#[derive(Debug, Clone)]
pub struct MemoryMessageSource {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryMessageSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Publishes a message to a channel.
    ///
    /// The message is delivered to the channel's open subscription, or
    /// buffered until one is opened.
    pub async fn publish(&self, channel: &ChannelRef, payload: Bytes) {
        let mut inner = self.inner.lock().await;

        if let Some(sender) = inner.subscriptions.get(channel)
            && sender.send(payload.clone()).is_ok()
        {
            return;
        }

        inner
            .pending
            .entry(channel.clone())
            .or_default()
            .push_back(payload);
    }

    /// Closes the open subscription for a channel, if any.
    ///
    /// The subscriber observes the end of its message stream; messages
    /// published afterwards are buffered for the next subscription.
    pub async fn close_subscription(&self, channel: &ChannelRef) {
        let mut inner = self.inner.lock().await;
        inner.subscriptions.remove(channel);
    }

    /// Makes the next `attempts` subscribe calls for a channel fail.
    pub async fn fail_subscriptions(&self, channel: &ChannelRef, attempts: u32) {
        let mut inner = self.inner.lock().await;
        inner.failing_subscriptions.insert(channel.clone(), attempts);
    }

    /// Makes acknowledgments on a channel fail or succeed.
    pub async fn fail_acks(&self, channel: &ChannelRef, failing: bool) {
        let mut inner = self.inner.lock().await;
        if failing {
            inner.failing_acks.insert(channel.clone());
        } else {
            inner.failing_acks.remove(channel);
        }
    }

    /// Returns the payloads acknowledged on a channel so far.
    pub async fn acked_messages(&self, channel: &ChannelRef) -> Vec<Bytes> {
        let inner = self.inner.lock().await;
        inner.acked.get(channel).cloned().unwrap_or_default()
    }

    /// Returns how many times the channel has been subscribed to.
    pub async fn subscribe_attempts(&self, channel: &ChannelRef) -> usize {
        let inner = self.inner.lock().await;
        inner
            .subscribe_attempts
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    /// Returns how many messages are buffered for a channel without an open
    /// subscription.
    pub async fn pending_messages(&self, channel: &ChannelRef) -> usize {
        let inner = self.inner.lock().await;
        inner.pending.get(channel).map(VecDeque::len).unwrap_or(0)
    }

    /// Returns a [`Notify`] that fires once `count` messages have been
    /// acknowledged on the channel.
    pub async fn notify_on_acks(&self, channel: &ChannelRef, count: usize) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner
            .ack_conditions
            .push((channel.clone(), count, notify.clone()));

        // The expected count may already be reached by the time the condition
        // is registered, in which case it must fire immediately or it would
        // never fire at all.
        inner.check_ack_conditions();

        notify
    }
}

impl Default for MemoryMessageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSource for MemoryMessageSource {
    type Subscription = MemoryMessageSubscription;

    async fn subscribe(&self, channel: &ChannelRef) -> RelayResult<MemoryMessageSubscription> {
        let mut inner = self.inner.lock().await;

        *inner
            .subscribe_attempts
            .entry(channel.clone())
            .or_default() += 1;

        if let Some(remaining) = inner.failing_subscriptions.get_mut(channel)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(relay_error!(
                ErrorKind::SubscriptionFailed,
                "Channel subscription failed",
                format!("channel {channel} is unavailable")
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(pending) = inner.pending.get_mut(channel) {
            for payload in pending.drain(..) {
                // The receiver was created just above, so the send cannot fail.
                let _ = tx.send(payload);
            }
        }
        inner.subscriptions.insert(channel.clone(), tx);

        Ok(MemoryMessageSubscription {
            channel: channel.clone(),
            receiver: rx,
            inner: self.inner.clone(),
        })
    }
}

/// Subscription handed out by [`MemoryMessageSource`].
#[derive(Debug)]
pub struct MemoryMessageSubscription {
    channel: ChannelRef,
    receiver: mpsc::UnboundedReceiver<Bytes>,
    inner: Arc<Mutex<Inner>>,
}

impl MessageSubscription for MemoryMessageSubscription {
    type Message = MemoryMessage;

    async fn next_message(&mut self) -> Option<MemoryMessage> {
        let payload = self.receiver.recv().await?;

        Some(MemoryMessage {
            channel: self.channel.clone(),
            payload,
            inner: self.inner.clone(),
        })
    }
}

/// Message handed out by [`MemoryMessageSubscription`].
#[derive(Debug)]
pub struct MemoryMessage {
    channel: ChannelRef,
    payload: Bytes,
    inner: Arc<Mutex<Inner>>,
}

impl SourceMessage for MemoryMessage {
    fn payload(&self) -> &Bytes {
        &self.payload
    }

    async fn ack(self) -> RelayResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.failing_acks.contains(&self.channel) {
            return Err(relay_error!(
                ErrorKind::AckFailed,
                "Message acknowledgment failed",
                format!("acknowledgments on channel {} are failing", self.channel)
            ));
        }

        inner
            .acked
            .entry(self.channel.clone())
            .or_default()
            .push(self.payload.clone());
        inner.check_ack_conditions();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_channel() -> ChannelRef {
        ChannelRef {
            project: "proj1".to_string(),
            subscription: "sub1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_messages_published_before_subscribe_are_buffered() {
        let source = MemoryMessageSource::new();
        let channel = test_channel();

        source.publish(&channel, Bytes::from_static(b"data")).await;
        assert_eq!(source.pending_messages(&channel).await, 1);

        let mut subscription = source.subscribe(&channel).await.unwrap();
        let message = subscription.next_message().await.unwrap();
        assert_eq!(message.payload().as_ref(), b"data");
        assert_eq!(source.pending_messages(&channel).await, 0);
    }

    #[tokio::test]
    async fn test_live_delivery_and_ack_bookkeeping() {
        let source = MemoryMessageSource::new();
        let channel = test_channel();

        let mut subscription = source.subscribe(&channel).await.unwrap();
        source.publish(&channel, Bytes::from_static(b"one")).await;
        source.publish(&channel, Bytes::from_static(b"two")).await;

        let acked = source.notify_on_acks(&channel, 2).await;

        let message = subscription.next_message().await.unwrap();
        message.ack().await.unwrap();
        let message = subscription.next_message().await.unwrap();
        message.ack().await.unwrap();

        acked.notified().await;
        let acked_messages = source.acked_messages(&channel).await;
        assert_eq!(acked_messages.len(), 2);
        assert_eq!(acked_messages[0].as_ref(), b"one");
        assert_eq!(acked_messages[1].as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_failing_subscriptions_count_down() {
        let source = MemoryMessageSource::new();
        let channel = test_channel();

        source.fail_subscriptions(&channel, 2).await;

        assert!(source.subscribe(&channel).await.is_err());
        assert!(source.subscribe(&channel).await.is_err());
        assert!(source.subscribe(&channel).await.is_ok());
        assert_eq!(source.subscribe_attempts(&channel).await, 3);
    }

    #[tokio::test]
    async fn test_failing_acks_do_not_record() {
        let source = MemoryMessageSource::new();
        let channel = test_channel();

        let mut subscription = source.subscribe(&channel).await.unwrap();
        source.fail_acks(&channel, true).await;
        source.publish(&channel, Bytes::from_static(b"data")).await;

        let message = subscription.next_message().await.unwrap();
        let err = message.ack().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AckFailed);
        assert!(source.acked_messages(&channel).await.is_empty());
    }

    #[tokio::test]
    async fn test_closed_subscription_ends_the_stream() {
        let source = MemoryMessageSource::new();
        let channel = test_channel();

        let mut subscription = source.subscribe(&channel).await.unwrap();
        source.close_subscription(&channel).await;

        assert!(subscription.next_message().await.is_none());
    }
}
