//! Single-slot "replay latest + live" broadcast
//!
//! The slot holds the most recent value only. A subscriber attaching late sees that
//! value first and then every later publish it manages to observe; a subscriber that
//! falls behind skips intermediate values instead of slowing the publisher down.

use futures::{Stream, StreamExt, stream::BoxStream};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::stream::ThrottleExt;
use crate::types::UpdateRate;

/// Latest-value fan-out channel
///
/// Cloning yields another handle to the same slot.
pub struct Broadcast<T> {
    slot: Arc<watch::Sender<Option<Arc<T>>>>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self { slot: Arc::clone(&self.slot) }
    }
}

impl<T> Default for Broadcast<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Broadcast<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot: Arc::new(slot) }
    }

    /// Replace the latest value and wake subscribers.
    ///
    /// Never blocks and succeeds even when nobody is subscribed.
    pub fn publish(&self, value: T) {
        self.slot.send_replace(Some(Arc::new(value)));
    }

    /// Most recently published value, if any
    pub fn latest(&self) -> Option<Arc<T>> {
        self.slot.borrow().clone()
    }

    /// Stream of the latest value (if one exists) followed by live updates.
    ///
    /// `WatchStream::new` yields the slot's current content immediately; an empty
    /// slot is skipped so the stream simply waits for the first publish.
    pub fn subscribe(&self) -> impl Stream<Item = Arc<T>> + Send + 'static {
        WatchStream::new(self.slot.subscribe()).filter_map(|opt| async move { opt })
    }

    /// Like [`subscribe`](Self::subscribe) with an optional rate limit.
    pub fn subscribe_with_rate(&self, rate: UpdateRate) -> BoxStream<'static, Arc<T>> {
        match rate.throttle_interval() {
            None => self.subscribe().boxed(),
            Some(interval) => self.subscribe().throttle(interval).boxed(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.slot.receiver_count()
    }
}

impl<T> fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcast")
            .field("has_value", &self.slot.borrow().is_some())
            .field("subscribers", &self.slot.receiver_count())
            .finish()
    }
}
