//! Change feed transport seam and the single-subscription owner

use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;

use super::{ChangeEvent, Table};

/// Callback receiving every event of a subscription, in emission order
pub type EventSink = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Handle to an open subscription
pub trait Subscription: Send {
    /// Stop delivering events. Calling it more than once has no effect.
    fn close(&mut self);
}

/// Transport that can deliver row-level change events
///
/// Implementations own reconnects and retries; errors they cannot recover
/// from are logged, not surfaced through the sink.
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription to the given tables
    fn subscribe(&self, tables: &[Table], sink: EventSink) -> Result<Box<dyn Subscription>>;
}

/// Owns at most one subscription to the watched tables
pub struct ChangeFeedSubscriber {
    feed: Arc<dyn ChangeFeed>,
    sink: EventSink,
    subscription: Option<Box<dyn Subscription>>,
}

impl ChangeFeedSubscriber {
    pub fn new(feed: Arc<dyn ChangeFeed>, sink: EventSink) -> Self {
        Self {
            feed,
            sink,
            subscription: None,
        }
    }

    /// Open the subscription if none is active.
    ///
    /// Returns `Ok(false)` without touching the transport when already
    /// subscribed.
    pub fn initialize(&mut self) -> Result<bool> {
        if self.subscription.is_some() {
            debug!("Change feed already subscribed, ignoring initialize");
            return Ok(false);
        }

        let subscription = self.feed.subscribe(&Table::WATCHED, self.sink.clone())?;
        self.subscription = Some(subscription);
        info!(
            "Subscribed to change feed ({})",
            Table::WATCHED.map(|t| t.as_str()).join(", ")
        );
        Ok(true)
    }

    /// Release the subscription. Returns false if there was none.
    pub fn close(&mut self) -> bool {
        match self.subscription.take() {
            Some(mut subscription) => {
                subscription.close();
                info!("Closed change feed subscription");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }
}

impl Drop for ChangeFeedSubscriber {
    fn drop(&mut self) {
        self.close();
    }
}
