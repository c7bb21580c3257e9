//! Change feed: row-level change notifications from the remote tables
//!
//! The transport is abstracted behind [`ChangeFeed`]; the
//! [`ChangeFeedSubscriber`] owns the single subscription the store uses.

mod events;
mod subscriber;

pub use events::{ChangeEvent, ChangeKind, Table};
pub use subscriber::{ChangeFeed, ChangeFeedSubscriber, EventSink, Subscription};
