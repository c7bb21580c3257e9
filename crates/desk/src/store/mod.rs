//! Realtime ticket store
//!
//! [`DeskStore`] is a cloneable handle to a single task that owns the ticket
//! list, the per-ticket conversations and the change feed subscription.

mod read_state;
mod service;
mod threads;
mod tickets;

pub use read_state::is_unread;
pub use service::{DeskStore, FetchOutcome, StoreOptions, StoreSnapshot};
pub use threads::{AppendOutcome, ThreadCache};
pub use tickets::{DEFAULT_PAGE_SIZE, PageOutcome, PendingFetch, TicketListCache};

use thiserror::Error;

use crate::models::TicketId;

/// Store failures callers may want to branch on
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no agent identity configured, read state cannot be recorded")]
    MissingIdentity,
    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),
    #[error("desk store has shut down")]
    Closed,
}
