//! Supabase (PostgREST) backed source and polling change feed
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

mod client;
mod feed;
mod source;

pub use client::SupabaseClient;
pub use feed::PollingChangeFeed;
pub use source::SupabaseSource;

/// PostgREST row shapes that differ from the domain models
pub mod api {
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use crate::models::{ReadMarker, Ticket, TicketId};

    /// Ticket row with the embedded `chat_read` relation
    #[derive(Debug, Deserialize)]
    pub struct TicketRecord {
        #[serde(flatten)]
        pub ticket: Ticket,
        /// Filtered down to the current agent, so at most one entry
        #[serde(default)]
        pub chat_read: Vec<ReadMarker>,
    }

    /// Minimal ticket projection used by the change poller
    #[derive(Debug, Deserialize)]
    pub struct TicketStamp {
        pub ticket_reference_id: TicketId,
        pub created_time: DateTime<Utc>,
        pub modified_time: DateTime<Utc>,
    }
}
