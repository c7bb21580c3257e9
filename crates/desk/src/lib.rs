//! Desk crate - Realtime ticket store for the support console
//!
//! This crate provides platform-independent helpdesk functionality including:
//! - Domain models (Ticket, Thread, ReadMarker, filters)
//! - Supabase REST source and polling change feed
//! - Change feed subscription management
//! - Ticket list and conversation caches kept live by change events
//! - Per-agent read state
//! - Reply actions through the Zoho Desk API
//!
//! This crate has zero UI dependencies.

pub mod actions;
pub mod config;
pub mod feed;
pub mod models;
pub mod source;
pub mod store;
pub mod text;

pub use actions::{OutgoingReply, ReplyError, ReplyHandler, ReplySender, ZohoDeskClient};
pub use config::{ConfigError, DeskConfig, ZohoConfig};
pub use feed::{ChangeEvent, ChangeFeed, ChangeFeedSubscriber, ChangeKind, EventSink, Subscription, Table};
pub use models::{
    AgentIdentity, Direction, FilterUpdate, ReadMarker, SearchField, Thread, ThreadId, Ticket, TicketFilter,
    TicketId, TicketRow, TicketView,
};
pub use source::{DeskSource, InMemoryDeskSource, PollingChangeFeed, SupabaseClient, SupabaseSource, TicketQuery};
pub use store::{DeskStore, FetchOutcome, StoreError, StoreOptions, StoreSnapshot, is_unread};
pub use text::html_to_plain_text;
