//! Typed change events

use serde::{Deserialize, Serialize};

use crate::models::{ReadMarker, Thread, ThreadId, TicketId};

/// Remote tables the console watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Threads,
    Tickets,
    ChatRead,
}

impl Table {
    /// Every table the store subscribes to
    pub const WATCHED: [Table; 3] = [Table::Threads, Table::Tickets, Table::ChatRead];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Threads => "threads",
            Table::Tickets => "tickets",
            Table::ChatRead => "chat_read",
        }
    }
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change delivered by the feed
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A new message was written for a ticket
    ThreadInserted(Thread),
    /// A message row was removed upstream
    ThreadDeleted {
        ticket_id: TicketId,
        thread_id: ThreadId,
    },
    /// Any change to a ticket row
    TicketChanged { kind: ChangeKind, ticket_id: TicketId },
    /// A read marker was written, by any agent
    ReadMarkerChanged(ReadMarker),
}

impl ChangeEvent {
    /// Table the event originated from
    pub fn table(&self) -> Table {
        match self {
            ChangeEvent::ThreadInserted(_) | ChangeEvent::ThreadDeleted { .. } => Table::Threads,
            ChangeEvent::TicketChanged { .. } => Table::Tickets,
            ChangeEvent::ReadMarkerChanged(_) => Table::ChatRead,
        }
    }

    pub fn ticket_id(&self) -> &TicketId {
        match self {
            ChangeEvent::ThreadInserted(thread) => &thread.ticket_id,
            ChangeEvent::ThreadDeleted { ticket_id, .. } => ticket_id,
            ChangeEvent::TicketChanged { ticket_id, .. } => ticket_id,
            ChangeEvent::ReadMarkerChanged(marker) => &marker.ticket_id,
        }
    }
}
