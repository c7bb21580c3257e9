//! Domain models for helpdesk entities

mod filter;
mod read_marker;
mod thread;
mod ticket;
mod wire;

pub use filter::{FilterUpdate, SearchField, TicketFilter, TicketView};
pub use read_marker::{AgentIdentity, ReadMarker};
pub use thread::{Direction, Thread, ThreadId};
pub use ticket::{Ticket, TicketId, TicketRow};
