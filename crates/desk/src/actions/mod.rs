//! Ticket actions
//!
//! Outgoing operations against the ticketing system, such as replying to a
//! customer on the ticket's channel.

mod reply;

pub use reply::{OutgoingReply, ReplyError, ReplyHandler, ReplySender, ZohoDeskClient};
