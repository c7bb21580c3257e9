//! Thread model representing one message in a ticket conversation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wire::{null_as_default, string_or_number};
use super::{Ticket, TicketId};

/// Unique identifier for a thread within its ticket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(#[serde(deserialize_with = "string_or_number")] pub String);

impl ThreadId {
    /// Sentinel id of the thread synthesized from a ticket's description
    pub const DESCRIPTION: &'static str = "0";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn description() -> Self {
        Self(Self::DESCRIPTION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_description(&self) -> bool {
        self.0 == Self::DESCRIPTION
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message direction relative to the support desk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Customer to agent
    In,
    /// Agent to customer
    Out,
}

/// A single message within a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    #[serde(rename = "ticket_reference_id")]
    pub ticket_id: TicketId,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_name: String,
    /// Author kind reported by the ticketing system (e.g. "END_USER", "AGENT")
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_type: String,
    /// Message body; plain text once it has passed through the thread cache
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    pub created_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub channel: String,
    pub direction: Direction,
}

impl Thread {
    pub fn new(
        id: impl Into<ThreadId>,
        ticket_id: impl Into<TicketId>,
        content: impl Into<String>,
        created_time: DateTime<Utc>,
        direction: Direction,
    ) -> Self {
        Self {
            id: id.into(),
            ticket_id: ticket_id.into(),
            author_id: None,
            author_name: String::new(),
            author_type: String::new(),
            content: content.into(),
            created_time,
            channel: String::new(),
            direction,
        }
    }

    pub fn with_author(mut self, name: impl Into<String>, author_type: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_type = author_type.into();
        self
    }

    /// Synthesize the opening message of a ticket from its description.
    ///
    /// Returns `None` when the description is missing or blank.
    pub fn from_description(ticket: &Ticket) -> Option<Self> {
        let description = ticket.description.as_deref()?;
        if description.trim().is_empty() {
            return None;
        }
        Some(Self {
            id: ThreadId::description(),
            ticket_id: ticket.id.clone(),
            author_id: None,
            author_name: ticket.contact_name.clone(),
            author_type: "END_USER".to_string(),
            content: description.to_string(),
            created_time: ticket.created_time,
            channel: ticket.channel.clone(),
            direction: Direction::In,
        })
    }
}
