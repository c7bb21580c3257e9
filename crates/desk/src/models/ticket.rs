//! Ticket model representing a helpdesk support case

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReadMarker;
use super::wire::{null_as_default, string_or_number};

/// Reference id of a ticket, assigned by the external ticketing system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(#[serde(deserialize_with = "string_or_number")] pub String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TicketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TicketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A customer support case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// External reference id
    #[serde(rename = "ticket_reference_id")]
    pub id: TicketId,
    /// Display name of the customer
    #[serde(default, deserialize_with = "null_as_default")]
    pub contact_name: String,
    /// Channel/mode the ticket arrived through (e.g. "EMAIL", "CHAT")
    #[serde(default, deserialize_with = "null_as_default")]
    pub channel: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    /// Opening message of the ticket, possibly HTML
    #[serde(default)]
    pub description: Option<String>,
    /// Agent the ticket is assigned to, if any
    #[serde(default)]
    pub owner_id: Option<String>,
    pub created_time: DateTime<Utc>,
    /// Bumped whenever a new thread arrives
    pub modified_time: DateTime<Utc>,
    /// Derived from the current agent's read marker, never stored upstream
    #[serde(default, skip_serializing)]
    pub is_unread: bool,
}

impl Ticket {
    /// Create a ticket with empty optional fields, created and modified at `at`
    pub fn new(id: impl Into<TicketId>, contact_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            contact_name: contact_name.into(),
            channel: String::new(),
            status: "Open".to_string(),
            description: None,
            owner_id: None,
            created_time: at,
            modified_time: at,
            is_unread: false,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

/// One row of a ticket page: the ticket joined with the current agent's read marker
#[derive(Debug, Clone)]
pub struct TicketRow {
    pub ticket: Ticket,
    pub read_marker: Option<ReadMarker>,
}

impl TicketRow {
    pub fn new(ticket: Ticket, read_marker: Option<ReadMarker>) -> Self {
        Self {
            ticket,
            read_marker,
        }
    }
}
