//! Per-agent read markers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TicketId;

/// Records when an agent last viewed a ticket
///
/// One marker per (user, ticket); writes are upserts where the latest wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadMarker {
    pub user_name: String,
    #[serde(rename = "ticket_reference_id")]
    pub ticket_id: TicketId,
    #[serde(default)]
    pub last_read: Option<DateTime<Utc>>,
}

impl ReadMarker {
    pub fn new(
        user_name: impl Into<String>,
        ticket_id: impl Into<TicketId>,
        last_read: DateTime<Utc>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            ticket_id: ticket_id.into(),
            last_read: Some(last_read),
        }
    }
}

/// The agent operating the console
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Owner id in the ticketing system, matched by the "my tickets" view
    pub id: String,
    /// Display name, used as the read-marker key
    pub name: String,
}

impl AgentIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Name under which read markers are stored, if one is known
    pub fn marker_key(&self) -> Option<&str> {
        let name = self.name.trim();
        (!name.is_empty()).then_some(name)
    }

    pub fn owns(&self, marker: &ReadMarker) -> bool {
        self.marker_key() == Some(marker.user_name.as_str())
    }
}
