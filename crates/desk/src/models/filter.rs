//! Ticket list filter state

use serde::{Deserialize, Serialize};

use super::{AgentIdentity, Ticket};

/// Which ticket field the search text is matched against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    #[default]
    Name,
    ReferenceId,
}

/// Named filter preset over the ticket list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketView {
    #[default]
    All,
    MyTickets,
    Unassigned,
    /// Narrowed client-side after the page arrives
    Unread,
}

/// Current ticket list filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilter {
    pub search_text: String,
    pub search_field: SearchField,
    pub channel: Option<String>,
    pub view: TicketView,
}

impl TicketFilter {
    /// Apply a partial update, returning true if anything changed
    pub fn merge(&mut self, update: FilterUpdate) -> bool {
        let before = self.clone();
        if let Some(text) = update.search_text {
            self.search_text = text;
        }
        if let Some(field) = update.search_field {
            self.search_field = field;
        }
        if let Some(channel) = update.channel {
            self.channel = channel.filter(|c| !c.trim().is_empty());
        }
        if let Some(view) = update.view {
            self.view = view;
        }
        *self != before
    }

    /// Trimmed search text, or `None` when no search is active
    pub fn search(&self) -> Option<&str> {
        let text = self.search_text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Evaluate the server-side predicates locally.
    ///
    /// The unread view is not checked here; it depends on the read marker.
    pub fn matches(&self, ticket: &Ticket, agent: &AgentIdentity) -> bool {
        if let Some(text) = self.search() {
            let needle = text.to_lowercase();
            let haystack = match self.search_field {
                SearchField::Name => ticket.contact_name.to_lowercase(),
                SearchField::ReferenceId => ticket.id.as_str().to_lowercase(),
            };
            if !haystack.contains(&needle) {
                return false;
            }
        }

        if let Some(channel) = &self.channel
            && !ticket.channel.eq_ignore_ascii_case(channel)
        {
            return false;
        }

        match self.view {
            TicketView::MyTickets => ticket.owner_id.as_deref() == Some(agent.id.as_str()),
            TicketView::Unassigned => ticket.owner_id.is_none(),
            TicketView::All | TicketView::Unread => true,
        }
    }
}

/// Partial filter update; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct FilterUpdate {
    pub search_text: Option<String>,
    pub search_field: Option<SearchField>,
    /// `Some(None)` clears the channel filter
    pub channel: Option<Option<String>>,
    pub view: Option<TicketView>,
}

impl FilterUpdate {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn view(view: TicketView) -> Self {
        Self {
            view: Some(view),
            ..Default::default()
        }
    }

    pub fn channel(channel: Option<String>) -> Self {
        Self {
            channel: Some(channel),
            ..Default::default()
        }
    }

    pub fn search_field(mut self, field: SearchField) -> Self {
        self.search_field = Some(field);
        self
    }
}
