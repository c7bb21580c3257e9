//! Source trait definitions

use anyhow::Result;

use crate::models::{AgentIdentity, ReadMarker, Thread, Ticket, TicketFilter, TicketId, TicketRow};

/// One windowed ticket query
#[derive(Debug, Clone, PartialEq)]
pub struct TicketQuery {
    pub filter: TicketFilter,
    /// Agent whose ownership and read markers apply
    pub agent: AgentIdentity,
    pub offset: usize,
    pub limit: usize,
}

impl TicketQuery {
    pub fn page(filter: TicketFilter, agent: AgentIdentity, page: usize, page_size: usize) -> Self {
        Self {
            filter,
            agent,
            offset: page * page_size,
            limit: page_size,
        }
    }
}

/// Trait for reading and writing the remote helpdesk tables
///
/// This abstracts over the hosted database and in-memory tables used in tests.
pub trait DeskSource: Send + Sync {
    /// Fetch one page of tickets matching the query's server-side predicates,
    /// ordered by modified_time descending, each joined with the agent's read
    /// marker. The unread view is not applied here.
    fn fetch_ticket_page(&self, query: &TicketQuery) -> Result<Vec<TicketRow>>;

    /// Get a single ticket by reference id
    fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>>;

    /// List the messages of a ticket, ordered by created_time ascending
    fn fetch_threads(&self, ticket_id: &TicketId) -> Result<Vec<Thread>>;

    /// Insert or replace the marker for (user, ticket)
    fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<()>;
}
