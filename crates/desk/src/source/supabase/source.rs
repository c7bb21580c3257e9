//! DeskSource over the Supabase REST API

use anyhow::Result;
use log::debug;
use std::sync::Arc;

use super::api::TicketRecord;
use super::client::{SupabaseClient, like_literal};
use crate::feed::Table;
use crate::models::{ReadMarker, SearchField, Thread, Ticket, TicketId, TicketRow, TicketView};
use crate::source::{DeskSource, TicketQuery};

/// Reads tickets, threads and read markers from the mirrored tables
pub struct SupabaseSource {
    client: Arc<SupabaseClient>,
}

impl SupabaseSource {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<SupabaseClient> {
        &self.client
    }
}

/// Build the PostgREST parameters for a ticket page.
///
/// The embedded `chat_read` relation is narrowed to the querying agent so each
/// row carries at most that agent's marker.
pub fn ticket_page_params(query: &TicketQuery) -> Vec<(String, String)> {
    let mut params = vec![(
        "select".to_string(),
        "*,chat_read(user_name,ticket_reference_id,last_read)".to_string(),
    )];

    let user = query.agent.marker_key().unwrap_or_default();
    params.push(("chat_read.user_name".to_string(), format!("eq.{}", user)));

    if let Some(text) = query.filter.search() {
        let column = match query.filter.search_field {
            SearchField::Name => "contact_name",
            SearchField::ReferenceId => "ticket_reference_id",
        };
        params.push((column.to_string(), format!("ilike.*{}*", like_literal(text))));
    }

    if let Some(channel) = &query.filter.channel {
        params.push(("channel".to_string(), format!("eq.{}", channel)));
    }

    match query.filter.view {
        TicketView::MyTickets => {
            params.push(("owner_id".to_string(), format!("eq.{}", query.agent.id)));
        }
        TicketView::Unassigned => {
            params.push(("owner_id".to_string(), "is.null".to_string()));
        }
        TicketView::All | TicketView::Unread => {}
    }

    params.push(("order".to_string(), "modified_time.desc".to_string()));
    params.push(("offset".to_string(), query.offset.to_string()));
    params.push(("limit".to_string(), query.limit.to_string()));
    params
}

impl DeskSource for SupabaseSource {
    fn fetch_ticket_page(&self, query: &TicketQuery) -> Result<Vec<TicketRow>> {
        let records: Vec<TicketRecord> = self
            .client
            .select(Table::Tickets.as_str(), &ticket_page_params(query))?;
        debug!(
            "Fetched {} ticket rows (offset {}, limit {})",
            records.len(),
            query.offset,
            query.limit
        );

        Ok(records
            .into_iter()
            .map(|record| TicketRow::new(record.ticket, record.chat_read.into_iter().next()))
            .collect())
    }

    fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let params = vec![
            ("ticket_reference_id".to_string(), format!("eq.{}", id)),
            ("limit".to_string(), "1".to_string()),
        ];
        let rows: Vec<Ticket> = self.client.select(Table::Tickets.as_str(), &params)?;
        Ok(rows.into_iter().next())
    }

    fn fetch_threads(&self, ticket_id: &TicketId) -> Result<Vec<Thread>> {
        let params = vec![
            ("ticket_reference_id".to_string(), format!("eq.{}", ticket_id)),
            ("order".to_string(), "created_time.asc".to_string()),
        ];
        self.client.select(Table::Threads.as_str(), &params)
    }

    fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<()> {
        self.client.upsert(
            Table::ChatRead.as_str(),
            "user_name,ticket_reference_id",
            marker,
        )
    }
}
