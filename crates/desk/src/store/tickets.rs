//! Paginated, filtered ticket list

use crate::models::{AgentIdentity, FilterUpdate, ReadMarker, Thread, Ticket, TicketFilter, TicketId, TicketRow, TicketView};
use crate::source::TicketQuery;

use super::read_state::is_unread;

/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// A page request handed to the source, tagged with the filter generation
#[derive(Debug, Clone)]
pub struct PendingFetch {
    pub generation: u64,
    pub page: usize,
    pub query: TicketQuery,
}

/// Result of applying a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page was merged; `visible` counts rows left after client-side narrowing
    Applied { visible: usize, raw: usize },
    /// The page belonged to an older filter generation and was dropped
    Stale,
}

/// Ticket list state: filter, pagination cursor and the loaded rows
///
/// Every page-0 fetch opens a new generation. Pages from an older generation
/// are discarded when they arrive, so the list never mixes results of two
/// filters.
#[derive(Debug)]
pub struct TicketListCache {
    tickets: Vec<Ticket>,
    filter: TicketFilter,
    page: usize,
    page_size: usize,
    has_more: bool,
    generation: u64,
    /// (generation, page) of the most recent request still outstanding
    in_flight: Option<(u64, usize)>,
}

impl TicketListCache {
    pub fn new(page_size: usize) -> Self {
        Self {
            tickets: Vec::new(),
            filter: TicketFilter::default(),
            page: 0,
            page_size: page_size.max(1),
            has_more: false,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn get(&self, id: &TicketId) -> Option<&Ticket> {
        self.tickets.iter().find(|t| &t.id == id)
    }

    pub fn filter(&self) -> &TicketFilter {
        &self.filter
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a request for the current generation is outstanding
    pub fn is_loading(&self) -> bool {
        self.in_flight
            .is_some_and(|(generation, _)| generation == self.generation)
    }

    /// Merge a partial filter update and reset the list to an empty page 0.
    ///
    /// The caller is expected to follow up with `begin_fetch(0, ..)`.
    pub fn apply_filters(&mut self, update: FilterUpdate) {
        self.filter.merge(update);
        self.tickets.clear();
        self.page = 0;
        self.has_more = false;
    }

    /// Start fetching `page` under the current filter.
    ///
    /// Page 0 opens a new generation, invalidating everything in flight.
    pub fn begin_fetch(&mut self, page: usize, agent: &AgentIdentity) -> PendingFetch {
        if page == 0 {
            self.generation += 1;
        }
        self.in_flight = Some((self.generation, page));
        PendingFetch {
            generation: self.generation,
            page,
            query: TicketQuery::page(self.filter.clone(), agent.clone(), page, self.page_size),
        }
    }

    /// Start fetching the next page, unless the list is exhausted or already loading
    pub fn begin_load_more(&mut self, agent: &AgentIdentity) -> Option<PendingFetch> {
        if !self.has_more || self.is_loading() {
            return None;
        }
        Some(self.begin_fetch(self.page + 1, agent))
    }

    fn settle(&mut self, generation: u64, page: usize) {
        if self.in_flight == Some((generation, page)) {
            self.in_flight = None;
        }
    }

    /// Merge a fetched page: replace on page 0, append otherwise
    pub fn apply_page(&mut self, generation: u64, page: usize, rows: Vec<TicketRow>) -> PageOutcome {
        if generation != self.generation {
            return PageOutcome::Stale;
        }
        self.settle(generation, page);

        let raw = rows.len();
        // Fullness of the raw page, not the narrowed one, decides pagination
        self.has_more = raw == self.page_size;

        let unread_only = self.filter.view == TicketView::Unread;
        let incoming: Vec<Ticket> = rows
            .into_iter()
            .map(|row| {
                let mut ticket = row.ticket;
                ticket.is_unread = is_unread(ticket.modified_time, row.read_marker.as_ref());
                ticket
            })
            .filter(|ticket| !unread_only || ticket.is_unread)
            .collect();
        let visible = incoming.len();

        if page == 0 {
            self.tickets = incoming;
        } else {
            for ticket in incoming {
                // Rows shift when tickets are bumped between page requests
                if self.get(&ticket.id).is_none() {
                    self.tickets.push(ticket);
                }
            }
        }
        self.page = page;

        PageOutcome::Applied { visible, raw }
    }

    /// Record a failed fetch. Returns false if the failure belonged to a stale generation.
    pub fn fail_page(&mut self, generation: u64, page: usize) -> bool {
        if generation != self.generation {
            return false;
        }
        self.settle(generation, page);
        self.has_more = false;
        true
    }

    /// A new message arrived: bump modified_time, flag unread and re-sort.
    ///
    /// Returns false if the ticket is not loaded.
    pub fn apply_thread(&mut self, thread: &Thread) -> bool {
        let Some(ticket) = self.tickets.iter_mut().find(|t| t.id == thread.ticket_id) else {
            return false;
        };
        // Replayed older events must not move the ticket back in time
        if thread.created_time > ticket.modified_time {
            ticket.modified_time = thread.created_time;
        }
        ticket.is_unread = true;
        self.sort();
        true
    }

    /// Recompute a ticket's unread flag from a fresh marker. Returns true if it changed.
    pub fn apply_read_marker(&mut self, marker: &ReadMarker) -> bool {
        let Some(ticket) = self.tickets.iter_mut().find(|t| t.id == marker.ticket_id) else {
            return false;
        };
        let unread = is_unread(ticket.modified_time, Some(marker));
        let changed = ticket.is_unread != unread;
        ticket.is_unread = unread;
        changed
    }

    /// Clear the unread flag after a successful read-marker write
    pub fn mark_read(&mut self, id: &TicketId) -> bool {
        match self.tickets.iter_mut().find(|t| &t.id == id) {
            Some(ticket) => {
                ticket.is_unread = false;
                true
            }
            None => false,
        }
    }

    fn sort(&mut self) {
        // Stable, so tickets with equal timestamps keep their relative order
        self.tickets
            .sort_by(|a, b| b.modified_time.cmp(&a.modified_time));
    }
}

impl Default for TicketListCache {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    fn agent() -> AgentIdentity {
        AgentIdentity::new("a1", "Grace")
    }

    fn rows(range: std::ops::Range<usize>) -> Vec<TicketRow> {
        range
            .map(|i| {
                let at = base_time() - Duration::minutes(i as i64);
                TicketRow::new(Ticket::new(format!("T{}", i), format!("Contact {}", i), at), None)
            })
            .collect()
    }

    #[test]
    fn test_first_page_replaces_and_sets_has_more() {
        let mut cache = TicketListCache::new(3);
        let fetch = cache.begin_fetch(0, &agent());
        assert!(cache.is_loading());

        let outcome = cache.apply_page(fetch.generation, 0, rows(0..3));
        assert_eq!(outcome, PageOutcome::Applied { visible: 3, raw: 3 });
        assert!(cache.has_more());
        assert!(!cache.is_loading());
        assert!(cache.tickets().iter().all(|t| t.is_unread));
    }

    #[test]
    fn test_load_more_appends_and_exhausts() {
        let mut cache = TicketListCache::new(3);
        let fetch = cache.begin_fetch(0, &agent());
        cache.apply_page(fetch.generation, 0, rows(0..3));

        let more = cache.begin_load_more(&agent()).unwrap();
        assert_eq!(more.page, 1);
        assert_eq!(more.query.offset, 3);
        cache.apply_page(more.generation, more.page, rows(3..4));

        assert_eq!(cache.tickets().len(), 4);
        assert!(!cache.has_more());
        assert!(cache.begin_load_more(&agent()).is_none());
    }

    #[test]
    fn test_load_more_skipped_while_loading() {
        let mut cache = TicketListCache::new(3);
        let fetch = cache.begin_fetch(0, &agent());
        cache.apply_page(fetch.generation, 0, rows(0..3));

        assert!(cache.begin_load_more(&agent()).is_some());
        assert!(cache.begin_load_more(&agent()).is_none());
    }

    #[test]
    fn test_stale_generation_dropped() {
        let mut cache = TicketListCache::new(25);
        let old = cache.begin_fetch(0, &agent());
        cache.apply_filters(FilterUpdate::search("Contact 1"));
        let new = cache.begin_fetch(0, &agent());

        let applied = cache.apply_page(new.generation, 0, rows(1..2));
        assert!(matches!(applied, PageOutcome::Applied { .. }));
        assert_eq!(cache.apply_page(old.generation, 0, rows(0..5)), PageOutcome::Stale);
        assert_eq!(cache.tickets().len(), 1);
        assert_eq!(cache.tickets()[0].id.as_str(), "T1");
    }

    #[test]
    fn test_append_skips_duplicates() {
        let mut cache = TicketListCache::new(3);
        let fetch = cache.begin_fetch(0, &agent());
        cache.apply_page(fetch.generation, 0, rows(0..3));
        let more = cache.begin_load_more(&agent()).unwrap();
        cache.apply_page(more.generation, 1, rows(2..5));
        assert_eq!(cache.tickets().len(), 5);
    }

    #[test]
    fn test_unread_view_narrows_but_keeps_has_more() {
        let mut cache = TicketListCache::new(25);
        cache.apply_filters(FilterUpdate::view(TicketView::Unread));
        let fetch = cache.begin_fetch(0, &agent());

        let page: Vec<TicketRow> = rows(0..25)
            .into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                if i >= 4 {
                    row.read_marker = Some(ReadMarker::new(
                        "Grace",
                        row.ticket.id.clone(),
                        base_time() + Duration::hours(1),
                    ));
                }
                row
            })
            .collect();

        let outcome = cache.apply_page(fetch.generation, 0, page);
        assert_eq!(outcome, PageOutcome::Applied { visible: 4, raw: 25 });
        assert_eq!(cache.tickets().len(), 4);
        assert!(cache.has_more());
    }

    #[test]
    fn test_failure_stops_pagination_keeps_rows() {
        let mut cache = TicketListCache::new(3);
        let fetch = cache.begin_fetch(0, &agent());
        cache.apply_page(fetch.generation, 0, rows(0..3));
        let more = cache.begin_load_more(&agent()).unwrap();

        assert!(cache.fail_page(more.generation, more.page));
        assert!(!cache.has_more());
        assert_eq!(cache.tickets().len(), 3);
        assert!(!cache.fail_page(more.generation - 1, 0));
    }

    #[test]
    fn test_thread_bumps_and_resorts() {
        let mut cache = TicketListCache::new(25);
        let fetch = cache.begin_fetch(0, &agent());
        cache.apply_page(fetch.generation, 0, rows(0..3));
        cache.mark_read(&TicketId::new("T2"));

        let at = base_time() + Duration::minutes(5);
        let thread = Thread::new("m1", "T2", "hello", at, Direction::In);
        assert!(cache.apply_thread(&thread));

        let first = &cache.tickets()[0];
        assert_eq!(first.id.as_str(), "T2");
        assert_eq!(first.modified_time, at);
        assert!(first.is_unread);

        let unknown = Thread::new("m2", "T99", "hi", at, Direction::In);
        assert!(!cache.apply_thread(&unknown));
    }

    #[test]
    fn test_replayed_thread_does_not_rewind() {
        let mut cache = TicketListCache::new(25);
        let fetch = cache.begin_fetch(0, &agent());
        cache.apply_page(fetch.generation, 0, rows(0..1));

        let old = Thread::new("m0", "T0", "old", base_time() - Duration::days(1), Direction::In);
        cache.apply_thread(&old);
        assert_eq!(cache.tickets()[0].modified_time, base_time());
    }

    #[test]
    fn test_read_marker_recomputes() {
        let mut cache = TicketListCache::new(25);
        let fetch = cache.begin_fetch(0, &agent());
        cache.apply_page(fetch.generation, 0, rows(0..1));

        let marker = ReadMarker::new("Grace", "T0", base_time() + Duration::seconds(1));
        assert!(cache.apply_read_marker(&marker));
        assert!(!cache.tickets()[0].is_unread);

        let stale = ReadMarker::new("Grace", "T0", base_time() - Duration::seconds(1));
        assert!(cache.apply_read_marker(&stale));
        assert!(cache.tickets()[0].is_unread);
    }
}
