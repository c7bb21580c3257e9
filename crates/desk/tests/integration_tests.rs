//! Integration tests for the desk crate
//!
//! These drive the store end to end against the in-memory source, which also
//! acts as the change feed.

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use desk::models::{AgentIdentity, Direction, FilterUpdate, ReadMarker, Thread, ThreadId, Ticket, TicketId, TicketRow, TicketView};
use desk::source::{DeskSource, InMemoryDeskSource, TicketQuery};
use desk::store::{DeskStore, FetchOutcome, StoreError, StoreOptions};
use std::sync::Arc;

const AGENT: &str = "Grace";

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
}

fn agent() -> AgentIdentity {
    AgentIdentity::new("a1", AGENT)
}

/// Helper to seed `count` tickets, newest first: T0 is the most recent
fn seed_tickets(source: &InMemoryDeskSource, count: usize) {
    for i in 0..count {
        let at = base_time() - Duration::minutes(i as i64);
        let ticket = Ticket::new(format!("T{}", i), format!("Contact {}", i), at)
            .with_channel("EMAIL")
            .with_description(format!("<p>Issue number {}</p>", i));
        source.insert_ticket(ticket).unwrap();
    }
}

fn mark_seen(source: &InMemoryDeskSource, ticket: &str, at: DateTime<Utc>) {
    source
        .upsert_read_marker(&ReadMarker::new(AGENT, ticket, at))
        .unwrap();
}

fn message(id: &str, ticket: &str, at: DateTime<Utc>) -> Thread {
    Thread::new(id, ticket, format!("<div>Message {}</div>", id), at, Direction::In)
        .with_author("Ada", "END_USER")
}

fn start(source: Arc<InMemoryDeskSource>, agent: AgentIdentity) -> DeskStore {
    DeskStore::start(source.clone(), source, StoreOptions::new(agent))
}

/// Wait until no list request is outstanding
async fn wait_idle(store: &DeskStore) {
    for _ in 0..200 {
        if !store.snapshot().await.unwrap().loading {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("store never settled");
}

fn ticket<'a>(tickets: &'a [Ticket], id: &str) -> &'a Ticket {
    tickets
        .iter()
        .find(|t| t.id.as_str() == id)
        .unwrap_or_else(|| panic!("ticket {} not loaded", id))
}

/// Source that answers one search slowly, to force responses out of order
struct SlowSource {
    inner: Arc<InMemoryDeskSource>,
    slow_search: &'static str,
}

impl DeskSource for SlowSource {
    fn fetch_ticket_page(&self, query: &TicketQuery) -> Result<Vec<TicketRow>> {
        if query.filter.search() == Some(self.slow_search) {
            std::thread::sleep(std::time::Duration::from_millis(300));
        }
        self.inner.fetch_ticket_page(query)
    }

    fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
        self.inner.get_ticket(id)
    }

    fn fetch_threads(&self, ticket_id: &TicketId) -> Result<Vec<Thread>> {
        self.inner.fetch_threads(ticket_id)
    }

    fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<()> {
        self.inner.upsert_read_marker(marker)
    }
}

#[tokio::test]
async fn test_latest_filter_wins_race() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 30);
    let slow = Arc::new(SlowSource {
        inner: source.clone(),
        slow_search: "Contact 1",
    });
    let store = DeskStore::start(slow, source.clone(), StoreOptions::new(agent()));

    let (first, second) = tokio::join!(
        store.set_filters(FilterUpdate::search("Contact 1")),
        store.set_filters(FilterUpdate::search("Contact 2")),
    );

    assert_eq!(first.unwrap(), FetchOutcome::Stale);
    assert!(matches!(second.unwrap(), FetchOutcome::Applied { visible: 11, .. }));

    let snapshot = store.snapshot().await.unwrap();
    assert_eq!(snapshot.filters.search(), Some("Contact 2"));
    assert_eq!(snapshot.tickets.len(), 11);
    assert!(snapshot.tickets.iter().all(|t| t.contact_name.contains("Contact 2")));
}

#[tokio::test]
async fn test_pagination_stops_when_exhausted() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 30);
    let store = start(source.clone(), agent());

    let first = store.fetch_tickets(0).await.unwrap();
    assert_eq!(first, FetchOutcome::Applied { visible: 25, has_more: true });

    let more = store.load_more_tickets().await.unwrap();
    assert_eq!(more, FetchOutcome::Applied { visible: 5, has_more: false });
    let tickets = store.tickets().await.unwrap();
    assert_eq!(tickets.len(), 30);
    assert_eq!(tickets[0].id.as_str(), "T0");
    assert_eq!(tickets[29].id.as_str(), "T29");

    let fetches = source.page_fetch_count();
    assert_eq!(store.load_more_tickets().await.unwrap(), FetchOutcome::Skipped);
    assert_eq!(source.page_fetch_count(), fetches);
}

#[tokio::test]
async fn test_unread_view_narrows_page() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 30);
    for i in 4..30 {
        mark_seen(&source, &format!("T{}", i), base_time() + Duration::hours(1));
    }
    let store = start(source.clone(), agent());

    let outcome = store
        .set_filters(FilterUpdate::view(TicketView::Unread))
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Applied { visible: 4, has_more: true });

    let tickets = store.tickets().await.unwrap();
    let ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["T0", "T1", "T2", "T3"]);
}

#[tokio::test]
async fn test_initialize_subscribes_once() {
    let source = Arc::new(InMemoryDeskSource::new());
    let store = start(source.clone(), agent());

    assert!(store.initialize().await.unwrap());
    assert!(!store.initialize().await.unwrap());
    assert_eq!(source.subscribe_count(), 1);
    assert_eq!(source.active_subscriptions(), 1);
    assert!(store.snapshot().await.unwrap().subscribed);

    assert!(store.close().await.unwrap());
    assert!(!store.close().await.unwrap());
    assert_eq!(source.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_dropping_store_releases_subscription() {
    let source = Arc::new(InMemoryDeskSource::new());
    let store = start(source.clone(), agent());
    store.initialize().await.unwrap();
    drop(store);

    for _ in 0..200 {
        if source.active_subscriptions() == 0 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("subscription outlived the store");
}

#[tokio::test]
async fn test_description_thread_first() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 1);
    source.insert_thread(message("m2", "T0", base_time() + Duration::minutes(2))).unwrap();
    source.insert_thread(message("m1", "T0", base_time() + Duration::minutes(1))).unwrap();
    let store = start(source.clone(), agent());

    let threads = store.open_ticket("T0").await.unwrap();
    let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "m1", "m2"]);
    assert_eq!(threads[0].content, "Issue number 0");
    assert_eq!(threads[0].author_name, "Contact 0");
    assert_eq!(threads[1].content, "Message m1");

    let cached = store.threads("T0").await.unwrap().unwrap();
    assert_eq!(cached, threads);
}

#[tokio::test]
async fn test_seed_from_external_threads() {
    let source = Arc::new(InMemoryDeskSource::new());
    let store = start(source, agent());
    let details = Ticket::new("T9", "Ada", base_time()).with_description("Cannot log in");

    let threads = store
        .set_initial_threads_for_ticket(
            "T9",
            vec![
                message("b", "T9", base_time() + Duration::minutes(5)),
                message("a", "T9", base_time() + Duration::minutes(1)),
            ],
            &details,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "a", "b"]);
    assert!(store.threads_by_ticket().await.unwrap().contains_key(&TicketId::new("T9")));
}

#[tokio::test]
async fn test_open_unknown_ticket() {
    let source = Arc::new(InMemoryDeskSource::new());
    let store = start(source, agent());

    let err = store.open_ticket("nope").await.unwrap_err();
    assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::TicketNotFound(_))));
}

#[tokio::test]
async fn test_thread_event_marks_unread_until_read() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 3);
    mark_seen(&source, "T2", base_time() + Duration::hours(1));
    let store = start(source.clone(), agent());
    store.initialize().await.unwrap();
    store.fetch_tickets(0).await.unwrap();
    assert!(!ticket(&store.tickets().await.unwrap(), "T2").is_unread);

    let at = base_time() + Duration::hours(2);
    source.insert_thread(message("m1", "T2", at)).unwrap();

    let tickets = store.tickets().await.unwrap();
    assert_eq!(tickets[0].id.as_str(), "T2");
    assert_eq!(tickets[0].modified_time, at);
    assert!(tickets[0].is_unread);

    store.mark_ticket_as_read("T2").await.unwrap();
    assert!(!ticket(&store.tickets().await.unwrap(), "T2").is_unread);
    assert!(source.read_marker(AGENT, &TicketId::new("T2")).is_some());
}

#[tokio::test]
async fn test_ticket_lifecycle() {
    let source = Arc::new(InMemoryDeskSource::new());
    source
        .insert_ticket(Ticket::new("T1", "Ada", base_time()).with_description("Where is my order?"))
        .unwrap();
    let store = start(source.clone(), agent());
    store.initialize().await.unwrap();
    let mut changes = store.subscribe_changes();

    store.fetch_tickets(0).await.unwrap();
    assert!(changes.has_changed().unwrap());
    changes.mark_unchanged();
    assert!(ticket(&store.tickets().await.unwrap(), "T1").is_unread);

    let threads = store.open_ticket("T1").await.unwrap();
    assert_eq!(threads.len(), 1);
    store.mark_ticket_as_read("T1").await.unwrap();
    assert!(!ticket(&store.tickets().await.unwrap(), "T1").is_unread);

    // A reply after the marker was stamped
    let reply = message("m1", "T1", Utc::now() + Duration::seconds(1));
    source.insert_thread(reply.clone()).unwrap();

    let t1 = ticket(&store.tickets().await.unwrap(), "T1").clone();
    assert!(t1.is_unread);
    assert_eq!(t1.modified_time, reply.created_time);
    let threads = store.threads("T1").await.unwrap().unwrap();
    assert_eq!(threads.last().unwrap().id.as_str(), "m1");
    assert!(changes.has_changed().unwrap());
}

#[tokio::test]
async fn test_replayed_events_do_not_duplicate() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 1);
    let store = start(source.clone(), agent());
    store.initialize().await.unwrap();
    store.open_ticket("T0").await.unwrap();

    let msg = message("m1", "T0", base_time() + Duration::minutes(1));
    source.insert_thread(msg.clone()).unwrap();
    source.insert_thread(msg).unwrap();

    let threads = store.threads("T0").await.unwrap().unwrap();
    let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "m1"]);
}

#[tokio::test]
async fn test_messages_buffered_for_unopened_ticket() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 1);
    let store = start(source.clone(), agent());
    store.initialize().await.unwrap();

    source
        .insert_thread(message("m1", "T0", base_time() + Duration::minutes(1)))
        .unwrap();
    assert_eq!(store.threads("T0").await.unwrap(), None);

    // Seeding from a stale list must not lose the buffered message
    let details = source.get_ticket(&TicketId::new("T0")).unwrap().unwrap();
    let threads = store
        .set_initial_threads_for_ticket("T0", Vec::new(), &details)
        .await
        .unwrap();
    let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "m1"]);
}

#[tokio::test]
async fn test_deletes_propagate() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 2);
    source
        .insert_thread(message("m1", "T1", base_time() - Duration::seconds(30)))
        .unwrap();
    let store = start(source.clone(), agent());
    store.initialize().await.unwrap();
    store.fetch_tickets(0).await.unwrap();
    store.open_ticket("T1").await.unwrap();

    source
        .delete_thread(&TicketId::new("T1"), &ThreadId::new("m1"))
        .unwrap();
    let threads = store.threads("T1").await.unwrap().unwrap();
    assert!(threads.iter().all(|t| t.id.as_str() != "m1"));

    source.delete_ticket(&TicketId::new("T1")).unwrap();
    wait_idle(&store).await;

    assert_eq!(store.threads("T1").await.unwrap(), None);
    let tickets = store.tickets().await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].id.as_str(), "T0");
}

#[tokio::test]
async fn test_new_ticket_refreshes_list() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 2);
    let store = start(source.clone(), agent());
    store.initialize().await.unwrap();
    store.fetch_tickets(0).await.unwrap();

    source
        .insert_ticket(Ticket::new("T100", "New Customer", base_time() + Duration::hours(1)))
        .unwrap();
    wait_idle(&store).await;

    let tickets = store.tickets().await.unwrap();
    assert_eq!(tickets.len(), 3);
    assert_eq!(tickets[0].id.as_str(), "T100");
}

#[tokio::test]
async fn test_mark_read_requires_identity() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 1);
    let store = start(source.clone(), AgentIdentity::new("a1", "  "));
    store.fetch_tickets(0).await.unwrap();

    let err = store.mark_ticket_as_read("T0").await.unwrap_err();
    assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::MissingIdentity)));
    assert!(ticket(&store.tickets().await.unwrap(), "T0").is_unread);
}

#[tokio::test]
async fn test_failed_marker_write_keeps_unread() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 1);
    let store = start(source.clone(), agent());
    store.fetch_tickets(0).await.unwrap();

    source.set_failing(true);
    assert!(store.mark_ticket_as_read("T0").await.is_err());
    assert!(ticket(&store.tickets().await.unwrap(), "T0").is_unread);
    assert!(source.read_marker(AGENT, &TicketId::new("T0")).is_none());
}

#[tokio::test]
async fn test_failed_page_keeps_loaded_rows() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 30);
    let store = start(source.clone(), agent());
    store.fetch_tickets(0).await.unwrap();

    source.set_failing(true);
    assert!(store.load_more_tickets().await.is_err());

    let snapshot = store.snapshot().await.unwrap();
    assert_eq!(snapshot.tickets.len(), 25);
    assert!(!snapshot.has_more);
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn test_other_agents_markers_ignored() {
    let source = Arc::new(InMemoryDeskSource::new());
    seed_tickets(&source, 1);
    let store = start(source.clone(), agent());
    store.initialize().await.unwrap();
    store.fetch_tickets(0).await.unwrap();

    source
        .upsert_read_marker(&ReadMarker::new("Linus", "T0", base_time() + Duration::hours(1)))
        .unwrap();
    assert!(ticket(&store.tickets().await.unwrap(), "T0").is_unread);

    mark_seen(&source, "T0", base_time() + Duration::hours(1));
    assert!(!ticket(&store.tickets().await.unwrap(), "T0").is_unread);
}
