//! In-memory source implementation
//!
//! Holds the three helpdesk tables in process and doubles as a change feed,
//! emitting an event for every write. Used for tests and offline demos.

use anyhow::{Result, anyhow, bail};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use super::{DeskSource, TicketQuery};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeKind, EventSink, Subscription, Table};
use crate::models::{ReadMarker, Thread, ThreadId, Ticket, TicketId, TicketRow};

#[derive(Default)]
struct Tables {
    tickets: HashMap<TicketId, Ticket>,
    threads: HashMap<TicketId, Vec<Thread>>,
    /// Keyed by (user name, ticket id)
    markers: HashMap<(String, TicketId), ReadMarker>,
}

struct Subscriber {
    id: u64,
    tables: Vec<Table>,
    sink: EventSink,
}

type Subscribers = Mutex<Vec<Subscriber>>;

/// In-memory implementation of DeskSource and ChangeFeed
pub struct InMemoryDeskSource {
    tables: RwLock<Tables>,
    subscribers: Arc<Subscribers>,
    next_subscriber: AtomicU64,
    page_fetches: AtomicUsize,
    subscribe_calls: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryDeskSource {
    /// Create a new empty source
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber: AtomicU64::new(1),
            page_fetches: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| anyhow!("desk tables lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| anyhow!("desk tables lock poisoned"))
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("desk source unavailable");
        }
        Ok(())
    }

    /// Make every subsequent read and write fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of ticket page queries served so far
    pub fn page_fetch_count(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    /// Number of subscriptions ever opened
    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of subscriptions currently open
    pub fn active_subscriptions(&self) -> usize {
        lock_subscribers(&self.subscribers).map_or(0, |subs| subs.len())
    }

    /// Insert or replace a ticket row
    pub fn insert_ticket(&self, ticket: Ticket) -> Result<()> {
        let id = ticket.id.clone();
        let existed = self.write()?.tickets.insert(id.clone(), ticket).is_some();
        let kind = if existed {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        self.emit(ChangeEvent::TicketChanged {
            kind,
            ticket_id: id,
        });
        Ok(())
    }

    /// Delete a ticket row and its messages
    pub fn delete_ticket(&self, id: &TicketId) -> Result<()> {
        {
            let mut tables = self.write()?;
            tables.tickets.remove(id);
            tables.threads.remove(id);
        }
        self.emit(ChangeEvent::TicketChanged {
            kind: ChangeKind::Delete,
            ticket_id: id.clone(),
        });
        Ok(())
    }

    /// Insert a message, advancing its ticket's modified_time.
    ///
    /// Only the thread insert is emitted; the ticket bump is silent.
    pub fn insert_thread(&self, thread: Thread) -> Result<()> {
        {
            let mut tables = self.write()?;
            if let Some(ticket) = tables.tickets.get_mut(&thread.ticket_id)
                && ticket.modified_time < thread.created_time
            {
                ticket.modified_time = thread.created_time;
            }
            let list = tables.threads.entry(thread.ticket_id.clone()).or_default();
            list.retain(|t| t.id != thread.id);
            list.push(thread.clone());
            list.sort_by(|a, b| a.created_time.cmp(&b.created_time));
        }
        self.emit(ChangeEvent::ThreadInserted(thread));
        Ok(())
    }

    /// Delete a message row
    pub fn delete_thread(&self, ticket_id: &TicketId, thread_id: &ThreadId) -> Result<()> {
        if let Some(list) = self.write()?.threads.get_mut(ticket_id) {
            list.retain(|t| &t.id != thread_id);
        }
        self.emit(ChangeEvent::ThreadDeleted {
            ticket_id: ticket_id.clone(),
            thread_id: thread_id.clone(),
        });
        Ok(())
    }

    /// Look up a stored read marker
    pub fn read_marker(&self, user_name: &str, ticket_id: &TicketId) -> Option<ReadMarker> {
        self.read()
            .ok()?
            .markers
            .get(&(user_name.to_string(), ticket_id.clone()))
            .cloned()
    }

    /// Deliver an event to every subscriber of its table.
    ///
    /// Sinks are called outside the subscriber lock so they may re-enter.
    fn emit(&self, event: ChangeEvent) {
        let table = event.table();
        let sinks: Vec<EventSink> = match lock_subscribers(&self.subscribers) {
            Ok(subs) => subs
                .iter()
                .filter(|s| s.tables.contains(&table))
                .map(|s| s.sink.clone())
                .collect(),
            Err(_) => return,
        };
        debug!(
            "Emitting {} event for ticket {} to {} subscriber(s)",
            table.as_str(),
            event.ticket_id(),
            sinks.len()
        );
        for sink in sinks {
            sink(event.clone());
        }
    }
}

impl Default for InMemoryDeskSource {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_subscribers(subs: &Subscribers) -> Result<MutexGuard<'_, Vec<Subscriber>>> {
    subs.lock().map_err(|_| anyhow!("subscriber list lock poisoned"))
}

impl DeskSource for InMemoryDeskSource {
    fn fetch_ticket_page(&self, query: &TicketQuery) -> Result<Vec<TicketRow>> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let tables = self.read()?;
        let mut matching: Vec<&Ticket> = tables
            .tickets
            .values()
            .filter(|t| query.filter.matches(t, &query.agent))
            .collect();

        // Sort by modified_time descending, id as tie breaker for stable pages
        matching.sort_by(|a, b| {
            b.modified_time
                .cmp(&a.modified_time)
                .then_with(|| a.id.cmp(&b.id))
        });

        let user = query.agent.marker_key().unwrap_or_default().to_string();
        let rows = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|ticket| {
                let marker = tables.markers.get(&(user.clone(), ticket.id.clone())).cloned();
                TicketRow::new(ticket.clone(), marker)
            })
            .collect();

        Ok(rows)
    }

    fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
        self.check_available()?;
        Ok(self.read()?.tickets.get(id).cloned())
    }

    fn fetch_threads(&self, ticket_id: &TicketId) -> Result<Vec<Thread>> {
        self.check_available()?;
        Ok(self.read()?.threads.get(ticket_id).cloned().unwrap_or_default())
    }

    fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<()> {
        self.check_available()?;
        self.write()?.markers.insert(
            (marker.user_name.clone(), marker.ticket_id.clone()),
            marker.clone(),
        );
        self.emit(ChangeEvent::ReadMarkerChanged(marker.clone()));
        Ok(())
    }
}

/// Subscription handle for the in-memory feed
struct MemorySubscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription for MemorySubscription {
    fn close(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade()
            && let Ok(mut subs) = lock_subscribers(&subscribers)
        {
            subs.retain(|s| s.id != self.id);
        }
    }
}

impl ChangeFeed for InMemoryDeskSource {
    fn subscribe(&self, tables: &[Table], sink: EventSink) -> Result<Box<dyn Subscription>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        lock_subscribers(&self.subscribers)?.push(Subscriber {
            id,
            tables: tables.to_vec(),
            sink,
        });
        Ok(Box::new(MemorySubscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }))
    }
}
