//! Store actor and its handle

use anyhow::{Result, anyhow};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{mpsc, oneshot, watch};

use super::StoreError;
use super::threads::{AppendOutcome, ThreadCache};
use super::tickets::{DEFAULT_PAGE_SIZE, PageOutcome, PendingFetch, TicketListCache};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeFeedSubscriber, ChangeKind, EventSink};
use crate::models::{AgentIdentity, FilterUpdate, ReadMarker, Thread, Ticket, TicketFilter, TicketId, TicketRow};
use crate::source::DeskSource;

/// Store settings
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Agent whose ownership and read state drive the views
    pub agent: AgentIdentity,
    pub page_size: usize,
}

impl StoreOptions {
    pub fn new(agent: AgentIdentity) -> Self {
        Self {
            agent,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Result of a list request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page was merged into the list
    Applied { visible: usize, has_more: bool },
    /// A newer filter superseded the request before it returned
    Stale,
    /// Nothing was requested: the list is exhausted or already loading
    Skipped,
}

/// Point-in-time copy of the list state
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub tickets: Vec<Ticket>,
    pub filters: TicketFilter,
    pub page: usize,
    pub has_more: bool,
    pub loading: bool,
    pub subscribed: bool,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Initialize(Reply<Result<bool>>),
    Close(Reply<bool>),
    SetFilters(FilterUpdate, Reply<Result<FetchOutcome>>),
    FetchTickets(usize, Reply<Result<FetchOutcome>>),
    LoadMore(Reply<Result<FetchOutcome>>),
    PageLoaded {
        generation: u64,
        page: usize,
        result: Result<Vec<TicketRow>>,
        reply: Option<Reply<Result<FetchOutcome>>>,
    },
    MarkRead(TicketId, Reply<Result<()>>),
    MarkerWritten {
        marker: ReadMarker,
        result: Result<()>,
        reply: Reply<Result<()>>,
    },
    SeedThreads {
        ticket_id: TicketId,
        threads: Vec<Thread>,
        details: Ticket,
        reply: Reply<Vec<Thread>>,
    },
    OpenTicket(TicketId, Reply<Result<Vec<Thread>>>),
    TicketOpened {
        ticket_id: TicketId,
        result: Result<(Ticket, Vec<Thread>)>,
        reply: Reply<Result<Vec<Thread>>>,
    },
    Event(ChangeEvent),
    Snapshot(Reply<StoreSnapshot>),
    Threads(TicketId, Reply<Option<Vec<Thread>>>),
    AllThreads(Reply<HashMap<TicketId, Vec<Thread>>>),
}

/// Handle to the realtime ticket store
///
/// Cheap to clone. The backing task stops once every handle is dropped,
/// closing the change feed subscription on its way out.
#[derive(Clone)]
pub struct DeskStore {
    commands: UnboundedSender<Command>,
    revision: watch::Receiver<u64>,
}

impl DeskStore {
    /// Spawn the store task on the current tokio runtime.
    ///
    /// Nothing is fetched or subscribed until [`initialize`](Self::initialize)
    /// and [`fetch_tickets`](Self::fetch_tickets) are called.
    pub fn start(source: Arc<dyn DeskSource>, feed: Arc<dyn ChangeFeed>, options: StoreOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (revision_tx, revision_rx) = watch::channel(0);

        let events = tx.downgrade();
        let sink: EventSink = Arc::new(move |event: ChangeEvent| {
            if let Some(commands) = events.upgrade() {
                let _ = commands.send(Command::Event(event));
            }
        });

        let actor = StoreActor {
            source,
            agent: options.agent,
            tickets: TicketListCache::new(options.page_size),
            threads: ThreadCache::new(),
            subscriber: ChangeFeedSubscriber::new(feed, sink),
            commands: tx.downgrade(),
            revision: revision_tx,
        };
        tokio::spawn(actor.run(rx));

        Self {
            commands: tx,
            revision: revision_rx,
        }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed.into())
    }

    /// Open the change feed subscription. Returns false if already subscribed.
    pub async fn initialize(&self) -> Result<bool> {
        self.request(Command::Initialize).await?
    }

    /// Release the subscription. Fetches already in flight still land.
    pub async fn close(&self) -> Result<bool> {
        self.request(Command::Close).await
    }

    /// Merge a filter change, clear the list and reload page 0
    pub async fn set_filters(&self, update: FilterUpdate) -> Result<FetchOutcome> {
        self.request(|reply| Command::SetFilters(update, reply)).await?
    }

    /// Fetch a page under the current filter. Page 0 replaces the list.
    pub async fn fetch_tickets(&self, page: usize) -> Result<FetchOutcome> {
        self.request(|reply| Command::FetchTickets(page, reply)).await?
    }

    /// Fetch the next page if there is one and nothing is loading
    pub async fn load_more_tickets(&self) -> Result<FetchOutcome> {
        self.request(Command::LoadMore).await?
    }

    /// Stamp the agent's read marker for a ticket and clear its unread flag
    pub async fn mark_ticket_as_read(&self, ticket_id: impl Into<TicketId>) -> Result<()> {
        let ticket_id = ticket_id.into();
        self.request(|reply| Command::MarkRead(ticket_id, reply)).await?
    }

    /// Seed a ticket's conversation from an externally fetched thread list
    pub async fn set_initial_threads_for_ticket(
        &self,
        ticket_id: impl Into<TicketId>,
        threads: Vec<Thread>,
        details: &Ticket,
    ) -> Result<Vec<Thread>> {
        let ticket_id = ticket_id.into();
        let details = details.clone();
        self.request(|reply| Command::SeedThreads {
            ticket_id,
            threads,
            details,
            reply,
        })
        .await
    }

    /// Load a ticket's details and messages from the source and seed the conversation
    pub async fn open_ticket(&self, ticket_id: impl Into<TicketId>) -> Result<Vec<Thread>> {
        let ticket_id = ticket_id.into();
        self.request(|reply| Command::OpenTicket(ticket_id, reply))
            .await?
    }

    pub async fn snapshot(&self) -> Result<StoreSnapshot> {
        self.request(Command::Snapshot).await
    }

    pub async fn tickets(&self) -> Result<Vec<Ticket>> {
        Ok(self.snapshot().await?.tickets)
    }

    pub async fn filters(&self) -> Result<TicketFilter> {
        Ok(self.snapshot().await?.filters)
    }

    /// Messages of a seeded ticket; `None` until the ticket has been opened
    pub async fn threads(&self, ticket_id: impl Into<TicketId>) -> Result<Option<Vec<Thread>>> {
        let ticket_id = ticket_id.into();
        self.request(|reply| Command::Threads(ticket_id, reply)).await
    }

    pub async fn threads_by_ticket(&self) -> Result<HashMap<TicketId, Vec<Thread>>> {
        self.request(Command::AllThreads).await
    }

    /// Receiver whose value increments after every visible state change
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.clone()
    }
}

struct StoreActor {
    source: Arc<dyn DeskSource>,
    agent: AgentIdentity,
    tickets: TicketListCache,
    threads: ThreadCache,
    subscriber: ChangeFeedSubscriber,
    /// Weak so the loop ends once the last handle is dropped
    commands: WeakUnboundedSender<Command>,
    revision: watch::Sender<u64>,
}

impl StoreActor {
    async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        debug!("Desk store started");
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        self.subscriber.close();
        debug!("Desk store stopped");
    }

    fn changed(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Run blocking source work off the actor and feed the result back in as a command
    fn offload<T, W, D>(&self, work: W, done: D)
    where
        T: Send + 'static,
        W: FnOnce() -> Result<T> + Send + 'static,
        D: FnOnce(Result<T>) -> Command + Send + 'static,
    {
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(work).await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("Source task failed: {}", e)),
            };
            let _ = commands.send(done(result));
        });
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Initialize(reply) => {
                let result = self.subscriber.initialize();
                match &result {
                    Ok(true) => self.changed(),
                    Ok(false) => {}
                    Err(e) => warn!("Failed to subscribe to change feed: {:#}", e),
                }
                let _ = reply.send(result);
            }
            Command::Close(reply) => {
                let closed = self.subscriber.close();
                if closed {
                    self.changed();
                }
                let _ = reply.send(closed);
            }
            Command::SetFilters(update, reply) => {
                self.tickets.apply_filters(update);
                debug!("Filters changed: {:?}", self.tickets.filter());
                self.changed();
                let pending = self.tickets.begin_fetch(0, &self.agent);
                self.fetch(pending, Some(reply));
            }
            Command::FetchTickets(page, reply) => {
                let pending = self.tickets.begin_fetch(page, &self.agent);
                self.fetch(pending, Some(reply));
            }
            Command::LoadMore(reply) => match self.tickets.begin_load_more(&self.agent) {
                Some(pending) => self.fetch(pending, Some(reply)),
                None => {
                    debug!("Load more skipped (has_more={})", self.tickets.has_more());
                    let _ = reply.send(Ok(FetchOutcome::Skipped));
                }
            },
            Command::PageLoaded {
                generation,
                page,
                result,
                reply,
            } => {
                let outcome = self.page_loaded(generation, page, result);
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Command::MarkRead(ticket_id, reply) => self.mark_read(ticket_id, reply),
            Command::MarkerWritten {
                marker,
                result,
                reply,
            } => {
                let result = match result {
                    Ok(()) => {
                        if self.tickets.mark_read(&marker.ticket_id) {
                            self.changed();
                        }
                        Ok(())
                    }
                    Err(e) => {
                        warn!("Failed to mark ticket {} as read: {:#}", marker.ticket_id, e);
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            Command::SeedThreads {
                ticket_id,
                threads,
                details,
                reply,
            } => {
                let list = self.seed(&ticket_id, threads, &details);
                let _ = reply.send(list);
            }
            Command::OpenTicket(ticket_id, reply) => self.open_ticket(ticket_id, reply),
            Command::TicketOpened {
                ticket_id,
                result,
                reply,
            } => {
                let result = match result {
                    Ok((details, threads)) => Ok(self.seed(&ticket_id, threads, &details)),
                    Err(e) => {
                        warn!("Failed to open ticket {}: {:#}", ticket_id, e);
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            Command::Event(event) => self.apply_event(event),
            Command::Snapshot(reply) => {
                let _ = reply.send(StoreSnapshot {
                    tickets: self.tickets.tickets().to_vec(),
                    filters: self.tickets.filter().clone(),
                    page: self.tickets.page(),
                    has_more: self.tickets.has_more(),
                    loading: self.tickets.is_loading(),
                    subscribed: self.subscriber.is_active(),
                });
            }
            Command::Threads(ticket_id, reply) => {
                let _ = reply.send(self.threads.get(&ticket_id).map(<[Thread]>::to_vec));
            }
            Command::AllThreads(reply) => {
                let _ = reply.send(self.threads.snapshot());
            }
        }
    }

    fn fetch(&self, pending: PendingFetch, reply: Option<Reply<Result<FetchOutcome>>>) {
        let PendingFetch {
            generation,
            page,
            query,
        } = pending;
        debug!("Fetching ticket page {} (generation {})", page, generation);

        let source = self.source.clone();
        self.offload(
            move || source.fetch_ticket_page(&query),
            move |result| Command::PageLoaded {
                generation,
                page,
                result,
                reply,
            },
        );
    }

    fn page_loaded(&mut self, generation: u64, page: usize, result: Result<Vec<TicketRow>>) -> Result<FetchOutcome> {
        match result {
            Ok(rows) => match self.tickets.apply_page(generation, page, rows) {
                PageOutcome::Applied { visible, raw } => {
                    debug!("Applied ticket page {}: {} of {} row(s) visible", page, visible, raw);
                    self.changed();
                    Ok(FetchOutcome::Applied {
                        visible,
                        has_more: self.tickets.has_more(),
                    })
                }
                PageOutcome::Stale => {
                    debug!("Discarded stale ticket page {} (generation {})", page, generation);
                    Ok(FetchOutcome::Stale)
                }
            },
            Err(e) => {
                if !self.tickets.fail_page(generation, page) {
                    return Ok(FetchOutcome::Stale);
                }
                warn!("Failed to fetch ticket page {}: {:#}", page, e);
                self.changed();
                Err(e)
            }
        }
    }

    fn mark_read(&mut self, ticket_id: TicketId, reply: Reply<Result<()>>) {
        let Some(user_name) = self.agent.marker_key() else {
            warn!("No agent name configured, not marking ticket {} as read", ticket_id);
            let _ = reply.send(Err(StoreError::MissingIdentity.into()));
            return;
        };

        let marker = ReadMarker::new(user_name, ticket_id, Utc::now());
        let source = self.source.clone();
        let written = marker.clone();
        self.offload(
            move || source.upsert_read_marker(&written),
            move |result| Command::MarkerWritten {
                marker,
                result,
                reply,
            },
        );
    }

    fn open_ticket(&mut self, ticket_id: TicketId, reply: Reply<Result<Vec<Thread>>>) {
        let known = self.tickets.get(&ticket_id).cloned();
        let source = self.source.clone();
        let id = ticket_id.clone();
        self.offload(
            move || {
                let details = match known {
                    Some(ticket) => ticket,
                    None => source
                        .get_ticket(&id)?
                        .ok_or_else(|| StoreError::TicketNotFound(id.clone()))?,
                };
                let threads = source.fetch_threads(&id)?;
                Ok((details, threads))
            },
            move |result| Command::TicketOpened {
                ticket_id,
                result,
                reply,
            },
        );
    }

    fn seed(&mut self, ticket_id: &TicketId, threads: Vec<Thread>, details: &Ticket) -> Vec<Thread> {
        let list = self.threads.seed(ticket_id, threads, details).to_vec();
        debug!("Seeded {} message(s) for ticket {}", list.len(), ticket_id);
        self.changed();
        list
    }

    fn apply_event(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::ThreadInserted(thread) => {
                let ticket_id = thread.ticket_id.clone();
                let bumped = self.tickets.apply_thread(&thread);
                let outcome = self.threads.append(thread);
                debug!("Message for ticket {}: {:?}", ticket_id, outcome);
                if bumped || outcome != AppendOutcome::Buffered {
                    self.changed();
                }
            }
            ChangeEvent::ThreadDeleted {
                ticket_id,
                thread_id,
            } => {
                if self.threads.remove(&ticket_id, &thread_id) {
                    self.changed();
                }
            }
            ChangeEvent::TicketChanged { kind, ticket_id } => {
                info!("Ticket {} {:?}, refreshing list", ticket_id, kind);
                if kind == ChangeKind::Delete && self.threads.drop_ticket(&ticket_id) {
                    self.changed();
                }
                let pending = self.tickets.begin_fetch(0, &self.agent);
                self.fetch(pending, None);
            }
            ChangeEvent::ReadMarkerChanged(marker) => {
                if self.agent.owns(&marker) && self.tickets.apply_read_marker(&marker) {
                    self.changed();
                }
            }
        }
    }
}
