//! Per-ticket conversation cache

use log::debug;
use std::collections::{HashMap, VecDeque};

use crate::models::{Thread, ThreadId, Ticket, TicketId};
use crate::text::html_to_plain_text;

/// Messages buffered per ticket before the ticket is opened
const MAX_PENDING_PER_TICKET: usize = 32;

/// Tickets with buffered messages; the oldest buffer is evicted beyond this
const MAX_PENDING_TICKETS: usize = 128;

/// What happened to an appended message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Added to a seeded conversation
    Appended,
    /// Replaced a message with the same id
    Replaced,
    /// The ticket has not been opened yet; held until it is seeded
    Buffered,
}

/// Thread lists keyed by ticket, each kept in display order:
/// the description first, then ascending `created_time`.
#[derive(Debug, Default)]
pub struct ThreadCache {
    threads: HashMap<TicketId, Vec<Thread>>,
    pending: HashMap<TicketId, VecDeque<Thread>>,
    pending_order: VecDeque<TicketId>,
}

impl ThreadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ticket's conversation, replacing anything cached.
    ///
    /// The description becomes the first message when present, and messages
    /// that arrived before the ticket was opened are merged in.
    pub fn seed(&mut self, ticket_id: &TicketId, threads: Vec<Thread>, details: &Ticket) -> &[Thread] {
        let mut list: Vec<Thread> = threads.into_iter().map(to_plain).collect();

        if let Some(mut description) = Thread::from_description(details) {
            description.ticket_id = ticket_id.clone();
            list.retain(|t| !t.id.is_description());
            list.insert(0, to_plain(description));
        }

        if let Some(buffered) = self.pending.remove(ticket_id) {
            self.pending_order.retain(|id| id != ticket_id);
            for thread in buffered {
                upsert(&mut list, thread);
            }
        }

        sort(&mut list);
        self.threads.entry(ticket_id.clone()).insert_entry(list).into_mut()
    }

    /// Add a message from the change feed. Upserts by thread id, so a
    /// replayed event never produces a duplicate.
    pub fn append(&mut self, thread: Thread) -> AppendOutcome {
        let thread = to_plain(thread);
        match self.threads.get_mut(&thread.ticket_id) {
            Some(list) => {
                let outcome = upsert(list, thread);
                sort(list);
                outcome
            }
            None => {
                self.buffer(thread);
                AppendOutcome::Buffered
            }
        }
    }

    fn buffer(&mut self, thread: Thread) {
        if !self.pending.contains_key(&thread.ticket_id) {
            if self.pending.len() >= MAX_PENDING_TICKETS
                && let Some(evicted) = self.pending_order.pop_front()
            {
                debug!("Dropping buffered messages for ticket {}", evicted);
                self.pending.remove(&evicted);
            }
            self.pending_order.push_back(thread.ticket_id.clone());
        }

        let queue = self.pending.entry(thread.ticket_id.clone()).or_default();
        if let Some(existing) = queue.iter_mut().find(|t| t.id == thread.id) {
            *existing = thread;
            return;
        }
        if queue.len() >= MAX_PENDING_PER_TICKET {
            queue.pop_front();
        }
        queue.push_back(thread);
    }

    /// Remove one message. Returns true if it was cached or buffered.
    pub fn remove(&mut self, ticket_id: &TicketId, thread_id: &ThreadId) -> bool {
        if let Some(list) = self.threads.get_mut(ticket_id) {
            let before = list.len();
            list.retain(|t| &t.id != thread_id);
            return list.len() != before;
        }
        if let Some(queue) = self.pending.get_mut(ticket_id) {
            let before = queue.len();
            queue.retain(|t| &t.id != thread_id);
            return queue.len() != before;
        }
        false
    }

    /// Forget everything held for a ticket
    pub fn drop_ticket(&mut self, ticket_id: &TicketId) -> bool {
        let cached = self.threads.remove(ticket_id).is_some();
        let buffered = self.pending.remove(ticket_id).is_some();
        if buffered {
            self.pending_order.retain(|id| id != ticket_id);
        }
        cached || buffered
    }

    pub fn get(&self, ticket_id: &TicketId) -> Option<&[Thread]> {
        self.threads.get(ticket_id).map(Vec::as_slice)
    }

    pub fn is_seeded(&self, ticket_id: &TicketId) -> bool {
        self.threads.contains_key(ticket_id)
    }

    pub fn pending_len(&self, ticket_id: &TicketId) -> usize {
        self.pending.get(ticket_id).map_or(0, VecDeque::len)
    }

    pub fn snapshot(&self) -> HashMap<TicketId, Vec<Thread>> {
        self.threads.clone()
    }
}

fn to_plain(mut thread: Thread) -> Thread {
    thread.content = html_to_plain_text(&thread.content);
    thread
}

fn upsert(list: &mut Vec<Thread>, thread: Thread) -> AppendOutcome {
    match list.iter_mut().find(|t| t.id == thread.id) {
        Some(existing) => {
            *existing = thread;
            AppendOutcome::Replaced
        }
        None => {
            list.push(thread);
            AppendOutcome::Appended
        }
    }
}

fn sort(list: &mut [Thread]) {
    list.sort_by(|a, b| {
        b.id.is_description()
            .cmp(&a.id.is_description())
            .then(a.created_time.cmp(&b.created_time))
    });
}
