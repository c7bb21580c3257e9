//! Polling change feed over the REST API
//!
//! Each subscription runs a background thread that periodically asks every
//! watched table for rows stamped at or after a per-table cursor and emits
//! typed events in timestamp order. Deletes cannot be observed this way.
//!
//! Timestamps come from the ticketing system, not the database, so rows can
//! land out of order. Every poll re-reads a lookback window below the
//! watermark and drops rows already emitted with the same stamp.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use super::api::TicketStamp;
use super::client::{SupabaseClient, timestamp_param};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeKind, EventSink, Subscription, Table};
use crate::models::{ReadMarker, Thread};

/// Upper bound on rows pulled per table per poll
const POLL_BATCH: usize = 200;

/// How often the poll thread checks for a close request while sleeping
const STOP_CHECK: Duration = Duration::from_millis(100);

const DEFAULT_LOOKBACK: Duration = Duration::from_secs(30);

/// Change feed that polls the Supabase tables
pub struct PollingChangeFeed {
    client: Arc<SupabaseClient>,
    interval: Duration,
    lookback: Duration,
}

impl PollingChangeFeed {
    pub fn new(client: Arc<SupabaseClient>, interval: Duration) -> Self {
        Self {
            client,
            interval,
            lookback: DEFAULT_LOOKBACK,
        }
    }

    /// How far below each watermark a poll re-reads. Rows written later than
    /// this behind their own timestamp are still missed.
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }
}

/// Read position in one table
#[derive(Debug)]
struct Cursor {
    /// Highest stamp emitted so far
    mark: DateTime<Utc>,
    lookback: TimeDelta,
    /// Rows emitted inside the window, keyed by row identity
    seen: HashMap<String, DateTime<Utc>>,
    /// The last full batch held nothing new
    catching_up: bool,
}

impl Cursor {
    fn new(at: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            mark: at,
            lookback: TimeDelta::from_std(lookback).unwrap_or(TimeDelta::seconds(30)),
            seen: HashMap::new(),
            catching_up: false,
        }
    }

    /// Lower bound of the next query
    fn window_start(&self) -> DateTime<Utc> {
        if self.catching_up {
            self.mark
        } else {
            self.mark - self.lookback
        }
    }

    /// Record a row; false if it was already emitted with this stamp
    fn admit(&mut self, key: String, stamp: DateTime<Utc>) -> bool {
        if self.seen.get(&key) == Some(&stamp) {
            return false;
        }
        if stamp > self.mark {
            self.mark = stamp;
        }
        self.seen.insert(key, stamp);
        true
    }

    fn finish(&mut self, fetched: usize, admitted: usize) {
        // A full page of repeats would be returned again from the same
        // window, so step up to the mark for one poll
        self.catching_up = fetched >= POLL_BATCH && admitted == 0;
        let floor = self.mark - self.lookback;
        self.seen.retain(|_, stamp| *stamp >= floor);
    }
}

fn thread_events(cursor: &mut Cursor, rows: Vec<Thread>) -> Vec<ChangeEvent> {
    let fetched = rows.len();
    let events: Vec<ChangeEvent> = rows
        .into_iter()
        .filter(|row| cursor.admit(format!("{}/{}", row.ticket_id, row.id.as_str()), row.created_time))
        .map(ChangeEvent::ThreadInserted)
        .collect();
    cursor.finish(fetched, events.len());
    events
}

/// Tickets created inside the polled window are reported as inserts
fn ticket_events(cursor: &mut Cursor, rows: Vec<TicketStamp>) -> Vec<ChangeEvent> {
    let fetched = rows.len();
    let window_start = cursor.window_start();
    let events: Vec<ChangeEvent> = rows
        .into_iter()
        .filter(|row| cursor.admit(row.ticket_reference_id.to_string(), row.modified_time))
        .map(|row| ChangeEvent::TicketChanged {
            kind: if row.created_time >= window_start {
                ChangeKind::Insert
            } else {
                ChangeKind::Update
            },
            ticket_id: row.ticket_reference_id,
        })
        .collect();
    cursor.finish(fetched, events.len());
    events
}

/// Markers without `last_read` are passed through but never move the cursor
fn marker_events(cursor: &mut Cursor, rows: Vec<ReadMarker>) -> Vec<ChangeEvent> {
    let fetched = rows.len();
    let events: Vec<ChangeEvent> = rows
        .into_iter()
        .filter(|row| match row.last_read {
            Some(at) => cursor.admit(format!("{}/{}", row.user_name, row.ticket_id), at),
            None => true,
        })
        .map(ChangeEvent::ReadMarkerChanged)
        .collect();
    cursor.finish(fetched, events.len());
    events
}

fn since_params(column: &str, at: DateTime<Utc>) -> Vec<(String, String)> {
    vec![
        (column.to_string(), format!("gte.{}", timestamp_param(at))),
        ("order".to_string(), format!("{}.asc", column)),
        ("limit".to_string(), POLL_BATCH.to_string()),
    ]
}

struct Poller {
    client: Arc<SupabaseClient>,
    tables: Vec<Table>,
    threads: Cursor,
    tickets: Cursor,
    chat_read: Cursor,
}

impl Poller {
    fn new(client: Arc<SupabaseClient>, tables: &[Table], at: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            client,
            tables: tables.to_vec(),
            threads: Cursor::new(at, lookback),
            tickets: Cursor::new(at, lookback),
            chat_read: Cursor::new(at, lookback),
        }
    }

    /// Pull everything inside each table's window and advance the cursors
    fn poll_once(&mut self) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();

        if self.tables.contains(&Table::Threads) {
            let params = since_params("created_time", self.threads.window_start());
            let rows: Vec<Thread> = self
                .client
                .select(Table::Threads.as_str(), &params)
                .context("Polling threads failed")?;
            events.extend(thread_events(&mut self.threads, rows));
        }

        if self.tables.contains(&Table::Tickets) {
            let mut params = since_params("modified_time", self.tickets.window_start());
            params.push((
                "select".to_string(),
                "ticket_reference_id,created_time,modified_time".to_string(),
            ));
            let rows: Vec<TicketStamp> = self
                .client
                .select(Table::Tickets.as_str(), &params)
                .context("Polling tickets failed")?;
            events.extend(ticket_events(&mut self.tickets, rows));
        }

        if self.tables.contains(&Table::ChatRead) {
            let params = since_params("last_read", self.chat_read.window_start());
            let rows: Vec<ReadMarker> = self
                .client
                .select(Table::ChatRead.as_str(), &params)
                .context("Polling read markers failed")?;
            events.extend(marker_events(&mut self.chat_read, rows));
        }

        Ok(events)
    }

    fn run(mut self, interval: Duration, stop: Arc<AtomicBool>, sink: EventSink) {
        while !stop.load(Ordering::SeqCst) {
            match self.poll_once() {
                Ok(events) => {
                    if !events.is_empty() {
                        debug!("Change poll produced {} event(s)", events.len());
                    }
                    for event in events {
                        if stop.load(Ordering::SeqCst) {
                            return;
                        }
                        sink(event);
                    }
                }
                // Transient failures are retried on the next tick
                Err(e) => warn!("Change feed poll failed: {:#}", e),
            }

            let mut slept = Duration::ZERO;
            while slept < interval && !stop.load(Ordering::SeqCst) {
                std::thread::sleep(STOP_CHECK);
                slept += STOP_CHECK;
            }
        }
        info!("Change feed poller stopped");
    }
}

/// Handle to a running poll thread
struct PollingSubscription {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription for PollingSubscription {
    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Detached; the thread exits on its next stop check
        drop(self.handle.take());
    }
}

impl ChangeFeed for PollingChangeFeed {
    fn subscribe(&self, tables: &[Table], sink: EventSink) -> Result<Box<dyn Subscription>> {
        let poller = Poller::new(self.client.clone(), tables, Utc::now(), self.lookback);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let interval = self.interval;

        let handle = std::thread::Builder::new()
            .name("desk-change-feed".to_string())
            .spawn(move || poller.run(interval, thread_stop, sink))
            .context("Failed to spawn change feed thread")?;

        info!("Polling change feed every {:?}", self.interval);
        Ok(Box::new(PollingSubscription {
            stop,
            handle: Some(handle),
        }))
    }
}
