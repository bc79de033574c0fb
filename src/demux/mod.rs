//! Demultiplexer Module
//!
//! Routes inbound frames to the caller waiting on their tag.
//!
//! ## Responsibilities
//! - Run the single background reader for a connection
//! - Keep one bounded slot per tag; a stalled consumer only fills its own slot
//! - Hand frames to `await_response` whether it is called before or after delivery
//! - Release every waiter with an error once the connection is gone

mod slot;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, select, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{MuxError, Result};
use crate::network::TaggedConnection;
use crate::protocol::Frame;

use slot::Slot;

/// Name of the background reader thread
pub const READER_THREAD_NAME: &str = "kvmux-reader";

/// How many abandoned tags are remembered
///
/// Older marks are forgotten first; a frame arriving for a forgotten tag
/// simply opens a slot nobody waits on until `close`.
pub const MAX_ABANDONED_TAGS: usize = 1024;

/// Insertion-ordered tag set that forgets its oldest entries
struct RecentTags {
    order: VecDeque<i32>,
    members: HashSet<i32>,
    limit: usize,
}

impl RecentTags {
    fn new(limit: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            limit,
        }
    }

    fn insert(&mut self, tag: i32) {
        if !self.members.insert(tag) {
            return;
        }
        self.order.push_back(tag);

        while self.members.len() > self.limit {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.members.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn remove(&mut self, tag: i32) -> bool {
        let removed = self.members.remove(&tag);
        if removed {
            self.order.retain(|&t| t != tag);
        }
        removed
    }

    fn contains(&self, tag: i32) -> bool {
        self.members.contains(&tag)
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

/// Slots by tag, plus tags whose waiter gave up
struct SlotTable {
    slots: HashMap<i32, Arc<Slot>>,

    /// Late frames for these tags are discarded
    abandoned: RecentTags,

    /// Cancelled before anyone waited; the next wait fails at once
    cancelled: RecentTags,
}

impl SlotTable {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            abandoned: RecentTags::new(MAX_ABANDONED_TAGS),
            cancelled: RecentTags::new(MAX_ABANDONED_TAGS),
        }
    }

    fn remove_if_same(&mut self, tag: i32, slot: &Arc<Slot>) {
        if self
            .slots
            .get(&tag)
            .map_or(false, |current| Arc::ptr_eq(current, slot))
        {
            self.slots.remove(&tag);
        }
    }
}

/// State shared between the handle and the reader thread
struct Shared {
    conn: TaggedConnection,

    /// Only shared mutable structure besides the stream itself
    table: Mutex<SlotTable>,

    slot_capacity: usize,

    /// Never sent on; dropping the sender wakes every waiter
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
}

impl Shared {
    /// Get or create the slot for `tag`, unless the wait was cancelled early
    fn slot(&self, tag: i32) -> Result<Arc<Slot>> {
        let mut table = self.table.lock();
        if table.cancelled.remove(tag) {
            return Err(MuxError::Cancelled { tag });
        }
        Ok(Arc::clone(
            table
                .slots
                .entry(tag)
                .or_insert_with(|| Arc::new(Slot::new(self.slot_capacity))),
        ))
    }

    /// Deposit an inbound frame (reader thread only)
    fn deliver(&self, frame: Frame) {
        let mut table = self.table.lock();

        if table.abandoned.contains(frame.tag) {
            tracing::warn!(
                "Dropping {} byte frame for abandoned tag {}",
                frame.payload.len(),
                frame.tag
            );
            return;
        }

        let slot = table
            .slots
            .entry(frame.tag)
            .or_insert_with(|| Arc::new(Slot::new(self.slot_capacity)));

        if !slot.deliver(frame.payload) {
            tracing::warn!(
                "Slot for tag {} is full ({} frames); rejecting frame",
                frame.tag,
                self.slot_capacity
            );
        }
    }

    /// Release the slot after a wait ends
    fn finish(&self, tag: i32, slot: &Arc<Slot>, outcome: &Result<Bytes>) {
        let mut table = self.table.lock();

        match outcome {
            Err(MuxError::Timeout { .. }) | Err(MuxError::Cancelled { .. }) => {
                table.remove_if_same(tag, slot);
                table.cancelled.remove(tag);
                table.abandoned.insert(tag);
            }
            Err(MuxError::ConnectionClosed) => table.remove_if_same(tag, slot),
            // More frames may follow on this tag; keep the slot while any are queued
            _ if slot.is_idle() => table.remove_if_same(tag, slot),
            _ => {}
        }
    }

    /// Stop accepting traffic and wake every waiter
    fn shut_down(&self) {
        if let Err(e) = self.conn.close() {
            tracing::debug!("Error closing connection to {}: {}", self.conn.peer_addr(), e);
        }
        self.shutdown_tx.lock().take();
    }
}

/// Tag demultiplexer over one `TaggedConnection`
///
/// ## Concurrency Model
/// - One background reader thread, started by `new`, stopped by `close`
/// - Any number of threads may `submit` and `await_response` at once;
///   requests are isolated by tag, not by a lock around the whole call
/// - Within one tag frames are consumed in arrival order
/// - Closing (locally, by the peer, or on a protocol error) acts as
///   cancellation of every outstanding wait
pub struct Demultiplexer {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Demultiplexer {
    /// Start demultiplexing `conn`
    ///
    /// `slot_capacity` bounds how many frames one tag may buffer.
    pub fn new(conn: TaggedConnection, slot_capacity: usize) -> Result<Self> {
        if slot_capacity == 0 {
            return Err(MuxError::Config(
                "slot_capacity must be at least 1".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = channel::bounded(0);
        let shared = Arc::new(Shared {
            conn,
            table: Mutex::new(SlotTable::new()),
            slot_capacity,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
        });

        let reader_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || run_reader(reader_shared))?;

        Ok(Self {
            shared,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Send a request frame
    ///
    /// Choosing a tag that is not currently outstanding is the caller's
    /// job. Submitting clears any abandoned or cancelled mark left on the tag.
    pub fn submit(&self, tag: i32, payload: &[u8]) -> Result<()> {
        {
            let mut table = self.shared.table.lock();
            table.abandoned.remove(tag);
            table.cancelled.remove(tag);
        }
        self.shared.conn.send(tag, payload)
    }

    /// Block until the next frame for `tag` arrives
    pub fn await_response(&self, tag: i32) -> Result<Bytes> {
        self.wait(tag, None)
    }

    /// Block until the next frame for `tag` arrives or `timeout` elapses
    ///
    /// On timeout the slot is released and later frames for the tag are
    /// discarded until it is submitted again.
    pub fn await_response_timeout(&self, tag: i32, timeout: Duration) -> Result<Bytes> {
        self.wait(tag, Some(timeout))
    }

    /// Cancel the wait on `tag` from another thread
    ///
    /// The waiter gets `Cancelled`, and frames queued or arriving later
    /// for the tag are discarded. If nobody is waiting yet, the next
    /// wait on the tag fails with `Cancelled` instead of blocking.
    pub fn cancel(&self, tag: i32) {
        let mut table = self.shared.table.lock();
        if let Some(slot) = table.slots.remove(&tag) {
            slot.cancel();
        }
        table.cancelled.insert(tag);
        table.abandoned.insert(tag);
        tracing::debug!("Cancelled wait on tag {}", tag);
    }

    /// Stop the reader, close the connection and release all waiters
    ///
    /// Idempotent.
    pub fn close(&self) -> Result<()> {
        let result = self.shared.conn.close();
        self.shared.shut_down();
        {
            let mut table = self.shared.table.lock();
            table.slots.clear();
            table.abandoned.clear();
            table.cancelled.clear();
        }

        if let Some(handle) = self.reader.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("Reader thread for {} panicked", self.shared.conn.peer_addr());
            }
        }

        result
    }

    pub fn is_closed(&self) -> bool {
        self.shared.conn.is_closed()
    }

    /// Number of live slots (waiting callers plus undelivered tags)
    pub fn pending_slots(&self) -> usize {
        self.shared.table.lock().slots.len()
    }

    /// Number of tags whose late frames are currently being discarded
    pub fn abandoned_tags(&self) -> usize {
        self.shared.table.lock().abandoned.len()
    }

    pub fn peer_addr(&self) -> &str {
        self.shared.conn.peer_addr()
    }

    fn wait(&self, tag: i32, timeout: Option<Duration>) -> Result<Bytes> {
        let slot = self.shared.slot(tag)?;
        let deadline = match timeout {
            Some(timeout) => channel::after(timeout),
            None => channel::never(),
        };

        let outcome = if let Some(payload) = slot.try_take() {
            Ok(payload)
        } else if slot.take_overflow() {
            Err(MuxError::SlotOverflow { tag })
        } else {
            select! {
                recv(slot.frames()) -> payload => payload.map_err(|_| MuxError::ConnectionClosed),
                recv(slot.cancellation()) -> _ => Err(MuxError::Cancelled { tag }),
                recv(self.shared.shutdown_rx) -> _ => {
                    // Frames delivered before the close still belong to the caller
                    slot.try_take().ok_or(MuxError::ConnectionClosed)
                }
                recv(deadline) -> _ => Err(MuxError::Timeout { tag }),
            }
        };

        self.shared.finish(tag, &slot, &outcome);
        outcome
    }
}

impl Drop for Demultiplexer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("Error closing demultiplexer: {}", e);
        }
    }
}

/// Reader loop: drain the connection until it fails or closes
fn run_reader(shared: Arc<Shared>) {
    let peer = shared.conn.peer_addr().to_string();
    tracing::debug!("Reader started for {}", peer);

    loop {
        match shared.conn.receive() {
            Ok(Some(frame)) => {
                tracing::trace!(
                    "Routing frame tag={} len={} from {}",
                    frame.tag,
                    frame.payload.len(),
                    peer
                );
                shared.deliver(frame);
            }
            Ok(None) => {
                tracing::debug!("Peer {} closed the connection", peer);
                break;
            }
            Err(MuxError::ConnectionClosed) => {
                tracing::debug!("Reader for {} stopped by close", peer);
                break;
            }
            Err(e) => {
                tracing::warn!("Reader for {} failed: {}", peer, e);
                break;
            }
        }
    }

    shared.shut_down();
}
