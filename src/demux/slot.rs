//! Per-tag delivery slot
//!
//! Bounded FIFO between the reader thread (producer) and the caller
//! waiting on one tag (consumer).

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};

/// Rendezvous point for the frames of one tag
pub(crate) struct Slot {
    frames_tx: Sender<Bytes>,
    frames_rx: Receiver<Bytes>,

    /// Capacity 1: a pending cancellation
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,

    /// A frame was rejected because the slot was full
    overflowed: AtomicBool,
}

impl Slot {
    pub(crate) fn new(capacity: usize) -> Self {
        let (frames_tx, frames_rx) = channel::bounded(capacity);
        let (cancel_tx, cancel_rx) = channel::bounded(1);

        Self {
            frames_tx,
            frames_rx,
            cancel_tx,
            cancel_rx,
            overflowed: AtomicBool::new(false),
        }
    }

    /// Queue a payload without blocking
    ///
    /// Returns false (and marks the slot overflowed) if the slot is full.
    pub(crate) fn deliver(&self, payload: Bytes) -> bool {
        match self.frames_tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.overflowed.store(true, Ordering::Release);
                false
            }
            // Unreachable: the slot owns its receiver
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub(crate) fn try_take(&self) -> Option<Bytes> {
        self.frames_rx.try_recv().ok()
    }

    /// Consume the overflow mark
    pub(crate) fn take_overflow(&self) -> bool {
        self.overflowed.swap(false, Ordering::AcqRel)
    }

    /// Nothing queued and nothing to report
    pub(crate) fn is_idle(&self) -> bool {
        self.frames_rx.is_empty() && !self.overflowed.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    pub(crate) fn frames(&self) -> &Receiver<Bytes> {
        &self.frames_rx
    }

    pub(crate) fn cancellation(&self) -> &Receiver<()> {
        &self.cancel_rx
    }
}
