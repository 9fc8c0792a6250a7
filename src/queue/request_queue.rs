//! Bounded queue for one priority class
//!
//! Manages requests that have been made and requests that have been sent to
//! the server and are waiting on a response. The pending list is unbounded;
//! the in-flight map is capped at `capacity`.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::queue::request::PendingRequest;

/// Ordered pending list plus a capacity-bounded in-flight map
pub struct RequestQueue {
    name: &'static str,
    capacity: usize,
    pending: VecDeque<PendingRequest>,
    waiting: HashMap<u64, PendingRequest>,
}

impl RequestQueue {
    /// Create a queue with the given in-flight capacity
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            pending: VecDeque::new(),
            waiting: HashMap::new(),
        }
    }

    /// The queue's diagnostic name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum number of requests allowed in flight
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of requests currently awaiting a response
    pub fn in_flight(&self) -> usize {
        self.waiting.len()
    }

    /// Number of requests accepted but not yet sent
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append a request to the pending list; draining is a separate step
    pub fn enqueue(&mut self, request: PendingRequest) {
        debug!(queue = self.name, command = %request.command, "enqueuing request");
        self.pending.push_back(request);
    }

    /// Whether any requests are waiting to be sent
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether the in-flight map has reached capacity
    pub fn is_full(&self) -> bool {
        self.waiting.len() >= self.capacity
    }

    /// Send pending requests until the queue is full or the list is empty
    ///
    /// `dispatch` transmits the request and returns the sequence id the
    /// transport assigned. Stops the instant the queue becomes full;
    /// overshooting capacity is a correctness bug.
    pub fn process_pending(&mut self, mut dispatch: impl FnMut(&PendingRequest) -> u64) {
        if self.pending.is_empty() {
            return;
        }

        let slots = self.capacity - self.waiting.len();
        debug!(queue = self.name, slots, "processing pending requests");

        for _ in 0..slots {
            let Some(request) = self.pending.pop_front() else {
                break;
            };

            let seq = dispatch(&request);
            self.waiting.insert(seq, request);

            if self.is_full() {
                break;
            }
        }
    }

    /// Remove and return the in-flight request for a sequence id
    ///
    /// A miss is a diagnostic, not an error: the response either raced a
    /// cancellation or references a request this client never sent.
    pub fn complete(&mut self, seq: u64) -> Option<PendingRequest> {
        let request = self.waiting.remove(&seq);
        if let Some(ref request) = request {
            debug!(queue = self.name, command = %request.command, seq, "request completed");
        } else {
            debug!(queue = self.name, seq, "no in-flight request for sequence id");
        }
        request
    }

    /// Remove a request by its client-side handle
    ///
    /// Returns the request and whether it was already in flight. A pending
    /// request is removed without the server ever seeing it; an in-flight
    /// request is forgotten so its late response is discarded.
    pub fn cancel(&mut self, handle: u64) -> Option<(PendingRequest, bool)> {
        if let Some(index) = self.pending.iter().position(|r| r.handle == handle) {
            let request = self.pending.remove(index)?;
            debug!(queue = self.name, command = %request.command, "cancelled pending request");
            return Some((request, false));
        }

        let seq = self
            .waiting
            .iter()
            .find(|(_, r)| r.handle == handle)
            .map(|(seq, _)| *seq)?;
        let request = self.waiting.remove(&seq)?;
        debug!(queue = self.name, command = %request.command, seq, "cancelled in-flight request");
        Some((request, true))
    }

    /// Remove every request in any state, for session-level aborts
    pub fn take_all(&mut self) -> Vec<PendingRequest> {
        let mut all: Vec<PendingRequest> = self.pending.drain(..).collect();
        all.extend(self.waiting.drain().map(|(_, request)| request));
        all
    }
}
