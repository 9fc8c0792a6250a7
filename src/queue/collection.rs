//! Routing and admission across the three priority classes
//!
//! Priority work strictly preempts: while a priority-class request is
//! pending or in flight, nothing else is admitted. Once priority is clear,
//! normal and deferred drain together in the same pass, each up to its own
//! capacity.

use tracing::debug;

use crate::error::BridgeError;
use crate::protocol::prioritization::{classify, CommandClass};
use crate::queue::request::PendingRequest;
use crate::queue::request_queue::RequestQueue;

/// Transmits a request, returning the sequence id the transport assigned
pub type DispatchFn = Box<dyn FnMut(&PendingRequest) -> u64 + Send>;

/// Owns the three class queues and the admission algorithm
pub struct RequestQueueCollection {
    priority: RequestQueue,
    normal: RequestQueue,
    deferred: RequestQueue,
    dispatch: DispatchFn,
    is_processing: bool,
}

impl RequestQueueCollection {
    /// Create the collection for a given overall server concurrency
    ///
    /// Priority capacity is fixed at 1 (true mutual exclusion); deferred
    /// gets a small fraction of the normal capacity, never below 2.
    pub fn new(concurrency: usize, dispatch: DispatchFn) -> Self {
        Self {
            priority: RequestQueue::new("priority", 1),
            normal: RequestQueue::new("normal", concurrency),
            deferred: RequestQueue::new("deferred", (concurrency / 4).max(2)),
            dispatch,
            is_processing: false,
        }
    }

    /// The queue a command class maps to
    pub fn queue(&self, class: CommandClass) -> &RequestQueue {
        match class {
            CommandClass::Priority => &self.priority,
            CommandClass::Normal => &self.normal,
            CommandClass::Deferred => &self.deferred,
        }
    }

    fn queue_for_mut(&mut self, command: &str) -> &mut RequestQueue {
        match classify(command) {
            CommandClass::Priority => &mut self.priority,
            CommandClass::Normal => &mut self.normal,
            CommandClass::Deferred => &mut self.deferred,
        }
    }

    /// Whether no queue has work waiting to be sent
    pub fn is_empty(&self) -> bool {
        !self.priority.has_pending() && !self.normal.has_pending() && !self.deferred.has_pending()
    }

    /// Classify, enqueue, and run a drain pass
    pub fn enqueue(&mut self, request: PendingRequest) {
        self.queue_for_mut(&request.command).enqueue(request);
        self.drain();
    }

    /// Remove and return the in-flight request a response refers to
    pub fn complete(&mut self, command: &str, seq: u64) -> Option<PendingRequest> {
        self.queue_for_mut(command).complete(seq)
    }

    /// Cancel a request wherever it currently lives
    ///
    /// The caller is rejected immediately. Cancelling an in-flight request
    /// frees a slot, so a drain pass runs; its late response will miss the
    /// in-flight map and be discarded.
    pub fn cancel_request(&mut self, command: &str, handle: u64) -> bool {
        match self.queue_for_mut(command).cancel(handle) {
            Some((request, was_in_flight)) => {
                request.reject(BridgeError::Cancelled);
                if was_in_flight {
                    self.drain();
                }
                true
            }
            None => false,
        }
    }

    /// Reject every pending and in-flight request across all queues
    ///
    /// Used when the transport dies or the session stops; a request must
    /// never hang forever.
    pub fn abort_all(&mut self, error: impl Fn() -> BridgeError) {
        let mut aborted = 0usize;
        for queue in [&mut self.priority, &mut self.normal, &mut self.deferred] {
            for request in queue.take_all() {
                request.reject(error());
                aborted += 1;
            }
        }
        if aborted > 0 {
            debug!(aborted, "aborted outstanding requests");
        }
    }

    /// Single-pass admission
    ///
    /// Priority work monopolizes a pass: while the priority queue has
    /// anything pending, only it is drained. Normal and deferred proceed
    /// together once priority is clear. The `is_processing` flag guards
    /// against re-entrant passes from synchronous completion callbacks.
    pub fn drain(&mut self) {
        if self.is_processing {
            return;
        }

        if self.priority.is_full() {
            return;
        }

        if self.normal.is_full() && self.deferred.is_full() {
            return;
        }

        self.is_processing = true;

        if self.priority.has_pending() {
            self.priority.process_pending(&mut self.dispatch);
            self.is_processing = false;
            return;
        }

        if self.normal.has_pending() {
            self.normal.process_pending(&mut self.dispatch);
        }

        if self.deferred.has_pending() {
            self.deferred.process_pending(&mut self.dispatch);
        }

        self.is_processing = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::protocol::requests;

    /// Collection whose dispatcher records every send and assigns
    /// sequence ids 1, 2, 3, ...
    fn collection(concurrency: usize) -> (RequestQueueCollection, Arc<Mutex<Vec<(String, u64)>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&sent);
        let counter = AtomicU64::new(0);
        let dispatch: DispatchFn = Box::new(move |request| {
            let seq = counter.fetch_add(1, Ordering::SeqCst) + 1;
            record.lock().unwrap().push((request.command.clone(), seq));
            seq
        });
        (RequestQueueCollection::new(concurrency, dispatch), sent)
    }

    fn enqueue(collection: &mut RequestQueueCollection, command: &str, handle: u64) {
        let (request, rx) = PendingRequest::new(command, None, handle);
        // receivers dropped on purpose; these tests watch the dispatcher
        drop(rx);
        collection.enqueue(request);
    }

    #[test]
    fn test_normal_capacity_bounds_dispatch() {
        let (mut collection, sent) = collection(8);

        for handle in 1..=10 {
            enqueue(&mut collection, requests::FIND_SYMBOLS, handle);
        }

        assert_eq!(sent.lock().unwrap().len(), 8);
        assert_eq!(collection.queue(CommandClass::Normal).in_flight(), 8);
        assert_eq!(collection.queue(CommandClass::Normal).pending(), 2);

        // three completions free three slots; the two stragglers go out
        for seq in 1..=3 {
            let request = collection.complete(requests::FIND_SYMBOLS, seq).unwrap();
            request.resolve(json!(null));
            collection.drain();
        }

        assert_eq!(sent.lock().unwrap().len(), 10);
        assert_eq!(collection.queue(CommandClass::Normal).in_flight(), 7);
        assert_eq!(collection.queue(CommandClass::Normal).pending(), 0);
    }

    #[test]
    fn test_priority_monopolizes_admission() {
        let (mut collection, sent) = collection(8);

        enqueue(&mut collection, requests::UPDATE_BUFFER, 1);
        for handle in 2..=6 {
            enqueue(&mut collection, requests::FIND_SYMBOLS, handle);
        }

        // only the priority request has been sent
        {
            let sent = sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].0, requests::UPDATE_BUFFER);
        }
        assert_eq!(collection.queue(CommandClass::Normal).in_flight(), 0);

        // completing it releases the normal traffic
        let request = collection.complete(requests::UPDATE_BUFFER, 1).unwrap();
        request.resolve(json!(null));
        collection.drain();

        assert_eq!(sent.lock().unwrap().len(), 6);
        assert_eq!(collection.queue(CommandClass::Normal).in_flight(), 5);
    }

    #[test]
    fn test_priority_capacity_is_one() {
        let (mut collection, sent) = collection(8);

        enqueue(&mut collection, requests::UPDATE_BUFFER, 1);
        enqueue(&mut collection, requests::CHANGE_BUFFER, 2);

        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(collection.queue(CommandClass::Priority).in_flight(), 1);
        assert_eq!(collection.queue(CommandClass::Priority).pending(), 1);
    }

    #[test]
    fn test_normal_and_deferred_drain_in_the_same_pass() {
        let (mut collection, sent) = collection(8);

        // deferred first so the drain order (normal, then deferred) is
        // what interleaves them, not enqueue order
        enqueue(&mut collection, "/codecheck", 1);
        enqueue(&mut collection, requests::FIND_USAGES, 2);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(collection.queue(CommandClass::Deferred).in_flight(), 1);
        assert_eq!(collection.queue(CommandClass::Normal).in_flight(), 1);
    }

    #[test]
    fn test_deferred_capacity_is_a_fraction_of_concurrency() {
        let (collection, _) = collection(8);
        assert_eq!(collection.queue(CommandClass::Deferred).capacity(), 2);

        let (collection, _) = self::collection(16);
        assert_eq!(collection.queue(CommandClass::Deferred).capacity(), 4);

        // never below 2, even for tiny concurrency
        let (collection, _) = self::collection(1);
        assert_eq!(collection.queue(CommandClass::Deferred).capacity(), 2);
    }

    #[test]
    fn test_deferred_overflow_stays_pending() {
        let (mut collection, sent) = collection(8);

        for handle in 1..=4 {
            enqueue(&mut collection, "/codecheck", handle);
        }

        assert_eq!(sent.lock().unwrap().len(), 2);
        assert_eq!(collection.queue(CommandClass::Deferred).in_flight(), 2);
        assert_eq!(collection.queue(CommandClass::Deferred).pending(), 2);
    }

    #[test]
    fn test_cancel_pending_rejects_caller() {
        let (mut collection, sent) = collection(1);

        // fill the single normal slot, then queue one more
        let (first, first_rx) = PendingRequest::new(requests::FIND_SYMBOLS, None, 1);
        drop(first_rx);
        collection.enqueue(first);
        let (second, mut second_rx) = PendingRequest::new(requests::FIND_SYMBOLS, None, 2);
        collection.enqueue(second);

        assert_eq!(sent.lock().unwrap().len(), 1);
        assert!(collection.cancel_request(requests::FIND_SYMBOLS, 2));

        let outcome = second_rx.try_recv().unwrap();
        assert!(matches!(outcome, Err(BridgeError::Cancelled)));
        // the server never saw the cancelled request
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_in_flight_frees_capacity() {
        let (mut collection, sent) = collection(1);

        enqueue(&mut collection, requests::FIND_SYMBOLS, 1);
        enqueue(&mut collection, requests::FIND_SYMBOLS, 2);
        assert_eq!(sent.lock().unwrap().len(), 1);

        assert!(collection.cancel_request(requests::FIND_SYMBOLS, 1));

        // the freed slot admitted the second request
        assert_eq!(sent.lock().unwrap().len(), 2);
        // the cancelled request's late response is a correlation miss
        assert!(collection.complete(requests::FIND_SYMBOLS, 1).is_none());
    }

    #[test]
    fn test_cancel_unknown_handle_is_false() {
        let (mut collection, _) = collection(8);
        assert!(!collection.cancel_request(requests::FIND_SYMBOLS, 42));
    }

    #[test]
    fn test_abort_all_rejects_everything() {
        let (mut collection, _) = collection(2);

        let mut receivers = Vec::new();
        for handle in 1..=4 {
            let (request, rx) = PendingRequest::new(requests::FIND_SYMBOLS, None, handle);
            receivers.push(rx);
            collection.enqueue(request);
        }

        collection.abort_all(|| BridgeError::TransportClosed);

        for mut rx in receivers {
            let outcome = rx.try_recv().unwrap();
            assert!(matches!(outcome, Err(BridgeError::TransportClosed)));
        }
        assert!(collection.is_empty());
        assert_eq!(collection.queue(CommandClass::Normal).in_flight(), 0);
    }

    #[test]
    fn test_exactly_once_completion() {
        let (mut collection, _) = collection(8);

        let (request, mut rx) = PendingRequest::new(requests::FIND_SYMBOLS, None, 1);
        collection.enqueue(request);

        let request = collection.complete(requests::FIND_SYMBOLS, 1).unwrap();
        request.resolve(json!({"QuickFixes": []}));

        assert!(rx.try_recv().unwrap().is_ok());
        // a duplicate response for the same sequence id finds nothing
        assert!(collection.complete(requests::FIND_SYMBOLS, 1).is_none());
    }
}
