//! Pending cross-core calls
//!
//! Tracks requests this core has sent to another shard and not yet seen
//! answered. Lives on the origin core only.

use std::cell::{Cell, RefCell};
use std::time::Instant;

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::models::Response;

#[derive(Debug)]
pub struct PendingCall {
    pub deadline: Instant,
    reply: oneshot::Sender<Response>,
}

/// Table of outstanding calls keyed by correlation id.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: RefCell<FxHashMap<u64, PendingCall>>,
    next_id: Cell<u64>,
    unmatched: Cell<u64>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call under a fresh correlation id.
    ///
    /// Ids still outstanding are skipped, so an id is only handed out again
    /// after its previous call resolved, timed out or was cancelled.
    pub fn register(&self, deadline: Instant) -> (u64, oneshot::Receiver<Response>) {
        let (reply, receiver) = oneshot::channel();
        let mut calls = self.calls.borrow_mut();

        let mut id = self.next_id.get();
        while calls.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        self.next_id.set(id.wrapping_add(1));

        calls.insert(id, PendingCall { deadline, reply });
        (id, receiver)
    }

    /// Delivers a response to its waiting caller.
    ///
    /// Returns false when no call is waiting under `id` (already timed out or
    /// cancelled); the response is then dropped.
    pub fn resolve(&self, id: u64, response: Response) -> bool {
        let call = self.calls.borrow_mut().remove(&id);
        match call {
            Some(call) => {
                // a closed receiver means the caller went away after lookup
                if call.reply.send(response).is_ok() {
                    return true;
                }
                self.unmatched.set(self.unmatched.get() + 1);
                false
            }
            None => {
                self.unmatched.set(self.unmatched.get() + 1);
                false
            }
        }
    }

    /// Forgets a call. Returns true if it was still outstanding.
    pub fn cancel(&self, id: u64) -> bool {
        self.calls.borrow_mut().remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.calls.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    /// Responses that arrived with nobody waiting.
    pub fn unmatched(&self) -> u64 {
        self.unmatched.get()
    }
}

/// Removes its call from the table when dropped.
///
/// Held by the waiting `submit` future, so dropping that future or letting
/// its deadline pass unregisters the call before anything else can match it.
pub(crate) struct PendingGuard<'a> {
    calls: &'a PendingCalls,
    id: u64,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(calls: &'a PendingCalls, id: u64) -> Self {
        Self { calls, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.calls.cancel(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(1)
    }

    #[test]
    fn test_register_and_resolve() {
        let calls = PendingCalls::new();
        let (id, mut rx) = calls.register(deadline());

        assert!(calls.contains(id));
        assert!(calls.resolve(id, Response::ok(7)));
        assert!(calls.is_empty());
        assert_eq!(rx.try_recv().unwrap(), Response::ok(7));
    }

    #[test]
    fn test_ids_are_unique_while_outstanding() {
        let calls = PendingCalls::new();
        let (a, _rx_a) = calls.register(deadline());
        let (b, _rx_b) = calls.register(deadline());
        assert_ne!(a, b);
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn test_register_skips_outstanding_ids_after_wrap() {
        let calls = PendingCalls::new();
        let (first, _rx) = calls.register(deadline());
        assert_eq!(first, 0);

        calls.next_id.set(0);
        let (second, _rx2) = calls.register(deadline());
        assert_eq!(second, 1);
    }

    #[test]
    fn test_late_response_is_unmatched() {
        let calls = PendingCalls::new();
        let (id, _rx) = calls.register(deadline());

        assert!(calls.cancel(id));
        assert!(!calls.resolve(id, Response::ok(0)));
        assert_eq!(calls.unmatched(), 1);
    }

    #[test]
    fn test_guard_removes_on_drop() {
        let calls = PendingCalls::new();
        let (id, _rx) = calls.register(deadline());
        {
            let _guard = PendingGuard::new(&calls, id);
        }
        assert!(!calls.contains(id));
    }

    #[test]
    fn test_resolve_with_dropped_receiver() {
        let calls = PendingCalls::new();
        let (id, rx) = calls.register(deadline());
        drop(rx);
        assert!(!calls.resolve(id, Response::ok(0)));
        assert_eq!(calls.unmatched(), 1);
    }
}
