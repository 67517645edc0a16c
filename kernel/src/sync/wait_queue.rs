//! The public wait-queue primitive (§4.3) every blocking synchronization
//! object embeds: `Mutex`, `Semaphore`, and `Event` each hold one of these
//! rather than reimplementing block/wake bookkeeping.
//!
//! This is a thin wrapper around `scheduler::WaitQueue`
//! (`blue_infra::list::index_list::IndexList<ThreadId>`) plus the
//! thread-status plumbing (`wake_result`, the embedded timeout timer) that
//! `scheduler::block_locked`/`wake_one_locked` already implement. The
//! wrapper's job is purely the public-facing contract: block the calling
//! thread and return its eventual status, rather than operate on an
//! already-known `ThreadId` the way the scheduler's own `_locked` helpers
//! do.

use blue_infra::list::index_list::IndexList;

use crate::error::{Error, Result};
use crate::scheduler::{self, WaitQueue as RawWaitQueue};
use crate::thread;
use crate::types::ThreadId;

pub struct WaitQueue {
    raw: RawWaitQueue,
}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue { raw: IndexList::new() }
    }

    pub(crate) fn raw(&self) -> &RawWaitQueue {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Parks the calling thread here until woken or `timeout_ms` elapses.
    /// Returns `Ok(())` on a normal wake, `Err(TimedOut)` on timeout, or
    /// `Err(Interrupted)` if the queue was destroyed out from under it.
    pub fn block(&self, timeout_ms: u32) -> Result<()> {
        let tid = thread::current();
        scheduler::with_sched(|s| scheduler::block_locked(s, tid, &self.raw, timeout_ms));
        scheduler::with_sched(|s| s.tcb(tid).wake_result.take())
            .unwrap_or_else(|| Err(Error::not_ready("block: woke with no recorded wake result")))
    }

    /// Wakes the highest-priority waiter, if any, with an `Ok` status.
    /// Returns whether a thread was woken.
    pub fn wake_one(&self) -> bool {
        scheduler::with_sched(|s| scheduler::wake_one_locked(s, &self.raw)).is_some()
    }

    /// Wakes every waiter, in priority order, with an `Ok` status. Returns
    /// the count woken.
    pub fn wake_all(&self) -> u32 {
        scheduler::with_sched(|s| scheduler::wake_all_locked(s, &self.raw))
    }

    /// Wakes every waiter with `Interrupted` and returns. Destroying a
    /// non-empty queue is a diagnosable error — callers of embedded queues
    /// (mutex, semaphore, event) must guarantee emptiness before dropping
    /// the object that owns this queue.
    pub fn destroy(&self) -> Result<()> {
        if self.raw.is_empty() {
            return Ok(());
        }
        while wake_one_interrupted(&self.raw).is_some() {}
        Err(Error::not_ready("destroy: wait queue was non-empty"))
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn wake_one_interrupted(wq: &RawWaitQueue) -> Option<ThreadId> {
    scheduler::with_sched(|s| {
        let tid = wq.pop_front(s)?;
        let tcb = s.tcb(tid);
        tcb.current_wq.set(None);
        crate::timer::cancel_locked(s, &tcb.timeout_timer);
        tcb.wake_result.set(Some(Err(Error::interrupted("wait queue destroyed while thread was blocked"))));
        scheduler::enqueue_ready_locked(s, tid);
        scheduler::maybe_preempt_locked(s, tid);
        Some(tid)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread;
    use blue_arch::Arch;

    fn reset_all() {
        Arch::reset();
        scheduler::reset_for_tests();
    }

    #[test]
    fn destroy_on_empty_queue_is_ok() {
        reset_all();
        let wq = WaitQueue::new();
        assert!(wq.destroy().is_ok());
    }

    #[test]
    fn destroy_wakes_waiters_interrupted_and_reports_error() {
        reset_all();
        let wq = WaitQueue::new();
        let t = thread::create("waiter", 5, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        scheduler::with_sched(|s| scheduler::block_locked(s, t, wq.raw(), crate::clock::WAITING_FOREVER));
        assert!(wq.destroy().is_err());
        let result = scheduler::with_sched(|s| s.tcb(t).wake_result.take());
        assert_eq!(result, Some(Err(Error::interrupted("wait queue destroyed while thread was blocked"))));
    }
}
