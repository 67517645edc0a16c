// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Non-recursive mutex (§4.4): mutual exclusion with direct ownership
//! handoff on release, no priority inheritance. Inversion is mitigated only
//! by the wait queue's strict priority ordering, per the base design's
//! stance that inheritance isn't worth its bookkeeping cost here.

use core::cell::Cell;

use crate::error::{Error, Result};
use crate::scheduler;
use crate::sync::wait_queue::WaitQueue;
use crate::thread;
use crate::types::ThreadId;

pub struct Mutex {
    holder: Cell<Option<ThreadId>>,
    waiters: WaitQueue,
}

unsafe impl Sync for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex { holder: Cell::new(None), waiters: WaitQueue::new() }
    }

    pub fn is_locked(&self) -> bool {
        self.holder.get().is_some()
    }

    /// Blocks until the mutex is free or `timeout_ms` elapses. Re-entering
    /// from the thread that already holds it deadlocks, as with any
    /// non-recursive mutex — this is not detected.
    pub fn acquire(&self, timeout_ms: u32) -> Result<()> {
        let tid = thread::current();
        let acquired = scheduler::with_sched(|s| {
            if self.holder.get().is_none() {
                self.holder.set(Some(tid));
                true
            } else {
                scheduler::block_locked(s, tid, self.waiters.raw(), timeout_ms);
                false
            }
        });
        if acquired {
            return Ok(());
        }
        scheduler::with_sched(|s| s.tcb(tid).wake_result.take())
            .unwrap_or_else(|| Err(Error::not_ready("mutex acquire: woke with no recorded wake result")))
    }

    /// Takes the mutex only if it's currently free; never blocks.
    pub fn try_acquire(&self) -> Result<()> {
        let tid = thread::current();
        scheduler::with_sched(|_| {
            if self.holder.get().is_none() {
                self.holder.set(Some(tid));
                Ok(())
            } else {
                Err(Error::not_ready("mutex is held"))
            }
        })
    }

    /// Releases the mutex, handing it directly to the highest-priority
    /// waiter, if any, rather than clearing `holder` and letting waiters
    /// race `try_acquire` (which would let a non-waiting thread cut in line
    /// and starve the queue).
    ///
    /// Releasing a mutex this thread doesn't hold is a programming error,
    /// not a recoverable one: it indicates a double-release or a release by
    /// the wrong thread, either of which means the caller's locking
    /// discipline is already broken.
    pub fn release(&self) {
        let tid = thread::current();
        scheduler::with_sched(|s| {
            if self.holder.get() != Some(tid) {
                crate::kpanic::fatal("mutex: release by a thread that does not hold it");
            }
            let next = scheduler::wake_one_locked(s, self.waiters.raw());
            self.holder.set(next);
        });
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        if self.holder.get().is_some() || !self.waiters.is_empty() {
            crate::kpanic::fatal("mutex dropped while held or with waiters blocked on it");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blue_arch::Arch;

    fn reset_all() {
        Arch::reset();
        scheduler::reset_for_tests();
    }

    #[test]
    fn uncontended_acquire_and_release_round_trips() {
        reset_all();
        let m = Mutex::new();
        assert!(m.acquire(crate::clock::WAITING_FOREVER).is_ok());
        assert!(m.is_locked());
        m.release();
        assert!(!m.is_locked());
    }

    #[test]
    fn try_acquire_fails_while_held() {
        reset_all();
        let m = Mutex::new();
        assert!(m.try_acquire().is_ok());
        assert!(m.try_acquire().is_err());
        m.release();
        assert!(m.try_acquire().is_ok());
    }

    #[test]
    fn release_hands_off_directly_to_waiter_without_clearing_holder() {
        reset_all();
        let m = Mutex::new();
        assert!(m.try_acquire().is_ok());
        let waiter = thread::create("waiter", 5, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        scheduler::with_sched(|s| {
            scheduler::block_locked(s, waiter, m.waiters.raw(), crate::clock::WAITING_FOREVER)
        });
        m.release();
        assert_eq!(m.holder.get(), Some(waiter));
        let result = scheduler::with_sched(|s| s.tcb(waiter).wake_result.take());
        assert_eq!(result, Some(Ok(())));
    }
}
