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

//! Event (§4.4): a boolean signalled flag with an optional auto-unsignal
//! policy, the part of the reference codebase's flag-based `Event` every
//! caller in this core's scope actually used. The reference's AND/OR/CLEAR
//! option bits (matching a *set* of bits rather than one flag) are dropped
//! here — see `DESIGN.md`'s Open Question entry for why a single boolean
//! plus auto-unsignal covers §4.4's contract without them.

use core::cell::Cell;

use crate::error::{Error, Result};
use crate::scheduler;
use crate::sync::wait_queue::WaitQueue;
use crate::thread;

pub struct Event {
    signalled: Cell<bool>,
    auto_unsignal: bool,
    waiters: WaitQueue,
}

unsafe impl Sync for Event {}

impl Event {
    pub const fn new(auto_unsignal: bool) -> Self {
        Event {
            signalled: Cell::new(false),
            auto_unsignal,
            waiters: WaitQueue::new(),
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.signalled.get()
    }

    /// Sets the flag. A plain event wakes every waiter; an auto-unsignal
    /// event wakes at most one and immediately clears the flag again, since
    /// handing the same signal to a second thread would contradict
    /// "auto-unsignal on wake".
    pub fn signal(&self) {
        scheduler::with_sched(|s| {
            self.signalled.set(true);
            if self.auto_unsignal {
                if scheduler::wake_one_locked(s, self.waiters.raw()).is_some() {
                    self.signalled.set(false);
                }
            } else {
                scheduler::wake_all_locked(s, self.waiters.raw());
            }
        });
    }

    pub fn unsignal(&self) {
        self.signalled.set(false);
    }

    /// Blocks until signalled or `timeout_ms` elapses. An already-signalled
    /// event returns immediately without blocking; for an auto-unsignal
    /// event this also clears the flag, matching what a woken waiter would
    /// observe.
    pub fn wait(&self, timeout_ms: u32) -> Result<()> {
        let tid = thread::current();
        let blocked = scheduler::with_sched(|s| {
            if self.signalled.get() {
                if self.auto_unsignal {
                    self.signalled.set(false);
                }
                false
            } else {
                scheduler::block_locked(s, tid, self.waiters.raw(), timeout_ms);
                true
            }
        });
        if !blocked {
            return Ok(());
        }
        scheduler::with_sched(|s| s.tcb(tid).wake_result.take())
            .unwrap_or_else(|| Err(Error::not_ready("event wait: woke with no recorded wake result")))
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if !self.waiters.is_empty() {
            crate::kpanic::fatal("event dropped while waiters are still blocked on it");
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
    fn wait_on_an_already_signalled_event_does_not_block() {
        reset_all();
        let e = Event::new(false);
        e.signal();
        assert!(e.wait(0).is_ok());
        assert!(e.is_signalled());
    }

    #[test]
    fn auto_unsignal_wait_clears_the_flag_on_the_way_out() {
        reset_all();
        let e = Event::new(true);
        e.signal();
        assert!(e.wait(0).is_ok());
        assert!(!e.is_signalled());
    }

    #[test]
    fn plain_signal_wakes_every_waiter() {
        reset_all();
        let e = Event::new(false);
        let a = thread::create("a", 5, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        let b = thread::create("b", 5, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        scheduler::with_sched(|s| {
            scheduler::block_locked(s, a, e.waiters.raw(), crate::clock::WAITING_FOREVER);
            scheduler::block_locked(s, b, e.waiters.raw(), crate::clock::WAITING_FOREVER);
        });
        e.signal();
        assert_eq!(scheduler::with_sched(|s| s.tcb(a).wake_result.take()), Some(Ok(())));
        assert_eq!(scheduler::with_sched(|s| s.tcb(b).wake_result.take()), Some(Ok(())));
        assert!(e.is_signalled());
    }

    #[test]
    fn auto_unsignal_signal_wakes_exactly_one_waiter() {
        reset_all();
        let e = Event::new(true);
        let a = thread::create("a", 9, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        let b = thread::create("b", 5, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        scheduler::with_sched(|s| {
            scheduler::block_locked(s, a, e.waiters.raw(), crate::clock::WAITING_FOREVER);
            scheduler::block_locked(s, b, e.waiters.raw(), crate::clock::WAITING_FOREVER);
        });
        e.signal();
        assert_eq!(scheduler::with_sched(|s| s.tcb(a).wake_result.take()), Some(Ok(())));
        assert_eq!(scheduler::with_sched(|s| s.tcb(b).wake_result.get()), None);
        assert!(!e.is_signalled());
    }
}
