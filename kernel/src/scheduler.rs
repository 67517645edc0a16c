//! Scheduler state and algorithm (§4.1-4.3): a fixed thread arena, 32
//! per-priority run queues selected by a ready bitmap, a sleep list, a
//! zombie list, and the software timer wheel (`crate::timer`) — all
//! protected by one SMP spinlock, per the global invariant that every
//! mutation to a run queue, wait queue, the timer list, or the thread list
//! happens under that one lock with interrupts masked (the `SpinLock`
//! backend masks interrupts itself).
//!
//! Every list here is keyed by [`ThreadId`] or `NonNull<Timer>` and built on
//! [`IndexList`]; a thread is linked into at most one of {run queue, wait
//! queue, sleep list, zombie list} at a time because it has exactly one
//! embedded [`Link<ThreadId>`] (in `Tcb`), shared by whichever list
//! currently owns it.

extern crate alloc;

use alloc::boxed::Box;
use core::cell::Cell;
use core::ptr::NonNull;

use blue_infra::list::index_list::{IndexList, Link, LinkStore};
use blue_kconfig::{CPUS_NR, MAX_THREADS, NUM_PRIORITIES};

use crate::sync::lock::spinlock::SpinLock;
use crate::thread::{Tcb, ThreadState};
use crate::timer::Timer;
use crate::types::{AffinityMask, CpuId, Priority, ThreadId};

/// A FIFO-within-priority wait list threads block on: mutexes, semaphores,
/// events, and a thread's own join waiters all hold one of these.
pub type WaitQueue = IndexList<ThreadId>;

pub struct Sched {
    threads: [Option<Box<Tcb>>; MAX_THREADS],
    next_free: Cell<usize>,
    run_queues: [IndexList<ThreadId>; NUM_PRIORITIES as usize],
    ready_bitmap: Cell<u32>,
    sleep_list: IndexList<ThreadId>,
    zombie_list: IndexList<ThreadId>,
    timers: IndexList<NonNull<Timer>>,
}

impl Sched {
    pub const fn new() -> Self {
        Sched {
            threads: [const { None }; MAX_THREADS],
            next_free: Cell::new(0),
            run_queues: [const { IndexList::new() }; NUM_PRIORITIES as usize],
            ready_bitmap: Cell::new(0),
            sleep_list: IndexList::new(),
            zombie_list: IndexList::new(),
            timers: IndexList::new(),
        }
    }

    pub(crate) fn tcb(&self, tid: ThreadId) -> &Tcb {
        self.threads[tid.index()]
            .as_deref()
            .unwrap_or_else(|| crate::kpanic::fatal("scheduler: use of a dangling ThreadId"))
    }

    pub(crate) fn try_tcb(&self, tid: ThreadId) -> Option<&Tcb> {
        self.threads[tid.index()].as_deref()
    }

    pub(crate) fn timers(&self) -> &IndexList<NonNull<Timer>> {
        &self.timers
    }

    pub(crate) fn sleep_list(&self) -> &IndexList<ThreadId> {
        &self.sleep_list
    }

    pub(crate) fn zombie_list(&self) -> &IndexList<ThreadId> {
        &self.zombie_list
    }

    fn run_queue(&self, prio: Priority) -> &IndexList<ThreadId> {
        &self.run_queues[prio as usize]
    }

    /// Claims the first free arena slot starting at the last freed index, so
    /// repeated create/destroy cycles don't always reuse slot 0.
    pub(crate) fn alloc_tcb(&mut self, tcb: Box<Tcb>) -> Option<ThreadId> {
        let start = self.next_free.get();
        for offset in 0..MAX_THREADS {
            let idx = (start + offset) % MAX_THREADS;
            if self.threads[idx].is_none() {
                self.threads[idx] = Some(tcb);
                self.next_free.set((idx + 1) % MAX_THREADS);
                return Some(ThreadId::from_index(idx));
            }
        }
        None
    }

    pub(crate) fn free_tcb(&mut self, tid: ThreadId) -> Box<Tcb> {
        self.threads[tid.index()]
            .take()
            .unwrap_or_else(|| crate::kpanic::fatal("scheduler: double free of a ThreadId"))
    }
}

impl LinkStore<ThreadId> for Sched {
    fn link(&self, key: ThreadId) -> &Link<ThreadId> {
        &self.tcb(key).link
    }
}

impl LinkStore<NonNull<Timer>> for Sched {
    fn link(&self, key: NonNull<Timer>) -> &Link<NonNull<Timer>> {
        unsafe { &key.as_ref().link }
    }
}

static SCHED: SpinLock<Sched> = SpinLock::new(Sched::new());

/// Acquires the global scheduler lock for the duration of `f`. Every
/// operation that inspects or mutates thread/queue/timer state funnels
/// through here (directly, or via a sync primitive's own lock-then-delegate
/// wrapper) so the single-global-lock invariant holds without each caller
/// having to reason about it.
pub fn with_sched<R>(f: impl FnOnce(&mut Sched) -> R) -> R {
    let mut guard = SCHED.lock();
    f(&mut guard)
}

/// Moves `tid` onto its priority's run queue and marks it `Ready`. Used both
/// for a newly created thread and to re-queue one that was preempted.
pub(crate) fn enqueue_ready_locked(sched: &Sched, tid: ThreadId) {
    let prio = sched.tcb(tid).priority.get();
    sched.tcb(tid).state.set(ThreadState::Ready);
    sched.run_queue(prio).push_back(sched, tid);
    sched.ready_bitmap.set(sched.ready_bitmap.get() | (1 << prio));
}

pub(crate) fn dequeue_ready_locked(sched: &Sched, tid: ThreadId) {
    let prio = sched.tcb(tid).priority.get();
    sched.run_queue(prio).remove(sched, tid);
    if sched.run_queue(prio).is_empty() {
        sched.ready_bitmap.set(sched.ready_bitmap.get() & !(1 << prio));
    }
}

/// Scans ready priorities from highest to lowest, and within a priority in
/// FIFO order, for the first thread eligible to run on `cpu` (its affinity
/// mask includes `cpu`, and it isn't pinned elsewhere). Threads ineligible
/// for this CPU are left in place for another CPU's scan to find.
pub(crate) fn pick_next_locked(sched: &Sched, cpu: CpuId) -> Option<ThreadId> {
    let mut remaining = sched.ready_bitmap.get();
    while remaining != 0 {
        let prio = 31 - remaining.leading_zeros();
        let rq = sched.run_queue(prio as u8);
        let mut found = None;
        rq.for_each(sched, |tid| {
            if found.is_some() {
                return;
            }
            let t = sched.tcb(tid);
            let affinity_ok = t.affinity.get() & (1 << cpu) != 0;
            let pin_ok = t.pinned_cpu.get().map_or(true, |p| p == cpu);
            if affinity_ok && pin_ok {
                found = Some(tid);
            }
        });
        if found.is_some() {
            return found;
        }
        remaining &= !(1 << prio);
    }
    None
}

/// The scheduling decision itself (§4.2): demote the outgoing thread back to
/// `Ready` if it's still `Running` (a thread already moved to `Blocked`,
/// `Sleeping`, or `Death` by its caller is left alone — it's parked
/// elsewhere), pick the next eligible thread (falling back to this CPU's
/// idle thread), and install it as current.
pub(crate) fn do_reschedule_locked(sched: &Sched) {
    let cpu = crate::cpu::current_cpu();
    if let Some(old) = crate::cpu::current_thread() {
        if sched.try_tcb(old).map(|t| t.state.get()) == Some(ThreadState::Running) {
            enqueue_ready_locked(sched, old);
        }
    }
    let next = pick_next_locked(sched, cpu)
        .or_else(|| crate::cpu::with_cpu(cpu, |pc| pc.idle.get()))
        .unwrap_or_else(|| crate::kpanic::fatal("scheduler: no idle thread registered for this CPU"));
    if sched.tcb(next).state.get() == ThreadState::Ready {
        dequeue_ready_locked(sched, next);
    }
    sched.tcb(next).state.set(ThreadState::Running);
    crate::cpu::set_current_thread(Some(next), sched.tcb(next).priority.get());
    crate::cpu::with_cpu(cpu, |pc| pc.ctx_switches.set(pc.ctx_switches.get() + 1));
}

/// Public entry point for "give up the CPU and let the scheduler pick
/// again" (used by `thread::yield_now`, IRQ exit, and preempt-enable's
/// deferred-reschedule path).
pub fn reschedule() {
    with_sched(|s| do_reschedule_locked(s));
}

/// Inserts `tid` into `wq` in strict priority order, ties broken FIFO
/// (§4.3's wait-queue ordering rule), by scanning for the first entry with
/// strictly lower priority and inserting ahead of it.
pub(crate) fn insert_priority_ordered_locked(sched: &Sched, wq: &WaitQueue, tid: ThreadId) {
    let prio = sched.tcb(tid).priority.get();
    let mut before = None;
    wq.for_each(sched, |k| {
        if before.is_none() && sched.tcb(k).priority.get() < prio {
            before = Some(k);
        }
    });
    match before {
        Some(b) => wq.insert_before(sched, b, tid),
        None => wq.push_back(sched, tid),
    }
}

/// Parks the current thread on `wq` (§4.3/§4.4's blocking contract):
/// transitions it to `Blocked`, links it into `wq` in priority order, arms
/// its embedded timeout timer if `timeout_ms` isn't
/// `clock::WAITING_FOREVER`, and reschedules.
///
/// This core has no `context_switch` in its HAL (per the open question this
/// expansion settles in `DESIGN.md`), so there is no real stack to suspend
/// here: `block_locked` performs exactly the decision-logic bookkeeping a
/// real block would — the thread is correctly parked and invisible to the
/// scheduler's ready set the instant this returns — and the eventual
/// `wake_one_locked`/`wake_all_locked`/timeout-fire is what records the
/// outcome callers retrieve with `thread::Tcb::take_wake_result`. Tests
/// exercise this directly rather than through a real suspended caller.
pub(crate) fn block_locked(sched: &Sched, tid: ThreadId, wq: &WaitQueue, timeout_ms: u32) {
    let tcb = sched.tcb(tid);
    tcb.state.set(ThreadState::Blocked);
    tcb.wake_result.set(None);
    tcb.current_wq.set(Some(NonNull::from(wq)));
    insert_priority_ordered_locked(sched, wq, tid);
    if timeout_ms != crate::clock::WAITING_FOREVER {
        let timer_ptr: *const Timer = &tcb.timeout_timer;
        crate::timer::arm_locked(
            sched,
            unsafe { &*timer_ptr },
            timeout_ms,
            0,
            crate::thread::thread_timer_fired,
            tid.index() as *mut core::ffi::c_void,
        );
    }
    do_reschedule_locked(sched);
}

/// Unlinks the head of `wq` (already priority-ordered), cancels its timeout,
/// and makes it `Ready` again with an `Ok` wake result. Returns the woken
/// thread, if any, so the caller (e.g. a mutex handing itself off) can act
/// on it.
pub(crate) fn wake_one_locked(sched: &Sched, wq: &WaitQueue) -> Option<ThreadId> {
    let tid = wq.pop_front(sched)?;
    let tcb = sched.tcb(tid);
    tcb.current_wq.set(None);
    let timer_ptr: *const Timer = &tcb.timeout_timer;
    crate::timer::cancel_locked(sched, unsafe { &*timer_ptr });
    tcb.wake_result.set(Some(Ok(())));
    enqueue_ready_locked(sched, tid);
    maybe_preempt_locked(sched, tid);
    Some(tid)
}

/// Wakes every waiter on `wq`, in priority order. Returns the count woken.
pub(crate) fn wake_all_locked(sched: &Sched, wq: &WaitQueue) -> u32 {
    let mut n = 0u32;
    while wake_one_locked(sched, wq).is_some() {
        n += 1;
    }
    n
}

/// Requests a reschedule if `woken` now outranks whatever is `Running` on an
/// eligible CPU (§4.2's preemptive-FIFO rule and §4.6's preemption gate):
/// on this CPU, defer through the preempt gate if preemption is currently
/// disabled, otherwise reschedule inline; on other active, non-realtime
/// CPUs eligible for `woken`'s affinity/pin and presently running something
/// it outranks, nudge them with a reschedule IPI (§4.10). A CPU `woken`
/// can't run on, or that's already running something at least as important,
/// is left alone — it would just take the IPI and immediately decide not to
/// reschedule, costing an interrupt nobody needed.
pub(crate) fn maybe_preempt_locked(sched: &Sched, woken: ThreadId) {
    let woken_tcb = sched.tcb(woken);
    let woken_prio = woken_tcb.priority.get();
    let affinity = woken_tcb.affinity.get();
    let pinned = woken_tcb.pinned_cpu.get();
    let self_cpu = crate::cpu::current_cpu();

    if let Some(cur) = crate::cpu::current_thread() {
        if let Some(cur_tcb) = sched.try_tcb(cur) {
            if woken_prio > cur_tcb.priority.get() && eligible_for_cpu(affinity, pinned, self_cpu) {
                if !crate::cpu::this().preempt.set_pending_if_disabled() {
                    do_reschedule_locked(sched);
                }
            }
        }
    }

    let candidates = crate::mp::reschedule_targets(self_cpu, false);
    let mut targets = 0u32;
    for cpu in 0..CPUS_NR as CpuId {
        let bit = 1u32 << cpu;
        if candidates & bit == 0 || !eligible_for_cpu(affinity, pinned, cpu) {
            continue;
        }
        let outranks = crate::cpu::with_cpu(cpu, |pc| woken_prio > pc.current_priority.get());
        if outranks {
            targets |= bit;
        }
    }
    if targets != 0 {
        crate::mp::reschedule(targets);
    }
}

/// True if a thread with affinity mask `affinity`, pinned to `pinned` (if
/// any), may run on `cpu`.
fn eligible_for_cpu(affinity: AffinityMask, pinned: Option<CpuId>, cpu: CpuId) -> bool {
    let affinity_ok = affinity & (1 << cpu) != 0;
    let pin_ok = pinned.map_or(true, |p| p == cpu);
    affinity_ok && pin_ok
}

/// Parks the current thread on the sleep list with a wake-up timer armed
/// for `delay_ms` from now (§4.5/S3 sleep precision). Distinct from
/// `block_locked`: sleeping isn't waiting on any object, so there is no
/// wait queue and no possible `Interrupted` outcome, only eventual wake.
pub(crate) fn sleep_locked(sched: &Sched, tid: ThreadId, delay_ms: u32) {
    let tcb = sched.tcb(tid);
    tcb.state.set(ThreadState::Sleeping);
    tcb.wake_result.set(None);
    sched.sleep_list().push_back(sched, tid);
    let timer_ptr: *const Timer = &tcb.timeout_timer;
    crate::timer::arm_locked(
        sched,
        unsafe { &*timer_ptr },
        delay_ms,
        0,
        crate::thread::thread_timer_fired,
        tid.index() as *mut core::ffi::c_void,
    );
    do_reschedule_locked(sched);
}

/// Moves `tid` to the zombie list with the given return code. Called by
/// `thread::exit` once a thread has run its last instruction, or — in this
/// core's simulated-execution model — once its entry function returns.
pub(crate) fn destroy_locked(sched: &Sched, tid: ThreadId, retcode: i32) {
    let tcb = sched.tcb(tid);
    tcb.state.set(ThreadState::Death);
    tcb.retcode.set(retcode);
    sched.zombie_list().push_back(sched, tid);
    wake_all_locked(sched, &tcb.join_waiters);
}

/// Test-only: wipes the arena, run queues, sleep/zombie lists, and ready
/// bitmap so each test starts from an empty scheduler. Shared across this
/// module's tests and `thread`'s, since both drive the same `static SCHED`.
#[cfg(test)]
pub(crate) fn reset_for_tests() {
    with_sched(|s| {
        for slot in s.threads.iter_mut() {
            *slot = None;
        }
        s.next_free.set(0);
        s.ready_bitmap.set(0);
        for rq in s.run_queues.iter() {
            while rq.pop_front(s).is_some() {}
        }
        while s.sleep_list.pop_front(s).is_some() {}
        while s.zombie_list.pop_front(s).is_some() {}
        while s.timers.pop_front(s).is_some() {}
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread;
    use blue_arch::Arch;

    fn reset_all() {
        Arch::reset();
        reset_for_tests();
    }

    #[test]
    fn highest_priority_ready_thread_is_picked_first() {
        reset_all();
        let low = thread::create("low", 5, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        let high = thread::create("high", 20, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        with_sched(|s| {
            enqueue_ready_locked(s, low);
            enqueue_ready_locked(s, high);
            assert_eq!(pick_next_locked(s, 0), Some(high));
        });
    }

    #[test]
    fn same_priority_is_fifo() {
        reset_all();
        let a = thread::create("a", 10, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        let b = thread::create("b", 10, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        with_sched(|s| {
            enqueue_ready_locked(s, a);
            enqueue_ready_locked(s, b);
            assert_eq!(pick_next_locked(s, 0), Some(a));
            dequeue_ready_locked(s, a);
            assert_eq!(pick_next_locked(s, 0), Some(b));
        });
    }

    #[test]
    fn wake_one_respects_priority_order_not_insertion_order() {
        reset_all();
        let low = thread::create("low", 3, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        let high = thread::create("high", 9, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        let wq: WaitQueue = IndexList::new();
        with_sched(|s| {
            block_locked(s, low, &wq, crate::clock::WAITING_FOREVER);
            block_locked(s, high, &wq, crate::clock::WAITING_FOREVER);
            assert_eq!(wake_one_locked(s, &wq), Some(high));
            assert_eq!(wake_one_locked(s, &wq), Some(low));
        });
    }
}
