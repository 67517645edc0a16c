//! Thread object and lifecycle (§4.1): the arena element (`Tcb`) the
//! scheduler indexes by [`ThreadId`], and the public create/resume/suspend/
//! sleep/yield/exit/detach/join/set_priority/set_affinity/pin API built on
//! top of it.
//!
//! Every `Tcb` field the scheduler touches directly (`link`, `priority`,
//! `state`, ...) is `Cell`-wrapped for the same reason `Timer`'s are:
//! mutation only ever happens with the scheduler lock held, so a shared
//! `&Tcb` borrow is enough and no field needs its own lock.

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use core::cell::{Cell, RefCell};
use core::ffi::c_void;
use core::ptr::NonNull;

use blue_infra::list::index_list::Link;
use blue_kconfig::{DEFAULT_STACK_SIZE, IDLE_THREAD_PRIORITY, THREAD_PRIORITY_MAX};

use crate::error::{Error, Result};
use crate::scheduler::{self, WaitQueue};
use crate::stack::Stack;
use crate::timer::Timer;
use crate::types::{AffinityMask, CpuId, Priority, ThreadId, AFFINITY_ALL};

/// A thread's entry point, called with the argument passed to `create`.
/// Stored on the `Tcb` for diagnostics; this core has no real
/// `context_switch` (see `scheduler::block_locked`'s doc comment), so
/// nothing in this crate ever calls it — an embedder's arch trampoline
/// does, after the HAL's `context_switch` returns into it.
pub type ThreadEntry = extern "C" fn(*mut c_void);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but never resumed, or resumed-then-suspended. Not on any
    /// queue.
    Suspended,
    /// On a run queue, waiting for a CPU.
    Ready,
    /// The thread a CPU's `curr_thread` slot names.
    Running,
    /// Linked into a wait queue (mutex/semaphore/event/join), timeout timer
    /// armed unless the block was `WAITING_FOREVER`.
    Blocked,
    /// Linked into the sleep list, wake timer armed.
    Sleeping,
    /// Exited; linked into the zombie list until reaped.
    Death,
}

/// The fixed-size arena element a [`ThreadId`] names. Lives behind
/// `Box<Tcb>` inside `scheduler::Sched`'s arena so its address — and hence
/// `&tcb.timeout_timer`'s `NonNull<Timer>` key — is stable for the thread's
/// whole lifetime.
pub struct Tcb {
    pub(crate) link: Link<ThreadId>,
    name: String,
    entry: ThreadEntry,
    arg: *mut c_void,
    pub(crate) priority: Cell<Priority>,
    pub(crate) state: Cell<ThreadState>,
    pub(crate) affinity: Cell<AffinityMask>,
    pub(crate) pinned_cpu: Cell<Option<CpuId>>,
    /// Set by whoever wakes this thread (`wake_one_locked`, a timeout, or
    /// `destroy_locked` via `join_waiters`); read once after the blocking
    /// call's reschedule returns.
    pub(crate) wake_result: Cell<Option<Result<()>>>,
    /// The wait queue this thread is presently linked into, if any — lets a
    /// firing timeout unlink it without the caller having to remember which
    /// queue it blocked on.
    pub(crate) current_wq: Cell<Option<NonNull<WaitQueue>>>,
    pub(crate) timeout_timer: Timer,
    /// Threads parked in `join(self)`, woken by `destroy_locked`.
    pub(crate) join_waiters: WaitQueue,
    pub(crate) retcode: Cell<i32>,
    detached: Cell<bool>,
    /// Taken and dropped by the reaper once this thread is zombied; left in
    /// place (`None`) afterward so a still-pending joiner can still read
    /// `retcode` off the rest of the `Tcb`.
    stack: RefCell<Option<Stack>>,
}

// Every mutable field is `Cell`/`RefCell`, guarded in practice by the one
// scheduler spinlock; `entry`/`arg` are write-once at construction. Sound
// under that single-lock discipline the same way `Timer`'s `unsafe impl
// Sync` is.
unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}

impl Tcb {
    fn new(name: &str, priority: Priority, entry: ThreadEntry, arg: *mut c_void, stack: Stack) -> Self {
        Tcb {
            link: Link::new(),
            name: String::from(name),
            entry,
            arg,
            priority: Cell::new(priority),
            state: Cell::new(ThreadState::Suspended),
            affinity: Cell::new(AFFINITY_ALL),
            pinned_cpu: Cell::new(None),
            wake_result: Cell::new(None),
            current_wq: Cell::new(None),
            timeout_timer: Timer::new(),
            join_waiters: WaitQueue::new(),
            retcode: Cell::new(0),
            detached: Cell::new(false),
            stack: RefCell::new(Some(stack)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> (ThreadEntry, *mut c_void) {
        (self.entry, self.arg)
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.get()
    }
}

fn valid_priority(p: Priority) -> bool {
    p != 0 && (p as u32) <= THREAD_PRIORITY_MAX
}

fn spawn(tcb: Box<Tcb>) -> Result<ThreadId> {
    scheduler::with_sched(|s| s.alloc_tcb(tcb)).ok_or_else(|| Error::no_memory("thread arena exhausted"))
}

/// Allocates a descriptor around a caller-built stack and places the thread
/// in the arena as `Suspended`. Does not run `entry`; see `resume`.
fn create_with_stack(
    name: &str,
    priority: Priority,
    entry: ThreadEntry,
    arg: *mut c_void,
    stack: Stack,
) -> Result<ThreadId> {
    spawn(Box::new(Tcb::new(name, priority, entry, arg, stack)))
}

/// Creates a thread at `priority` (must be in `1..=THREAD_PRIORITY_MAX`;
/// priority 0 is reserved for idle threads, created via `create_idle`).
/// `stack_size` defaults to `blue_kconfig::DEFAULT_STACK_SIZE` if `None`.
pub fn create(
    name: &str,
    priority: Priority,
    entry: ThreadEntry,
    arg: *mut c_void,
    stack_size: Option<usize>,
) -> Result<ThreadId> {
    if !valid_priority(priority) {
        return Err(Error::invalid_args("thread priority must be in 1..=THREAD_PRIORITY_MAX"));
    }
    let stack = Stack::allocate(stack_size.unwrap_or(DEFAULT_STACK_SIZE))
        .ok_or_else(|| Error::no_memory("stack allocation failed"))?;
    create_with_stack(name, priority, entry, arg, stack)
}

/// Creates the per-CPU idle thread at priority 0. Not reachable through
/// `create`'s public priority check; only `idle::init` calls this.
pub(crate) fn create_idle(name: &str, entry: ThreadEntry, stack_size: usize) -> Result<ThreadId> {
    let stack = Stack::allocate(stack_size).ok_or_else(|| Error::no_memory("idle stack allocation failed"))?;
    create_with_stack(name, IDLE_THREAD_PRIORITY, entry, core::ptr::null_mut(), stack)
}

/// Moves `tid` from `Suspended` to `Ready` and onto its run queue.
/// Idempotent on an already-`Ready` (or `Running`) thread.
pub fn resume(tid: ThreadId) -> Result<()> {
    scheduler::with_sched(|s| {
        let tcb = s.try_tcb(tid).ok_or_else(|| Error::invalid_args("resume: unknown thread"))?;
        if tcb.state.get() == ThreadState::Suspended {
            scheduler::enqueue_ready_locked(s, tid);
            scheduler::maybe_preempt_locked(s, tid);
        }
        Ok(())
    })
}

/// Only defined for `Ready` threads; they leave the run queue and become
/// `Suspended`. Suspending a `Running`, `Blocked`, or `Sleeping` thread is
/// not supported by the core (§9 open question, resolved).
pub fn suspend(tid: ThreadId) -> Result<()> {
    scheduler::with_sched(|s| {
        let tcb = s.try_tcb(tid).ok_or_else(|| Error::invalid_args("suspend: unknown thread"))?;
        if tcb.state.get() != ThreadState::Ready {
            return Err(Error::not_ready("suspend is only defined for Ready threads"));
        }
        scheduler::dequeue_ready_locked(s, tid);
        tcb.state.set(ThreadState::Suspended);
        Ok(())
    })
}

/// Parks the calling thread on the sleep list for `delay_ms`.
pub fn sleep(delay_ms: u32) {
    let tid = current();
    scheduler::with_sched(|s| scheduler::sleep_locked(s, tid, delay_ms));
}

/// Demotes the calling thread to `Ready` at its current priority (enqueued
/// at the tail of its run queue) and reschedules.
pub fn yield_now() {
    scheduler::reschedule();
}

/// Stores `retcode`, wakes any joiners, and reschedules. Never returns: on
/// a real embedder the outgoing thread's stack is simply never resumed
/// again; this simulation core has no stack to abandon, so it parks the
/// calling CPU instead.
pub fn exit(retcode: i32) -> ! {
    let tid = current();
    scheduler::with_sched(|s| scheduler::destroy_locked(s, tid, retcode));
    scheduler::reschedule();
    loop {
        blue_arch::Arch::wait_for_event();
    }
}

/// Marks `tid` as self-freeing: once it reaches `Death`, the reaper frees
/// its descriptor immediately instead of waiting for a `join`.
pub fn detach(tid: ThreadId) -> Result<()> {
    scheduler::with_sched(|s| {
        let tcb = s.try_tcb(tid).ok_or_else(|| Error::invalid_args("detach: unknown thread"))?;
        tcb.detached.set(true);
        Ok(())
    })
}

/// Blocks until `tid` reaches `Death`, then returns its retcode and reaps
/// the descriptor. Joining an already-detached thread is an error, not a
/// block.
pub fn join(tid: ThreadId, timeout_ms: u32) -> Result<i32> {
    let waiter = current();
    let already_dead = scheduler::with_sched(|s| -> Result<bool> {
        let tcb = s.try_tcb(tid).ok_or_else(|| Error::invalid_args("join: unknown thread"))?;
        if tcb.detached.get() {
            return Err(Error::already_bound("join: thread is detached"));
        }
        match tcb.state.get() {
            ThreadState::Death => Ok(true),
            _ => {
                scheduler::block_locked(s, waiter, &tcb.join_waiters, timeout_ms);
                Ok(false)
            }
        }
    })?;

    if !already_dead {
        match scheduler::with_sched(|s| s.tcb(waiter).wake_result.take()) {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(e),
            None => return Err(Error::not_ready("join: woke with no recorded result")),
        }
    }

    let retcode = scheduler::with_sched(|s| s.tcb(tid).retcode.get());
    reap(tid);
    Ok(retcode)
}

/// Drops a zombied thread's stack and frees its arena slot. Called both by
/// `join` (on a thread it just waited for, after its retcode has been read)
/// and by the idle thread's reaper pass (`zombie::reclaim`) for detached
/// threads nobody joins — each zombie is reaped by exactly one of the two
/// paths, never both.
pub(crate) fn reap(tid: ThreadId) {
    scheduler::with_sched(|s| {
        s.zombie_list().remove(s, tid);
        if let Some(t) = s.try_tcb(tid) {
            t.stack.borrow_mut().take();
        }
        s.free_tcb(tid);
    });
}

/// Changes `tid`'s priority. Re-enqueues it if `Ready`; if `Running`,
/// checks whether a now-higher-priority Ready thread should preempt it.
pub fn set_priority(tid: ThreadId, new_priority: Priority) -> Result<()> {
    if !valid_priority(new_priority) {
        return Err(Error::invalid_args("thread priority must be in 1..=THREAD_PRIORITY_MAX"));
    }
    scheduler::with_sched(|s| {
        let tcb = s.try_tcb(tid).ok_or_else(|| Error::invalid_args("set_priority: unknown thread"))?;
        match tcb.state.get() {
            ThreadState::Ready => {
                scheduler::dequeue_ready_locked(s, tid);
                tcb.priority.set(new_priority);
                scheduler::enqueue_ready_locked(s, tid);
                scheduler::maybe_preempt_locked(s, tid);
            }
            ThreadState::Running => {
                tcb.priority.set(new_priority);
                let cpu = crate::cpu::current_cpu();
                crate::cpu::with_cpu(cpu, |pc| pc.current_priority.set(new_priority));
                if let Some(next) = scheduler::pick_next_locked(s, cpu) {
                    if s.tcb(next).priority.get() > new_priority && !crate::cpu::this().preempt.set_pending_if_disabled() {
                        scheduler::do_reschedule_locked(s);
                    }
                }
            }
            _ => tcb.priority.set(new_priority),
        }
        Ok(())
    })
}

pub fn set_affinity(tid: ThreadId, mask: AffinityMask) -> Result<()> {
    scheduler::with_sched(|s| {
        let tcb = s.try_tcb(tid).ok_or_else(|| Error::invalid_args("set_affinity: unknown thread"))?;
        tcb.affinity.set(mask);
        Ok(())
    })
}

/// Restricts `tid` to `cpu` alone. `pinned_cpu` takes priority over the
/// affinity mask in `pick_next_locked`, which is left untouched.
pub fn pin(tid: ThreadId, cpu: CpuId) -> Result<()> {
    scheduler::with_sched(|s| {
        let tcb = s.try_tcb(tid).ok_or_else(|| Error::invalid_args("pin: unknown thread"))?;
        tcb.pinned_cpu.set(Some(cpu));
        Ok(())
    })
}

/// The calling CPU's current thread. Fatal if none is set — every CPU has
/// one from the moment its bootstrap/idle thread is installed (§4.9).
pub fn current() -> ThreadId {
    crate::cpu::current_thread().unwrap_or_else(|| crate::kpanic::fatal("thread::current: no current thread set for this CPU"))
}

pub fn name(tid: ThreadId) -> Option<String> {
    scheduler::with_sched(|s| s.try_tcb(tid).map(|t| String::from(t.name())))
}

pub fn priority(tid: ThreadId) -> Option<Priority> {
    scheduler::with_sched(|s| s.try_tcb(tid).map(|t| t.priority.get()))
}

pub fn state(tid: ThreadId) -> Option<ThreadState> {
    scheduler::with_sched(|s| s.try_tcb(tid).map(|t| t.state.get()))
}

/// A thread entry that does nothing; used by tests that need a valid
/// `ThreadEntry` value but never invoke it (this core never does either,
/// per `ThreadEntry`'s doc comment).
pub extern "C" fn noop_entry(_arg: *mut c_void) {}

/// The timeout callback armed by `block_locked`/`sleep_locked`. `arg` is
/// the blocked/sleeping thread's `ThreadId` index, smuggled through the
/// timer's `*mut c_void` the same way every other `Timer` user does.
pub(crate) extern "C" fn thread_timer_fired(_timer: *mut Timer, arg: *mut c_void) {
    let tid = ThreadId::from_index(arg as usize);
    scheduler::with_sched(|s| {
        let Some(tcb) = s.try_tcb(tid) else { return };
        match tcb.state.get() {
            ThreadState::Blocked => {
                if let Some(wq) = tcb.current_wq.take() {
                    unsafe { wq.as_ref() }.remove(s, tid);
                }
                tcb.wake_result.set(Some(Err(Error::timed_out("wait timed out"))));
                scheduler::enqueue_ready_locked(s, tid);
                scheduler::maybe_preempt_locked(s, tid);
            }
            ThreadState::Sleeping => {
                s.sleep_list().remove(s, tid);
                tcb.wake_result.set(Some(Ok(())));
                scheduler::enqueue_ready_locked(s, tid);
                scheduler::maybe_preempt_locked(s, tid);
            }
            _ => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::WAITING_FOREVER;
    use crate::error::ErrorKind;
    use blue_arch::Arch;
    use blue_infra::list::index_list::IndexList;

    fn reset_all() {
        Arch::reset();
        scheduler::reset_for_tests();
    }

    #[test]
    fn create_starts_suspended_and_resume_makes_it_ready() {
        reset_all();
        let t = create("t", 5, noop_entry, core::ptr::null_mut(), None).unwrap();
        assert_eq!(state(t), Some(ThreadState::Suspended));
        resume(t).unwrap();
        assert_eq!(state(t), Some(ThreadState::Ready));
    }

    #[test]
    fn suspend_only_applies_to_ready_threads() {
        reset_all();
        let t = create("t", 5, noop_entry, core::ptr::null_mut(), None).unwrap();
        assert_eq!(suspend(t).unwrap_err().kind, ErrorKind::NotReady);
        resume(t).unwrap();
        suspend(t).unwrap();
        assert_eq!(state(t), Some(ThreadState::Suspended));
    }

    #[test]
    fn zero_priority_is_rejected() {
        reset_all();
        assert!(create("t", 0, noop_entry, core::ptr::null_mut(), None).is_err());
    }

    #[test]
    fn detach_then_join_is_rejected() {
        reset_all();
        let t = create("t", 5, noop_entry, core::ptr::null_mut(), None).unwrap();
        detach(t).unwrap();
        scheduler::with_sched(|s| scheduler::destroy_locked(s, t, 7));
        assert!(join(t, WAITING_FOREVER).is_err());
    }

    #[test]
    fn join_on_already_dead_thread_returns_retcode_and_reaps() {
        reset_all();
        let caller = create("caller", 10, noop_entry, core::ptr::null_mut(), None).unwrap();
        crate::cpu::set_current_thread(Some(caller), 10);
        let target = create("target", 5, noop_entry, core::ptr::null_mut(), None).unwrap();
        scheduler::with_sched(|s| scheduler::destroy_locked(s, target, 42));
        assert_eq!(join(target, WAITING_FOREVER).unwrap(), 42);
    }

    #[test]
    fn timeout_wakes_a_blocked_thread_with_timed_out() {
        reset_all();
        let t = create("t", 5, noop_entry, core::ptr::null_mut(), None).unwrap();
        let wq: WaitQueue = IndexList::new();
        scheduler::with_sched(|s| scheduler::block_locked(s, t, &wq, 10));
        Arch::advance_ms(10);
        crate::timer::expire_due();
        assert_eq!(state(t), Some(ThreadState::Ready));
        let result = scheduler::with_sched(|s| s.tcb(t).wake_result.take());
        assert_eq!(result, Some(Err(Error::timed_out("wait timed out"))));
    }
}
