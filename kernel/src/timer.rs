//! Software timer wheel (§4.5): a single deadline-ordered list with one
//! hardware one-shot always armed for the head. `Timer` is caller-owned (a
//! thread's sleep/block timeout, or a free-standing static); its link into
//! the global list is a `NonNull<Timer>` key, the pointer-keyed case
//! `blue_infra::list::index_list` calls out as the alternative to an arena
//! index when the element's address is already stable for its own lifetime.

use core::cell::Cell;
use core::ffi::c_void;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use blue_arch::{Arch, Hal};
use blue_infra::list::index_list::Link;

use crate::clock;
use crate::scheduler::{self, Sched};

pub type TimerCallback = extern "C" fn(*mut Timer, *mut c_void);

const TIMER_MAGIC: u32 = 0x7469_6d72; // "timr"
const TIMER_MAGIC_FREED: u32 = 0;

/// A software timer. Fields are `Cell`-wrapped because every mutation
/// happens while the caller holds the scheduler lock (directly, or via the
/// public `set_oneshot`/`set_periodic`/`cancel` wrappers that take it).
pub struct Timer {
    pub(crate) link: Link<NonNull<Timer>>,
    magic: Cell<u32>,
    deadline: Cell<u32>,
    period: Cell<u32>,
    callback: Cell<Option<TimerCallback>>,
    arg: Cell<*mut c_void>,
    firing: AtomicBool,
}

unsafe impl Sync for Timer {}

impl Timer {
    pub const fn new() -> Self {
        Timer {
            link: Link::new(),
            magic: Cell::new(TIMER_MAGIC),
            deadline: Cell::new(0),
            period: Cell::new(0),
            callback: Cell::new(None),
            arg: Cell::new(core::ptr::null_mut()),
            firing: AtomicBool::new(false),
        }
    }

    fn check_magic(&self) {
        if self.magic.get() != TIMER_MAGIC {
            crate::kpanic::fatal("timer: use of a corrupted or already-freed Timer");
        }
    }

    /// Arms a one-shot timer at `now_ms() + delay_ms`.
    pub fn set_oneshot(&self, delay_ms: u32, callback: TimerCallback, arg: *mut c_void) {
        self.check_magic();
        scheduler::with_sched(|s| arm_locked(s, self, delay_ms, 0, callback, arg));
    }

    /// Arms a periodic timer that re-arms itself every `period_ms` as it fires.
    pub fn set_periodic(&self, period_ms: u32, callback: TimerCallback, arg: *mut c_void) {
        self.check_magic();
        scheduler::with_sched(|s| arm_locked(s, self, period_ms, period_ms, callback, arg));
    }

    /// Unlinks the timer if armed. If its callback is presently firing on
    /// another CPU, spins until that completes before returning, so the
    /// caller can safely free `self` on return.
    pub fn cancel(&self) {
        self.check_magic();
        scheduler::with_sched(|s| cancel_locked(s, self));
        while self.firing.load(Ordering::Acquire) {
            Arch::wait_for_event();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.link.is_linked()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if self.link.is_linked() {
            scheduler::with_sched(|s| cancel_locked(s, self));
        }
        self.magic.set(TIMER_MAGIC_FREED);
    }
}

fn key_of(timer: &Timer) -> NonNull<Timer> {
    NonNull::from(timer)
}

/// Caller already holds the scheduler lock. Inserts `timer` in deadline
/// order and re-arms the hardware one-shot if it became the new head.
///
/// Takes `&Sched` rather than `&mut Sched`: every field this touches (the
/// timer list, and `Timer` itself) is `Cell`-based, so a shared borrow of
/// the scheduler state suffices. This matters to callers that also need a
/// `&Tcb`'s embedded timer alongside a live borrow of the rest of `Sched` —
/// with `&mut Sched` those two borrows would conflict.
pub(crate) fn arm_locked(
    sched: &Sched,
    timer: &Timer,
    delay_ms: u32,
    period: u32,
    callback: TimerCallback,
    arg: *mut c_void,
) {
    let key = key_of(timer);
    if timer.link.is_linked() {
        sched.timers().remove(sched, key);
    }
    timer.deadline.set(clock::deadline_after(delay_ms));
    timer.period.set(period);
    timer.callback.set(Some(callback));
    timer.arg.set(arg);
    insert_sorted_locked(sched, key);
    rearm_hw_locked(sched);
}

pub(crate) fn cancel_locked(sched: &Sched, timer: &Timer) {
    let key = key_of(timer);
    if timer.link.is_linked() {
        sched.timers().remove(sched, key);
        rearm_hw_locked(sched);
    }
}

fn insert_sorted_locked(sched: &Sched, key: NonNull<Timer>) {
    let deadline = unsafe { key.as_ref().deadline.get() };
    let mut before = None;
    sched.timers().for_each(sched, |k| {
        if before.is_none() && unsafe { k.as_ref().deadline.get() } > deadline {
            before = Some(k);
        }
    });
    match before {
        Some(b) => sched.timers().insert_before(sched, b, key),
        None => sched.timers().push_back(sched, key),
    }
}

fn rearm_hw_locked(sched: &Sched) {
    match sched.timers().front() {
        Some(key) => {
            Arch::arm_oneshot(unsafe { key.as_ref().deadline.get() });
        }
        None => Arch::disable_oneshot(),
    }
}

/// Drains every timer whose deadline has passed. Called from the hardware
/// one-shot's IRQ handler in a real build; tests call it directly after
/// advancing the simulated clock (`blue_arch::Arch::advance_ms`).
///
/// Each callback is invoked with the scheduler lock *not* held: the lock is
/// released after popping (and re-inserting, if periodic) a due timer, the
/// callback runs, then the next due timer is considered. This keeps
/// kernel-owned callbacks (sleep/timeout wakeups) free to reacquire the same
/// lock through the ordinary `scheduler::with_sched` path instead of needing
/// a re-entrant lock or a special already-locked callback signature — the
/// tradeoff recorded in `DESIGN.md` against holding the lock continuously
/// across firing the way real SMP hardware would need to.
pub fn expire_due() {
    let now = clock::now_ms();
    loop {
        let due = scheduler::with_sched(|s| match s.timers().front() {
            Some(key) if unsafe { key.as_ref().deadline.get() } <= now => Some(key),
            _ => None,
        });
        let Some(key) = due else { break };
        let timer = unsafe { key.as_ref() };
        scheduler::with_sched(|s| {
            s.timers().remove(s, key);
            let period = timer.period.get();
            if period > 0 {
                timer.deadline.set(timer.deadline.get().wrapping_add(period));
                insert_sorted_locked(s, key);
            }
            rearm_hw_locked(s);
        });
        timer.firing.store(true, Ordering::Release);
        if let Some(cb) = timer.callback.get() {
            cb(key.as_ptr(), timer.arg.get());
        }
        timer.firing.store(false, Ordering::Release);
        Arch::signal_event();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;

    static FIRE_COUNT: AtomicU32 = AtomicU32::new(0);
    static LAST_ARG: AtomicU32 = AtomicU32::new(0);

    extern "C" fn record_fire(_timer: *mut Timer, arg: *mut c_void) {
        FIRE_COUNT.fetch_add(1, Ordering::SeqCst);
        LAST_ARG.store(arg as usize as u32, Ordering::SeqCst);
    }

    fn reset_all() {
        Arch::reset();
        FIRE_COUNT.store(0, Ordering::SeqCst);
        LAST_ARG.store(0, Ordering::SeqCst);
    }

    #[test]
    fn earlier_deadline_fires_first_regardless_of_insertion_order() {
        reset_all();
        let t1 = Timer::new();
        let t2 = Timer::new();
        t2.set_oneshot(50, record_fire, 2 as *mut c_void);
        t1.set_oneshot(10, record_fire, 1 as *mut c_void);

        Arch::advance_ms(10);
        expire_due();
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 1);
        assert_eq!(LAST_ARG.load(Ordering::SeqCst), 1);

        Arch::advance_ms(40);
        expire_due();
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 2);
        assert_eq!(LAST_ARG.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_unlinks_and_stops_future_firing() {
        reset_all();
        let t = Timer::new();
        t.set_oneshot(10, record_fire, core::ptr::null_mut());
        t.cancel();
        assert!(!t.is_armed());
        Arch::advance_ms(100);
        expire_due();
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn periodic_timer_rearms_before_firing() {
        reset_all();
        let t = Timer::new();
        t.set_periodic(10, record_fire, core::ptr::null_mut());
        for expected in 1..=3u32 {
            Arch::advance_ms(10);
            expire_due();
            assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), expected);
        }
        assert!(t.is_armed());
        t.cancel();
    }

    #[test]
    fn hardware_oneshot_tracks_the_earliest_deadline() {
        reset_all();
        let t1 = Timer::new();
        let t2 = Timer::new();
        t1.set_oneshot(30, record_fire, core::ptr::null_mut());
        assert_eq!(Arch::oneshot_deadline(), 30);
        t2.set_oneshot(5, record_fire, core::ptr::null_mut());
        assert_eq!(Arch::oneshot_deadline(), 5);
        t2.cancel();
        assert_eq!(Arch::oneshot_deadline(), 30);
        t1.cancel();
        assert!(!Arch::oneshot_armed());
    }
}
