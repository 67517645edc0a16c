//! Host-testable `Hal` implementation.
//!
//! `Arch` plays the same role here that `arm_cortex_m`/`aarch64_cortex_a`
//! play on real silicon, just for the "architecture" called host test: no
//! real interrupts, no real context switch, a clock the test drives by
//! hand instead of one fed by a hardware tick. The kernel core's test
//! suite links against this module and exercises its decision logic
//! directly, the same way the reference codebase's own synchronization
//! unit tests call primitives directly rather than driving real threads.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::hal::{Hal, IpiKind, IrqState};

const MAX_SIM_CPUS: usize = 8;

static NOW_MS: AtomicU32 = AtomicU32::new(0);
static NOW_US: AtomicU64 = AtomicU64::new(0);
static INTS_DISABLED: AtomicBool = AtomicBool::new(false);
static ONESHOT_ARMED: AtomicBool = AtomicBool::new(false);
static ONESHOT_DEADLINE: AtomicU32 = AtomicU32::new(0);
static LAST_IPI_MASK: AtomicU32 = AtomicU32::new(0);
static LAST_IPI_RESCHEDULE: AtomicBool = AtomicBool::new(false);
static CURR_THREAD: [AtomicU32; MAX_SIM_CPUS] = {
    const INIT: AtomicU32 = AtomicU32::new(u32::MAX);
    [INIT; MAX_SIM_CPUS]
};
static WAIT_GENERATION: AtomicUsize = AtomicUsize::new(0);

/// The sole `Hal` implementor for this workspace's test/host target.
pub struct Arch;

impl Hal for Arch {
    fn now_ms() -> u32 {
        NOW_MS.load(Ordering::Acquire)
    }

    fn now_us() -> u64 {
        NOW_US.load(Ordering::Acquire)
    }

    fn arm_oneshot(deadline_ms: u32) -> bool {
        if deadline_ms < Self::now_ms() {
            return false;
        }
        ONESHOT_DEADLINE.store(deadline_ms, Ordering::Release);
        ONESHOT_ARMED.store(true, Ordering::Release);
        true
    }

    fn disable_oneshot() {
        ONESHOT_ARMED.store(false, Ordering::Release);
    }

    fn disable_ints() -> IrqState {
        let prev = INTS_DISABLED.swap(true, Ordering::AcqRel);
        prev as IrqState
    }

    fn restore_ints(state: IrqState) {
        INTS_DISABLED.store(state != 0, Ordering::Release);
    }

    fn ints_disabled() -> bool {
        INTS_DISABLED.load(Ordering::Acquire)
    }

    fn curr_cpu() -> u32 {
        0
    }

    fn num_cores() -> u32 {
        1
    }

    fn curr_thread() -> u32 {
        CURR_THREAD[Self::curr_cpu() as usize].load(Ordering::Acquire)
    }

    fn set_curr_thread(value: u32) {
        CURR_THREAD[Self::curr_cpu() as usize].store(value, Ordering::Release);
    }

    fn send_ipi(target_mask: u32, kind: IpiKind) -> bool {
        LAST_IPI_MASK.store(target_mask, Ordering::Release);
        LAST_IPI_RESCHEDULE.store(kind == IpiKind::Reschedule, Ordering::Release);
        true
    }

    fn mp_init_percpu() {}

    fn wait_for_event() {
        WAIT_GENERATION.fetch_add(1, Ordering::AcqRel);
        core::hint::spin_loop();
    }

    fn signal_event() {
        WAIT_GENERATION.fetch_add(1, Ordering::AcqRel);
    }

    fn backtrace() {}

    fn sys_reset() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}

impl Arch {
    /// Test-only: advances the simulated clock by `ms` milliseconds and
    /// reports whether the armed one-shot deadline was reached or passed.
    pub fn advance_ms(ms: u32) -> bool {
        let now = NOW_MS.fetch_add(ms, Ordering::AcqRel) + ms;
        NOW_US.fetch_add(ms as u64 * 1000, Ordering::AcqRel);
        ONESHOT_ARMED.load(Ordering::Acquire) && now >= ONESHOT_DEADLINE.load(Ordering::Acquire)
    }

    /// Test-only: resets every piece of simulated hardware state. Needed
    /// between tests since these are process-wide statics.
    pub fn reset() {
        NOW_MS.store(0, Ordering::Release);
        NOW_US.store(0, Ordering::Release);
        INTS_DISABLED.store(false, Ordering::Release);
        ONESHOT_ARMED.store(false, Ordering::Release);
        ONESHOT_DEADLINE.store(0, Ordering::Release);
        LAST_IPI_MASK.store(0, Ordering::Release);
        LAST_IPI_RESCHEDULE.store(false, Ordering::Release);
        for slot in CURR_THREAD.iter() {
            slot.store(u32::MAX, Ordering::Release);
        }
    }

    pub fn oneshot_armed() -> bool {
        ONESHOT_ARMED.load(Ordering::Acquire)
    }

    pub fn oneshot_deadline() -> u32 {
        ONESHOT_DEADLINE.load(Ordering::Acquire)
    }

    pub fn last_ipi() -> (u32, bool) {
        (
            LAST_IPI_MASK.load(Ordering::Acquire),
            LAST_IPI_RESCHEDULE.load(Ordering::Acquire),
        )
    }
}
