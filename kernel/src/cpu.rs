//! Per-CPU state (§3 "PerCPU state"): the idle thread, tick counter,
//! interrupt nesting depth, and preemption gate each CPU owns. The
//! current-thread pointer itself is not duplicated here — it lives behind
//! the HAL (`blue_arch::Hal::curr_thread`/`set_curr_thread`) per §6, and
//! this module is the sole place that translates the HAL's raw `u32` slot
//! to and from a typed `ThreadId`.

use core::cell::Cell;

use blue_arch::{Arch, Hal};
use blue_kconfig::CPUS_NR;

use crate::irq::PreemptGate;
use crate::types::{CpuId, Priority, ThreadId};

pub struct PerCpu {
    pub idle: Cell<Option<ThreadId>>,
    pub tick: Cell<u32>,
    pub interrupt_nest: Cell<u32>,
    pub preempt: PreemptGate,
    pub active: Cell<bool>,
    pub ctx_switches: Cell<u64>,
    pub reschedule_ipis: Cell<u64>,
    pub time_scheduled_ms: Cell<u64>,
    /// Priority of whatever thread is presently `current` on this CPU.
    /// Kept in sync by `set_current_thread` (every writer of the HAL
    /// current-thread slot goes through it) so `maybe_preempt_locked` can
    /// judge whether a wakeup outranks a *remote* CPU's running thread
    /// without needing a cross-CPU HAL query.
    pub current_priority: Cell<Priority>,
}

impl PerCpu {
    pub const fn new() -> Self {
        PerCpu {
            idle: Cell::new(None),
            tick: Cell::new(0),
            interrupt_nest: Cell::new(0),
            preempt: PreemptGate::new(),
            active: Cell::new(false),
            ctx_switches: Cell::new(0),
            reschedule_ipis: Cell::new(0),
            time_scheduled_ms: Cell::new(0),
            current_priority: Cell::new(0),
        }
    }

    pub fn is_in_irq(&self) -> bool {
        self.interrupt_nest.get() > 0
    }
}

// Each slot is mutated only by code running on the CPU it belongs to (the
// real-hardware invariant this core assumes throughout, per §5's per-CPU
// statistics rule); the host test target runs single-threaded so that
// invariant holds trivially there too.
unsafe impl Sync for PerCpu {}

static CPUS: [PerCpu; CPUS_NR] = [const { PerCpu::new() }; CPUS_NR];

/// Index of the CPU executing this call.
pub fn current_cpu() -> CpuId {
    Arch::curr_cpu()
}

/// Borrows the `PerCpu` slot for `cpu`. Panics on an out-of-range index —
/// every caller derives `cpu` from `current_cpu()` or a validated mask, so
/// an out-of-range index is a core bug, not a reportable condition.
pub fn with_cpu<R>(cpu: CpuId, f: impl FnOnce(&PerCpu) -> R) -> R {
    f(&CPUS[cpu as usize])
}

pub fn this() -> &'static PerCpu {
    &CPUS[current_cpu() as usize]
}

/// Reads the HAL's per-CPU current-thread slot as a `ThreadId`.
pub fn current_thread() -> Option<ThreadId> {
    let raw = Arch::curr_thread();
    if raw == u32::MAX {
        None
    } else {
        Some(ThreadId::from_index(raw as usize))
    }
}

/// Writes the HAL's per-CPU current-thread slot and caches `priority`
/// (the new current thread's priority, or the idle priority when `tid` is
/// `None`) in this CPU's [`PerCpu::current_priority`].
pub fn set_current_thread(tid: Option<ThreadId>, priority: Priority) {
    Arch::set_curr_thread(tid.map(|t| t.index() as u32).unwrap_or(u32::MAX));
    this().current_priority.set(priority);
}

pub fn num_cores() -> u32 {
    CPUS_NR as u32
}

pub fn mark_active(cpu: CpuId, active: bool) {
    with_cpu(cpu, |pc| pc.active.set(active));
}

pub fn is_active(cpu: CpuId) -> bool {
    with_cpu(cpu, |pc| pc.active.get())
}
