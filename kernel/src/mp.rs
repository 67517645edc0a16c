//! MP coordinator (§4.10): active/realtime CPU masks and reschedule
//! routing across CPUs.

use core::sync::atomic::{AtomicU32, Ordering};

pub use blue_arch::IpiKind;
use blue_arch::{Arch, Hal};

use crate::types::CpuId;

static ACTIVE_CPUS: AtomicU32 = AtomicU32::new(0);
static REALTIME_CPUS: AtomicU32 = AtomicU32::new(0);

/// Marks `cpu` active (or inactive) in the MP coordinator's dispatch mask.
/// Called once a CPU finishes its boot/online sequence (§4.9) and, in
/// principle, when it goes offline — this core has no offline path.
pub fn set_cpu_active(cpu: CpuId, active: bool) {
    let bit = 1u32 << cpu;
    if active {
        ACTIVE_CPUS.fetch_or(bit, Ordering::AcqRel);
    } else {
        ACTIVE_CPUS.fetch_and(!bit, Ordering::AcqRel);
    }
}

pub fn active_cpus() -> u32 {
    ACTIVE_CPUS.load(Ordering::Acquire)
}

/// Marks `cpu` as a "realtime" CPU the scheduler should avoid disturbing
/// unless a wakeup is explicitly realtime.
pub fn set_realtime(cpu: CpuId, realtime: bool) {
    let bit = 1u32 << cpu;
    if realtime {
        REALTIME_CPUS.fetch_or(bit, Ordering::AcqRel);
    } else {
        REALTIME_CPUS.fetch_and(!bit, Ordering::AcqRel);
    }
}

pub fn realtime_cpus() -> u32 {
    REALTIME_CPUS.load(Ordering::Acquire)
}

/// Picks target CPUs for a reschedule-carrying wakeup: every active CPU
/// except the caller, further restricted to non-realtime CPUs unless
/// `realtime` wakeups are explicitly allowed to disturb them.
pub fn reschedule_targets(self_cpu: CpuId, realtime: bool) -> u32 {
    let others = active_cpus() & !(1u32 << self_cpu);
    if realtime {
        others
    } else {
        others & !realtime_cpus()
    }
}

/// Sends `IPI_RESCHEDULE` to `target_mask`. The IPI handler's only job on
/// the receiving CPU is to return `Reschedule` from its IRQ handler so the
/// normal IRQ-exit path (`irq::Irq::leave`) reschedules.
pub fn reschedule(target_mask: u32) -> bool {
    if target_mask == 0 {
        return true;
    }
    Arch::send_ipi(target_mask, IpiKind::Reschedule)
}

pub fn send_generic(target_mask: u32) -> bool {
    Arch::send_ipi(target_mask, IpiKind::Generic)
}
