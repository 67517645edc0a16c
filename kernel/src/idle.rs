//! Per-CPU idle thread (§4.2's "falls back to idle" scheduling rule, §4.9
//! boot sequence step 6): a priority-0 thread created once per CPU and
//! installed in that CPU's [`crate::cpu::PerCpu::idle`] slot, never placed
//! on a run queue. `scheduler::do_reschedule_locked` falls back to it only
//! when `pick_next_locked` finds nothing eligible.
//!
//! The reference codebase's idle thread body loops forever reclaiming
//! zombies and, if the `idle_hook` feature is on, running registered power
//! hooks. This core has no real `context_switch` to loop inside of (see
//! `scheduler::block_locked`'s doc comment): [`idle_entry`] exists only so
//! every idle `Tcb` has a well-formed `ThreadEntry`, and [`zombie::reclaim`]
//! is the pass a real embedder's idle loop body would call each iteration.

use core::ffi::c_void;

use blue_kconfig::IDLE_THREAD_STACK_SIZE;

use crate::error::Result;
use crate::thread::{self, ThreadId};
use crate::types::CpuId;
use crate::zombie;

/// Creates `cpu`'s idle thread and installs it in that CPU's per-CPU slot.
/// Does not resume it — the idle thread is never `Ready`; it's the
/// scheduler's direct fallback when nothing else is.
pub fn init(cpu: CpuId) -> Result<ThreadId> {
    let tid = thread::create_idle("idle", idle_entry, IDLE_THREAD_STACK_SIZE)?;
    crate::cpu::with_cpu(cpu, |pc| pc.idle.set(Some(tid)));
    Ok(tid)
}

/// The idle thread's entry point. A real embedder's arch trampoline calls
/// this once, in a loop, whenever the idle thread is scheduled; this core
/// never calls it (see the module doc comment) but keeps it as the
/// `ThreadEntry` every idle `Tcb` is created with.
pub extern "C" fn idle_entry(_arg: *mut c_void) {
    loop {
        zombie::reclaim();
        blue_arch::Arch::wait_for_event();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler;
    use blue_arch::Arch;

    fn reset_all() {
        Arch::reset();
        scheduler::reset_for_tests();
    }

    #[test]
    fn init_installs_an_idle_thread_at_priority_zero() {
        reset_all();
        let tid = init(0).unwrap();
        assert_eq!(thread::priority(tid), Some(0));
        assert_eq!(crate::cpu::with_cpu(0, |pc| pc.idle.get()), Some(tid));
    }
}
