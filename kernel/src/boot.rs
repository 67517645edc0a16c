//! Boot sequence (§4.9): bringing the primary CPU from reset to the
//! scheduler, and bringing each secondary CPU online behind it.
//!
//! The reference `boot.rs` is a naked `_start` that walks a linker-defined
//! `__init_array`/`__bk_app_array` range before jumping into the scheduler
//! loop. This core has no naked entry point or linker script (`init.rs`'s
//! module doc comment explains the same tradeoff for its hook table), so
//! [`lk_main`] and [`lk_secondary_cpu_entry`] are plain functions an
//! embedder's own reset handler calls directly, and both return once their
//! CPU is fully online rather than looping forever. A real embedder never
//! returns from either: its own arch trampoline takes over running whatever
//! thread `do_reschedule_locked` installs as current and never comes back.
//! This core has no trampoline to hand off to — the same gap
//! `scheduler::block_locked`'s doc comment calls out — so the final "enter
//! the scheduler and never return" step is left to the caller's own
//! `loop { Arch::wait_for_event() }`, exactly like `thread::exit`'s.

use crate::error::Result;
use crate::types::{CpuId, ThreadId};
use crate::{cpu, idle, init, mp};

/// Brings the primary CPU (CPU 0) from reset to its idle thread running as
/// `current`, running every registered init hook along the way. Order
/// (§4.9):
///
/// 1. Hooks at [`init::EARLIEST`] through [`init::HEAP`] run first; nothing
///    at or below `HEAP` may touch the scheduler.
/// 2. CPU 0's idle thread is created and installed directly as `current`
///    without ever touching a run queue. It doubles as the boot sequence's
///    "bootstrap thread": exactly the thread `do_reschedule_locked` falls
///    back to once nothing else is `Ready` (§4.2), so there is no separate
///    bootstrap-thread type to create and then replace.
/// 3. CPU 0 is marked active in the MP coordinator, so `mp::reschedule`
///    targets it from this point on.
/// 4. The logging backend comes up so every later hook can log.
/// 5. Every remaining hook through [`init::LAST`] runs.
///
/// Returns the `ThreadId` of CPU 0's idle/bootstrap thread.
pub fn lk_main() -> Result<ThreadId> {
    init::run_level(init::PRIMARY_CPU, init::EARLIEST, init::HEAP);

    let bootstrap = idle::init(0)?;
    cpu::set_current_thread(Some(bootstrap), blue_kconfig::IDLE_THREAD_PRIORITY);
    cpu::mark_active(0, true);
    mp::set_cpu_active(0, true);

    crate::logger::init(log::LevelFilter::Info);

    init::run_level(init::PRIMARY_CPU, init::VM, init::LAST);

    Ok(bootstrap)
}

/// Brings a secondary CPU online (§4.9's multi-core bring-up path): its own
/// idle thread installed as `current` the same way CPU 0's is, then every
/// hook flagged [`init::SECONDARY_CPU`] across the whole level range —
/// secondary CPUs never run the primary-only early hooks `lk_main` already
/// ran once.
pub fn lk_secondary_cpu_entry(cpu: CpuId) -> Result<ThreadId> {
    let idle_tid = idle::init(cpu)?;
    cpu::set_current_thread(Some(idle_tid), blue_kconfig::IDLE_THREAD_PRIORITY);
    cpu::mark_active(cpu, true);
    mp::set_cpu_active(cpu, true);

    init::run_level(init::SECONDARY_CPU, init::EARLIEST, init::LAST);

    Ok(idle_tid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler;
    use blue_arch::Arch;

    fn reset_all() {
        Arch::reset();
        scheduler::reset_for_tests();
        init::reset_for_tests();
    }

    #[test]
    fn primary_boot_installs_an_idle_thread_as_current_and_marks_cpu_active() {
        reset_all();
        let bootstrap = lk_main().unwrap();
        assert_eq!(cpu::current_thread(), Some(bootstrap));
        assert!(cpu::is_active(0));
        assert_eq!(mp::active_cpus() & 1, 1);
    }

    #[test]
    fn secondary_boot_installs_its_own_idle_thread() {
        reset_all();
        lk_main().unwrap();
        let secondary_idle = lk_secondary_cpu_entry(0).unwrap();
        assert_eq!(cpu::current_thread(), Some(secondary_idle));
    }
}
