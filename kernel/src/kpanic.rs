//! Fatal-error path (§7): programming-model violations (a dangling
//! `ThreadId`, a corrupted `Timer`, blocking from a context that cannot
//! block) are not recoverable `Result`s — they are bugs, and go through
//! [`fatal`] instead. The core never papers over these with a default or a
//! silent no-op.

use blue_arch::{Arch, Hal};

/// Disables interrupts, logs `msg` with whatever context is cheaply
/// available, and halts or resets per the platform's configuration. Never
/// returns.
///
/// Interrupts are masked first so nothing else can observe or further
/// corrupt state while diagnostics are flushed — matches the panic
/// handler's own behavior in [`crate::lib`](crate), which this exists to
/// back.
pub fn fatal(msg: &str) -> ! {
    Arch::disable_ints();
    log::error!(
        "fatal: {msg} (cpu={}, thread={:?})",
        crate::cpu::current_cpu(),
        crate::cpu::current_thread()
    );
    Arch::backtrace();

    #[cfg(debug_assertions)]
    loop {
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }
    #[cfg(not(debug_assertions))]
    Arch::sys_reset()
}
