#![no_std]

//! Compile-time tunables for the kernel core.
//!
//! The reference codebase pulls these values from an out-of-tree Kconfig file
//! via `cargo_kconfig::load_kcfg!`. That machinery needs a real `.config` to
//! load and is orthogonal to the kernel-core semantics this workspace
//! implements, so the values live here as plain `const`s instead.

/// Number of priority levels. Priority 0 is reserved for the per-CPU idle
/// thread; priority `NUM_PRIORITIES - 1` is highest.
pub const NUM_PRIORITIES: u32 = 32;

/// Highest legal thread priority (inclusive). Priority 0 is idle-reserved.
pub const THREAD_PRIORITY_MAX: u32 = NUM_PRIORITIES - 1;

/// Size of the fixed thread arena. Every `Thread` lives at a stable index
/// below this bound for the lifetime of the kernel.
pub const MAX_THREADS: usize = 256;

/// Number of CPUs brought up by `mp_init_percpu`. 1 means uniprocessor.
#[cfg(feature = "smp")]
pub const CPUS_NR: usize = 4;
#[cfg(not(feature = "smp"))]
pub const CPUS_NR: usize = 1;

/// Scheduler ticks per second. `1000 % TICK_PER_SECOND == 0` is required so
/// millisecond conversion stays exact.
pub const TICK_PER_SECOND: u32 = 1000;

/// Default stack size (bytes) for threads that don't request one explicitly.
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// Stack size for the idle thread on each CPU.
pub const IDLE_THREAD_STACK_SIZE: usize = 1024;

/// Priority the idle thread runs at. Fixed at 0 per the scheduler's selection
/// rules (§4.2): "a 32-bit bitmap indicates non-empty priorities... priority 0
/// reserved for the per-CPU idle thread".
pub const IDLE_THREAD_PRIORITY: u8 = 0;

/// Alignment used for heap-backed stack allocations.
pub const STACK_ALIGN: usize = 16;

/// Maximum number of pending software timers the timer-storm scenario (S5)
/// and general use are expected to hold live at once. Not a hard cap on the
/// timer list (the list is a `Vec`), only a sizing hint for callers.
pub const TYPICAL_MAX_TIMERS: usize = 256;

/// Upper bound on entries in the staged init-hook table.
pub const MAX_INIT_HOOKS: usize = 128;
