//! Staged init pipeline (§4.8): a table of `(level, flags, hook)` entries
//! invoked in ascending level, then registration order, each hook running
//! to completion before the next begins.
//!
//! The reference codebase wires this kind of table through
//! `#[link_section]` statics and linker-provided range symbols (`boot.rs`'s
//! `__bk_app_array_start`/`__bk_app_array_end`, one section per level). That
//! needs a real linker script and doesn't exist under `cargo test`, so this
//! port generalizes it to a single fixed-capacity table entries `register`
//! themselves into at a `(level, flags)` granularity instead of one array
//! per level — still one mechanism, still ordered the same way, just filled
//! by an explicit call instead of a linker-discovered range. A real
//! embedder's linker-section walk would call `register` once per
//! discovered entry at the same point this module's own boot-time caller
//! does.

use core::cell::Cell;

use blue_kconfig::MAX_INIT_HOOKS;

use crate::error::{Error, Result};
use crate::sync::lock::spinlock::SpinLock;

/// An init level: an integer bucket in the staged boot pipeline. Higher
/// runs later. Threading primitives are safe to use from `THREADING`
/// onward; hooks before it must not touch the scheduler.
pub type Level = u32;

pub const EARLIEST: Level = 0;
pub const ARCH_EARLY: Level = 10;
pub const PLATFORM_EARLY: Level = 20;
pub const TARGET_EARLY: Level = 30;
pub const HEAP: Level = 40;
pub const VM: Level = 50;
pub const KERNEL: Level = 60;
pub const THREADING: Level = 70;
pub const ARCH: Level = 80;
pub const PLATFORM: Level = 90;
pub const TARGET: Level = 100;
pub const APPS: Level = 110;
pub const LAST: Level = 120;

/// A hook's applicability flags. A hook may request more than one; a given
/// `run_level` call only fires the bits both the caller and the hook ask
/// for.
pub type Flags = u32;

pub const PRIMARY_CPU: Flags = 1 << 0;
pub const SECONDARY_CPU: Flags = 1 << 1;
pub const SUSPEND: Flags = 1 << 2;
pub const RESUME: Flags = 1 << 3;

pub type InitHookFn = extern "C" fn();

/// A single registered hook. Built as a `'static` so it can live in the
/// fixed-capacity table by reference; `ran_mask` records which requested
/// flag bits have already fired it, making repeated `run_level` calls with
/// the same mask idempotent per `(level, flag)` pair (Testable Property 8).
pub struct InitHookEntry {
    level: Level,
    flags: Flags,
    hook: InitHookFn,
    name: &'static str,
    ran_mask: Cell<Flags>,
}

unsafe impl Sync for InitHookEntry {}

impl InitHookEntry {
    pub const fn new(level: Level, flags: Flags, hook: InitHookFn, name: &'static str) -> Self {
        InitHookEntry { level, flags, hook, name, ran_mask: Cell::new(0) }
    }
}

struct Table {
    entries: [Option<&'static InitHookEntry>; MAX_INIT_HOOKS],
    len: usize,
}

impl Table {
    const fn new() -> Self {
        Table { entries: [None; MAX_INIT_HOOKS], len: 0 }
    }
}

static TABLE: SpinLock<Table> = SpinLock::new(Table::new());

/// Registers `entry` in the pipeline. Entries fire in ascending `level`,
/// then registration order within a level (the order `register` was
/// called in), matching the reference table's own "array order == link
/// order" behavior.
///
/// Fails with `AlreadyExists` if the table is full or `entry` (by name and
/// level) is already registered — double-registration of a hook is a
/// caller bug the spec calls out explicitly (§7).
pub fn register(entry: &'static InitHookEntry) -> Result<()> {
    let mut table = TABLE.lock();
    if table.entries[..table.len].iter().any(|e| {
        let e = e.unwrap();
        e.name == entry.name && e.level == entry.level
    }) {
        return Err(Error::already_exists("init hook already registered at this level"));
    }
    if table.len >= MAX_INIT_HOOKS {
        return Err(Error::no_memory("init hook table is full"));
    }
    let len = table.len;
    table.entries[len] = Some(entry);
    table.len = len + 1;
    Ok(())
}

/// Invokes every registered hook whose `level` falls in `[start, stop]`
/// (inclusive) and whose `flags` intersect `requested`, in ascending level
/// then registration order. Each hook runs to completion before the next
/// begins (§4.8). A hook already fired for every bit `requested` asks for
/// is skipped — the idempotency guarantee backing Testable Property 8.
pub fn run_level(requested: Flags, start: Level, stop: Level) {
    // Snapshot under the lock, then run hooks with it released: hooks at
    // THREADING and beyond may themselves block or call into the
    // scheduler, which must not happen while holding this table's lock.
    let mut candidates: [Option<&'static InitHookEntry>; MAX_INIT_HOOKS] = [None; MAX_INIT_HOOKS];
    let count = {
        let table = TABLE.lock();
        let mut n = 0;
        for e in table.entries[..table.len].iter().flatten() {
            if e.level >= start && e.level <= stop {
                candidates[n] = Some(e);
                n += 1;
            }
        }
        n
    };
    candidates[..count].sort_by_key(|e| e.unwrap().level);
    for entry in candidates[..count].iter().flatten() {
        let to_run = requested & entry.flags & !entry.ran_mask.get();
        if to_run == 0 {
            continue;
        }
        (entry.hook)();
        entry.ran_mask.set(entry.ran_mask.get() | to_run);
    }
}

#[cfg(test)]
pub(crate) fn reset_for_tests() {
    let mut table = TABLE.lock();
    for e in table.entries[..table.len].iter().flatten() {
        e.ran_mask.set(0);
    }
    table.len = 0;
    table.entries = [None; MAX_INIT_HOOKS];
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static CALLS: AtomicU32 = AtomicU32::new(0);
    static ORDER: [AtomicU32; 4] = [const { AtomicU32::new(0) }; 4];

    extern "C" fn bump() {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    extern "C" fn record_heap() {
        ORDER[0].store(1, Ordering::SeqCst);
    }

    extern "C" fn record_vm() {
        ORDER[1].store(2, Ordering::SeqCst);
    }

    fn reset_all() {
        reset_for_tests();
        CALLS.store(0, Ordering::SeqCst);
        for o in ORDER.iter() {
            o.store(0, Ordering::SeqCst);
        }
    }

    #[test]
    fn hooks_run_in_ascending_level_order_regardless_of_registration_order() {
        reset_all();
        static VM_HOOK: InitHookEntry = InitHookEntry::new(VM, PRIMARY_CPU, record_vm, "vm_hook_test");
        static HEAP_HOOK: InitHookEntry = InitHookEntry::new(HEAP, PRIMARY_CPU, record_heap, "heap_hook_test");
        register(&VM_HOOK).unwrap();
        register(&HEAP_HOOK).unwrap();
        run_level(PRIMARY_CPU, EARLIEST, LAST);
        assert_eq!(ORDER[0].load(Ordering::SeqCst), 1);
        assert_eq!(ORDER[1].load(Ordering::SeqCst), 2);
    }

    #[test]
    fn flag_mismatch_skips_the_hook() {
        reset_all();
        static SECONDARY_ONLY: InitHookEntry = InitHookEntry::new(KERNEL, SECONDARY_CPU, bump, "secondary_only_test");
        register(&SECONDARY_ONLY).unwrap();
        run_level(PRIMARY_CPU, EARLIEST, LAST);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
        run_level(SECONDARY_CPU, EARLIEST, LAST);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn running_the_pipeline_twice_invokes_each_hook_at_most_once_per_flag() {
        reset_all();
        static IDEMPOTENT: InitHookEntry = InitHookEntry::new(KERNEL, PRIMARY_CPU, bump, "idempotent_test");
        register(&IDEMPOTENT).unwrap();
        run_level(PRIMARY_CPU, EARLIEST, LAST);
        run_level(PRIMARY_CPU, EARLIEST, LAST);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn double_registration_is_rejected() {
        reset_all();
        static DUP: InitHookEntry = InitHookEntry::new(KERNEL, PRIMARY_CPU, bump, "dup_test");
        register(&DUP).unwrap();
        assert!(register(&DUP).is_err());
    }

    #[test]
    fn start_stop_window_excludes_hooks_outside_it() {
        reset_all();
        static EARLY: InitHookEntry = InitHookEntry::new(ARCH_EARLY, PRIMARY_CPU, bump, "early_test");
        static LATE: InitHookEntry = InitHookEntry::new(APPS, PRIMARY_CPU, bump, "late_test");
        register(&EARLY).unwrap();
        register(&LATE).unwrap();
        run_level(PRIMARY_CPU, EARLIEST, THREADING - 1);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        run_level(PRIMARY_CPU, THREADING, LAST);
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }
}
