//! Detached-thread reaper (§4.1's `Death` state): frees the descriptor of
//! every detached zombie thread, without anyone ever calling `join` for it.
//! A zombie nobody detached stays on the zombie list untouched until its
//! joiner calls `thread::join`, which reaps it directly.
//!
//! The reference codebase runs an equivalent of this as a loop inside a
//! dedicated per-CPU zombie/idle thread body (`ZombieManager::reclaim`,
//! woken by a semaphore the exiting thread posts). This core has no real
//! `context_switch` (`scheduler::block_locked`'s doc comment explains why),
//! so there is no infinite loop to write here either: `reclaim` is the pass
//! a real idle-thread body would call once per iteration, exposed directly
//! so `idle::idle_entry` and tests can both drive it.

use blue_kconfig::MAX_THREADS;

use crate::scheduler;
use crate::thread;
use crate::types::ThreadId;

/// Reaps every zombie thread presently marked detached and returns the
/// count reaped. Threads a caller is still expected to `join` are left
/// exactly where they are.
pub fn reclaim() -> u32 {
    let mut candidates: [Option<ThreadId>; MAX_THREADS] = [None; MAX_THREADS];
    let mut count = 0usize;
    scheduler::with_sched(|s| {
        s.zombie_list().for_each(s, |tid| {
            if count < MAX_THREADS && s.tcb(tid).is_detached() {
                candidates[count] = Some(tid);
                count += 1;
            }
        });
    });
    for tid in candidates[..count].iter().flatten() {
        thread::reap(*tid);
    }
    count as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadState;
    use blue_arch::Arch;

    fn reset_all() {
        Arch::reset();
        scheduler::reset_for_tests();
    }

    #[test]
    fn reclaim_frees_detached_zombies_but_leaves_joinable_ones() {
        reset_all();
        let detached = thread::create("d", 5, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        let joinable = thread::create("j", 5, thread::noop_entry, core::ptr::null_mut(), None).unwrap();
        thread::detach(detached).unwrap();
        scheduler::with_sched(|s| {
            scheduler::destroy_locked(s, detached, 1);
            scheduler::destroy_locked(s, joinable, 2);
        });

        assert_eq!(reclaim(), 1);

        assert_eq!(thread::state(detached), None);
        assert_eq!(thread::state(joinable), Some(ThreadState::Death));
    }

    #[test]
    fn reclaim_on_an_empty_zombie_list_reaps_nothing() {
        reset_all();
        assert_eq!(reclaim(), 0);
    }
}
