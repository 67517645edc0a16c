//! Atomic primitives the core builds spinlocks and statistics counters on.
//!
//! Thin, real wrappers over `core::sync::atomic` — not the
//! stubbed-to-always-succeed `atomic_cmpxchg` some arch backends in the
//! reference codebase fall back to when a target's native CAS isn't wired
//! up. Every operation here is a genuine compare-exchange or fetch-op.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Compares `*cell` against `current`; if equal, stores `new` and returns
/// `Ok(current)`. Otherwise returns `Err` with the observed value.
#[inline]
pub fn compare_and_swap(cell: &AtomicUsize, current: usize, new: usize) -> Result<usize, usize> {
    cell.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
}

#[inline]
pub fn fetch_add(cell: &AtomicUsize, val: usize) -> usize {
    cell.fetch_add(val, Ordering::AcqRel)
}

#[inline]
pub fn fetch_or(cell: &AtomicUsize, val: usize) -> usize {
    cell.fetch_or(val, Ordering::AcqRel)
}

#[inline]
pub fn fetch_and(cell: &AtomicUsize, val: usize) -> usize {
    cell.fetch_and(val, Ordering::AcqRel)
}

#[inline]
pub fn swap(cell: &AtomicUsize, val: usize) -> usize {
    cell.swap(val, Ordering::AcqRel)
}

#[inline]
pub fn acquire_fence() {
    core::sync::atomic::fence(Ordering::Acquire);
}

#[inline]
pub fn release_fence() {
    core::sync::atomic::fence(Ordering::Release);
}

#[inline]
pub fn full_fence() {
    core::sync::atomic::fence(Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_succeeds_only_on_match() {
        let cell = AtomicUsize::new(5);
        assert_eq!(compare_and_swap(&cell, 5, 6), Ok(5));
        assert_eq!(compare_and_swap(&cell, 5, 7), Err(6));
        assert_eq!(cell.load(Ordering::Relaxed), 6);
    }
}
