//! Generic lock abstraction spinlock builds on.
//!
//! `Lock<T, B>` pairs a piece of data with a `Backend` that knows how to
//! acquire and release whatever raw lock state `B::State` is — today only
//! [`spinlock::SpinLockBackend`], but the split keeps the guard/data
//! plumbing reusable if a second backend (e.g. a sleeping mutex) is added
//! later.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

pub mod spinlock;

/// # Safety
///
/// Implementors must guarantee `lock`/`unlock` provide mutual exclusion for
/// as long as a `GuardState` returned by `lock` is alive.
pub unsafe trait Backend {
    type State;
    type GuardState;

    /// # Safety
    /// `ptr` must be valid for the lifetime of the `Lock`.
    unsafe fn init(ptr: *mut Self::State);

    /// # Safety
    /// `ptr` must be valid and not already locked by the caller.
    unsafe fn lock(ptr: *mut Self::State) -> Self::GuardState;

    /// # Safety
    /// `ptr` must be the same one passed to the matching `lock` call.
    unsafe fn unlock(ptr: *mut Self::State, guard_state: &Self::GuardState);
}

pub struct Lock<T: ?Sized, B: Backend> {
    state: UnsafeCell<B::State>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send, B: Backend> Send for Lock<T, B> {}
unsafe impl<T: ?Sized + Send, B: Backend> Sync for Lock<T, B> {}

impl<T, B: Backend> Lock<T, B>
where
    B::State: Sized,
{
    pub const fn new(data: T, state: B::State) -> Self {
        Lock {
            state: UnsafeCell::new(state),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized, B: Backend> Lock<T, B> {
    pub fn lock(&self) -> Guard<'_, T, B> {
        let guard_state = unsafe { B::lock(self.state.get()) };
        Guard {
            lock: self,
            guard_state,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }
}

pub struct Guard<'a, T: ?Sized, B: Backend> {
    lock: &'a Lock<T, B>,
    guard_state: B::GuardState,
}

impl<T: ?Sized, B: Backend> Deref for Guard<'_, T, B> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized, B: Backend> DerefMut for Guard<'_, T, B> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized, B: Backend> Drop for Guard<'_, T, B> {
    fn drop(&mut self) {
        unsafe { B::unlock(self.lock.state.get(), &self.guard_state) }
    }
}
