//! Interrupt-mask lock primitive, the per-CPU preemption gate (§4.6), and
//! the IRQ entry/exit contract (§4.7).

use core::cell::{Cell, UnsafeCell};
use core::ops::{Deref, DerefMut};

use blue_arch::{Arch, Hal};

use crate::types::CpuId;

/// A raw interrupt-mask token: `lock()` disables interrupts on the current
/// CPU and the guard's `Drop` restores them. Cheaper than the SMP ticket
/// lock in `sync::lock::spinlock` for small pieces of state that are only
/// ever touched under IRQ-mask, never contended across CPUs.
#[repr(transparent)]
#[derive(Clone, Debug)]
pub struct IrqLockRaw(Cell<usize>);

impl Default for IrqLockRaw {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqLockRaw {
    #[inline]
    pub const fn new() -> Self {
        Self(Cell::new(0))
    }

    #[inline]
    pub fn lock(&self) -> IrqLockRawGuard<'_> {
        self.raw_lock();
        IrqLockRawGuard(self)
    }

    #[inline]
    fn raw_lock(&self) {
        self.0.set(Arch::disable_ints());
    }

    #[inline]
    fn raw_unlock(&self) {
        Arch::restore_ints(self.0.get());
    }
}

pub struct IrqLockRawGuard<'a>(&'a IrqLockRaw);

impl Drop for IrqLockRawGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.0.raw_unlock();
    }
}

pub struct IrqLock<T> {
    lock: IrqLockRaw,
    inner: UnsafeCell<T>,
}

impl<T> IrqLock<T> {
    pub const fn new(element: T) -> Self {
        IrqLock {
            lock: IrqLockRaw::new(),
            inner: UnsafeCell::new(element),
        }
    }

    pub fn lock(&self) -> IrqGuard<'_, T> {
        self.lock.raw_lock();
        IrqGuard { lock: self }
    }
}

unsafe impl<T> Sync for IrqLock<T> {}

pub struct IrqGuard<'a, T> {
    lock: &'a IrqLock<T>,
}

impl<T> Deref for IrqGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for IrqGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for IrqGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw_unlock();
    }
}

/// Per-CPU preempt-disable counter plus pending-reschedule flag (§4.6).
/// Lives inside each `cpu::PerCpu` slot; only the CPU that owns a slot
/// touches its counter, so plain `Cell`s suffice.
#[derive(Debug, Default)]
pub struct PreemptGate {
    disable_count: Cell<u32>,
    pending_reschedule: Cell<bool>,
}

impl PreemptGate {
    pub const fn new() -> Self {
        PreemptGate {
            disable_count: Cell::new(0),
            pending_reschedule: Cell::new(false),
        }
    }

    pub fn count(&self) -> u32 {
        self.disable_count.get()
    }

    pub fn is_preemptible(&self) -> bool {
        self.disable_count.get() == 0
    }

    pub fn disable(&self) {
        self.disable_count.set(self.disable_count.get() + 1);
    }

    /// Decrements the count; if it reaches zero and a reschedule is
    /// pending, clears the flag and returns `true` so the caller reschedules
    /// immediately (`preempt_enable`'s contract). `preempt_enable_no_resched`
    /// is the same operation with the caller choosing to handle the flag
    /// itself (e.g. at IRQ exit) instead of rescheduling inline.
    pub fn enable(&self) -> bool {
        let n = self.disable_count.get().saturating_sub(1);
        self.disable_count.set(n);
        if n == 0 && self.pending_reschedule.get() {
            self.pending_reschedule.set(false);
            true
        } else {
            false
        }
    }

    /// If currently disabled, records the pending reschedule and returns
    /// `true`. Otherwise returns `false`, telling the caller it may
    /// reschedule immediately instead.
    pub fn set_pending_if_disabled(&self) -> bool {
        if self.disable_count.get() > 0 {
            self.pending_reschedule.set(true);
            true
        } else {
            false
        }
    }

    pub fn pending(&self) -> bool {
        self.pending_reschedule.get()
    }

    pub fn clear_pending(&self) {
        self.pending_reschedule.set(false);
    }
}

/// The seven-step IRQ entry/exit contract (§4.7). Per-CPU interrupt nesting
/// is tracked in `cpu::PerCpu`; `enter`/`leave` bump it and fold the
/// preemption gate in so timer and IPI handlers get deferred rescheduling
/// "for free" by funneling through the same path.
pub struct Irq;

/// What a registered IRQ handler asks the trampoline to do on return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqDisposition {
    NoReschedule,
    Reschedule,
}

impl Irq {
    /// Step 2 of §4.7: mark `in_irq`, bump preempt-disable. Returns the
    /// previous nesting depth.
    pub fn enter(cpu: CpuId) -> u32 {
        crate::cpu::with_cpu(cpu, |pc| {
            let prev = pc.interrupt_nest.get();
            pc.interrupt_nest.set(prev + 1);
            pc.preempt.disable();
            prev
        })
    }

    /// Steps 4-6 of §4.7: `preempt_enable_no_resched`, clear `in_irq`, and
    /// report whether the caller should now call into the scheduler.
    /// `handler_asked` is the handler's own `{NO_RESCHEDULE, RESCHEDULE}`
    /// return value (step 3).
    pub fn leave(cpu: CpuId, handler_asked: IrqDisposition) -> bool {
        crate::cpu::with_cpu(cpu, |pc| {
            let prev = pc.interrupt_nest.get();
            pc.interrupt_nest.set(prev.saturating_sub(1));
            let pending = pc.preempt.enable();
            pending || handler_asked == IrqDisposition::Reschedule
        })
    }
}
