//! The hardware-abstraction contract the kernel core is built against.
//!
//! `Hal` is a set of associated functions, not an object-safe trait with
//! `&self` methods: there is exactly one implementor selected at compile
//! time per target (mirroring the `pub use <arch_mod> as arch;` re-export
//! every per-architecture module in this crate follows), so static
//! dispatch costs nothing and the kernel core stays generic over `H: Hal`
//! without ever boxing or virtual-dispatching into arch code.

/// Reason an inter-processor interrupt was sent, so the receiving CPU's IPI
/// handler knows whether to request a reschedule on return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiKind {
    /// No reschedule implied; used for cross-CPU rendezvous (cache flush,
    /// TLB shootdown) built on top of SMP atomics.
    Generic,
    /// The receiving CPU should reschedule at IRQ exit.
    Reschedule,
}

/// Opaque interrupt-mask token returned by [`Hal::disable_ints`] and
/// consumed by [`Hal::restore_ints`]. Callers must not inspect it; it only
/// round-trips so nested save/restore pairs compose correctly.
pub type IrqState = usize;

pub trait Hal {
    /// Monotonic milliseconds since boot.
    fn now_ms() -> u32;
    /// Monotonic microseconds since boot. Need not share an epoch with
    /// `now_ms`, only monotonicity.
    fn now_us() -> u64;

    /// Arms the single hardware one-shot to fire at `deadline_ms`. Returns
    /// `false` if the deadline has already passed and the caller should
    /// treat the timer as immediately expired instead.
    fn arm_oneshot(deadline_ms: u32) -> bool;
    /// Disarms the hardware one-shot. A no-op if it wasn't armed.
    fn disable_oneshot();

    /// Masks interrupts on the current CPU and returns a token that
    /// restores the prior mask state.
    fn disable_ints() -> IrqState;
    /// Restores interrupts to the state captured by `state`.
    fn restore_ints(state: IrqState);
    /// True if interrupts are currently masked on this CPU.
    fn ints_disabled() -> bool;

    /// Index of the CPU executing this call, in `0..num_cores()`.
    fn curr_cpu() -> u32;
    /// Number of CPUs brought up by `mp_init_percpu`.
    fn num_cores() -> u32;

    /// Reads the per-CPU current-thread slot as an opaque `u32`. The
    /// kernel core is the only party that interprets the value (it is a
    /// `ThreadId`'s index); the HAL only stores and retrieves it.
    fn curr_thread() -> u32;
    /// Writes the per-CPU current-thread slot.
    fn set_curr_thread(value: u32);

    /// Sends an IPI of `kind` to every CPU set in `target_mask`. Returns
    /// `false` if delivery could not be initiated.
    fn send_ipi(target_mask: u32, kind: IpiKind) -> bool;
    /// Brings up per-CPU arch state for the calling secondary CPU. A no-op
    /// on hosts with a single core.
    fn mp_init_percpu();

    /// Blocks the calling CPU until `signal_event` is called elsewhere, or
    /// returns immediately if no blocking primitive is available. Used by
    /// the SMP ticket spinlock's spin loop; never used to implement a
    /// blocking kernel primitive directly.
    fn wait_for_event();
    /// Wakes a CPU parked in `wait_for_event`.
    fn signal_event();

    /// Dumps a best-effort backtrace of the calling context to whatever
    /// diagnostic sink the platform provides. Used only from the panic
    /// handler; failure to produce one is not itself an error.
    fn backtrace();
    /// Resets the platform. Never returns.
    fn sys_reset() -> !;
}
