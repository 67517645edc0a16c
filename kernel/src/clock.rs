//! Monotonic time source (§2.3): millisecond and microsecond reads fed by
//! the HAL, with no locking — every caller reads the same hardware counter
//! directly.

use blue_arch::{Arch, Hal};

/// Sentinel meaning "block with no timeout".
pub const WAITING_FOREVER: u32 = u32::MAX;

/// Milliseconds since boot.
pub fn now_ms() -> u32 {
    Arch::now_ms()
}

/// Microseconds since boot.
pub fn now_us() -> u64 {
    Arch::now_us()
}

/// Adds `delay_ms` to the current time, saturating instead of wrapping so a
/// caller that passes a large delay near `u32::MAX` still gets a deadline
/// strictly in the future rather than one that silently wraps into the
/// past.
pub fn deadline_after(delay_ms: u32) -> u32 {
    now_ms().saturating_add(delay_ms)
}
