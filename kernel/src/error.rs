//! Semantic error kinds the core returns from fallible operations.
//!
//! Programming-model violations (mutex unlocked by a non-owner, a timer
//! with a bad magic, blocking while holding a spinlock, blocking from IRQ
//! context) are not represented here: those are fatal and go through
//! [`crate::kpanic`] instead, per the error-handling split the core
//! follows throughout.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Null, out-of-range priority, double-init, and similar caller misuse.
    InvalidArgs,
    /// Stack or descriptor allocation failed during `thread_create`.
    NoMemory,
    /// A blocking operation reached its deadline.
    TimedOut,
    /// Woken via `wake_one`/`wake_all` during a block; the object is still
    /// valid.
    Interrupted,
    /// The object was queried or operated on in the wrong state (e.g.
    /// suspend of a non-Ready thread).
    NotReady,
    /// Double-register of a timer or init hook at the same key.
    AlreadyExists,
    /// The object is already bound to something that conflicts with this
    /// operation.
    AlreadyBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: &'static str,
}

impl Error {
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Error { kind, message }
    }
}

macro_rules! ctor {
    ($name:ident, $kind:ident) => {
        pub const fn $name(message: &'static str) -> Error {
            Error::new(ErrorKind::$kind, message)
        }
    };
}

impl Error {
    ctor!(invalid_args, InvalidArgs);
    ctor!(no_memory, NoMemory);
    ctor!(timed_out, TimedOut);
    ctor!(interrupted, Interrupted);
    ctor!(not_ready, NotReady);
    ctor!(already_exists, AlreadyExists);
    ctor!(already_bound, AlreadyBound);
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
