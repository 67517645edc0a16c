// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) vivo

#![no_std]

pub mod atomic;
pub mod hal;
pub mod sim;

pub use hal::{Hal, IpiKind, IrqState};
pub use sim as arch;
pub use sim::Arch;
