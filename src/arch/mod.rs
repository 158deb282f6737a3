// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture Abstraction Layer
//!
//! Turns the processor context handed over by the OS at fault time into a
//! [`Registers`] snapshot. Exactly one implementation is compiled in,
//! picked by target architecture and by the OS context type:
//!
//! - Windows: `CONTEXT`
//! - Linux, Android, macOS: `ucontext_t`

use crate::registers::Registers;

#[cfg(target_arch = "x86")]
mod x86;

#[cfg(target_arch = "x86_64")]
mod x86_64;

#[cfg(target_arch = "aarch64")]
mod aarch64;

/// Processor context captured by the OS when a fault is delivered
pub trait ProcessorContext {
    /// Address of the instruction that was executing
    fn program_counter(&self) -> usize;

    /// Copy the register file into canonical order
    ///
    /// Total over any context the OS can deliver; no side effects.
    fn build_registers(&self) -> Registers;
}

/// OS processor context type for this target
#[cfg(windows)]
pub type NativeContext = winapi::um::winnt::CONTEXT;

/// OS processor context type for this target
#[cfg(unix)]
pub type NativeContext = libc::ucontext_t;

/// Build a register snapshot from a borrowed processor context
#[inline]
pub fn build_registers<C: ProcessorContext + ?Sized>(context: &C) -> Registers {
    context.build_registers()
}
