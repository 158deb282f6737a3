// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Exception Descriptor
//!
//! The record a trap fills in when its callback faults. The layout is
//! consumed across language boundaries and must stay fixed per target:
//!
//! | Offset          | Field       | Type                       |
//! |-----------------|-------------|----------------------------|
//! | 0               | `code`      | `u32`                      |
//! | pointer-aligned | `address`   | `*mut c_void`              |
//! | next            | `registers` | `[usize; NUM_REGISTERS]`   |
//!
//! `registers` is absent on architectures without a register layout.

use core::ffi::c_void;

use crate::code::ExceptionCode;
#[cfg(trapguard_registers)]
use crate::registers::Registers;

/// Description of a trapped fault
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Exception {
    /// Raw OS fault code
    code: u32,

    /// Address of the faulting instruction
    address: *mut c_void,

    /// Register file at the moment of the fault
    #[cfg(trapguard_registers)]
    registers: Registers,
}

// The address is an opaque value and is never dereferenced.
unsafe impl Send for Exception {}
unsafe impl Sync for Exception {}

impl Exception {
    /// Descriptor with no fault recorded
    pub const fn empty() -> Self {
        Self {
            code: ExceptionCode::Invalid as u32,
            address: core::ptr::null_mut(),
            #[cfg(trapguard_registers)]
            registers: Registers::empty(),
        }
    }

    /// Fill in the fault fields
    #[cfg(trapguard_registers)]
    pub(crate) fn record(&mut self, code: u32, address: *mut c_void, registers: Registers) {
        self.code = code;
        self.address = address;
        self.registers = registers;
    }

    /// Fill in the fault fields
    #[cfg(not(trapguard_registers))]
    pub(crate) fn record(&mut self, code: u32, address: *mut c_void) {
        self.code = code;
        self.address = address;
    }

    /// Fault code, or [`ExceptionCode::Invalid`] for codes without a variant
    pub fn code(&self) -> ExceptionCode {
        ExceptionCode::from_raw(self.code)
    }

    /// Fault code exactly as reported by the OS
    pub fn raw_code(&self) -> u32 {
        self.code
    }

    /// Address of the faulting instruction
    ///
    /// Not guaranteed to be dereferenceable.
    pub fn address(&self) -> *mut c_void {
        self.address
    }

    /// Register snapshot taken when the fault was delivered
    #[cfg(trapguard_registers)]
    pub fn registers(&self) -> &Registers {
        &self.registers
    }
}

impl Default for Exception {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for Exception {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("Exception");
        s.field("code", &self.code());
        s.field("raw_code", &format_args!("{:#010x}", self.code));
        s.field("address", &self.address);
        #[cfg(trapguard_registers)]
        s.field("registers", &self.registers);
        s.finish()
    }
}

impl core::fmt::Display for Exception {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.code() {
            ExceptionCode::Invalid if self.code != 0 => {
                write!(f, "unknown exception {:#010x}", self.code)
            }
            code => write!(f, "{}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Exception {}

/// ============================================================================
/// Tests
/// ============================================================================
