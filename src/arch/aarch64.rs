// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 register snapshot
//!
//! Canonical order: X0..X28, FP (X29), LR (X30), SP, PC.

use super::ProcessorContext;
use crate::registers::{Registers, NUM_REGISTERS};

/// Number of general purpose registers X0..X30
const ARM64_GPR_COUNT: usize = 31;

const SP_SLOT: usize = 31;
const PC_SLOT: usize = 32;

/// Assemble the canonical order from X0..X30, SP and PC
fn assemble(x: &[u64; ARM64_GPR_COUNT], sp: u64, pc: u64) -> Registers {
    let mut list = [0usize; NUM_REGISTERS];
    for (slot, &value) in list.iter_mut().zip(x.iter()) {
        *slot = value as usize;
    }
    list[SP_SLOT] = sp as usize;
    list[PC_SLOT] = pc as usize;
    Registers::from_list(list)
}

// ============================================================================
// Linux / Android
// ============================================================================

#[cfg(any(target_os = "linux", target_os = "android"))]
impl ProcessorContext for libc::ucontext_t {
    fn program_counter(&self) -> usize {
        self.uc_mcontext.pc as usize
    }

    fn build_registers(&self) -> Registers {
        let mc = &self.uc_mcontext;
        let mut x = [0u64; ARM64_GPR_COUNT];
        for (dst, &src) in x.iter_mut().zip(mc.regs.iter()) {
            *dst = src as u64;
        }
        assemble(&x, mc.sp as u64, mc.pc as u64)
    }
}

// ============================================================================
// macOS
// ============================================================================

#[cfg(target_os = "macos")]
impl ProcessorContext for libc::ucontext_t {
    fn program_counter(&self) -> usize {
        // SAFETY: a delivered ucontext points at its own machine context
        unsafe { (*self.uc_mcontext).__ss.__pc as usize }
    }

    fn build_registers(&self) -> Registers {
        // SAFETY: as above
        let ss = unsafe { &(*self.uc_mcontext).__ss };
        let mut x = [0u64; ARM64_GPR_COUNT];
        x[..29].copy_from_slice(&ss.__x);
        x[29] = ss.__fp;
        x[30] = ss.__lr;
        assemble(&x, ss.__sp, ss.__pc)
    }
}

// ============================================================================
// Windows
// ============================================================================

#[cfg(windows)]
impl ProcessorContext for winapi::um::winnt::CONTEXT {
    fn program_counter(&self) -> usize {
        self.Pc as usize
    }

    fn build_registers(&self) -> Registers {
        // SAFETY: both union views cover the same X0..X30 storage
        let x = unsafe { self.u.X() };
        assemble(x, self.Sp, self.Pc)
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_order() {
        let mut x = [0u64; ARM64_GPR_COUNT];
        for (i, v) in x.iter_mut().enumerate() {
            *v = 0x100 + i as u64;
        }

        let regs = assemble(&x, 0x7fff_0000, 0x4000_1000);
        assert_eq!(regs.x0(), 0x100);
        assert_eq!(regs.x28(), 0x11c);
        assert_eq!(regs.fp(), 0x11d);
        assert_eq!(regs.lr(), 0x11e);
        assert_eq!(regs.sp(), 0x7fff_0000);
        assert_eq!(regs.pc(), 0x4000_1000);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_ucontext_order() {
        // SAFETY: ucontext_t is plain data; all-zero is a valid value
        let mut uc: libc::ucontext_t = unsafe { core::mem::zeroed() };
        uc.uc_mcontext.regs[0] = 0xbadc0debabefffff;
        uc.uc_mcontext.regs[29] = 0x29;
        uc.uc_mcontext.regs[30] = 0x30;
        uc.uc_mcontext.sp = 0x5000;
        uc.uc_mcontext.pc = 0x6000;

        let regs = uc.build_registers();
        assert_eq!(regs.x0(), 0xbadc0debabefffff);
        assert_eq!(regs.fp(), 0x29);
        assert_eq!(regs.lr(), 0x30);
        assert_eq!(regs.sp(), 0x5000);
        assert_eq!(regs.pc(), 0x6000);
        assert_eq!(uc.program_counter(), 0x6000);
    }
}
