// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86_64 register snapshot
//!
//! Canonical order: RAX RCX RDX RBX RSP RBP RSI RDI R8..R15 RIP.

use super::ProcessorContext;
use crate::registers::Registers;

// ============================================================================
// Linux / Android
// ============================================================================

/// `mcontext_t.gregs` slots
#[cfg(any(target_os = "linux", target_os = "android"))]
mod greg {
    pub const R8: usize = libc::REG_R8 as usize;
    pub const R9: usize = libc::REG_R9 as usize;
    pub const R10: usize = libc::REG_R10 as usize;
    pub const R11: usize = libc::REG_R11 as usize;
    pub const R12: usize = libc::REG_R12 as usize;
    pub const R13: usize = libc::REG_R13 as usize;
    pub const R14: usize = libc::REG_R14 as usize;
    pub const R15: usize = libc::REG_R15 as usize;
    pub const RDI: usize = libc::REG_RDI as usize;
    pub const RSI: usize = libc::REG_RSI as usize;
    pub const RBP: usize = libc::REG_RBP as usize;
    pub const RBX: usize = libc::REG_RBX as usize;
    pub const RDX: usize = libc::REG_RDX as usize;
    pub const RAX: usize = libc::REG_RAX as usize;
    pub const RCX: usize = libc::REG_RCX as usize;
    pub const RSP: usize = libc::REG_RSP as usize;
    pub const RIP: usize = libc::REG_RIP as usize;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl ProcessorContext for libc::ucontext_t {
    fn program_counter(&self) -> usize {
        self.uc_mcontext.gregs[greg::RIP] as usize
    }

    fn build_registers(&self) -> Registers {
        let gregs = &self.uc_mcontext.gregs;
        Registers::from_list([
            gregs[greg::RAX] as usize,
            gregs[greg::RCX] as usize,
            gregs[greg::RDX] as usize,
            gregs[greg::RBX] as usize,
            gregs[greg::RSP] as usize,
            gregs[greg::RBP] as usize,
            gregs[greg::RSI] as usize,
            gregs[greg::RDI] as usize,
            gregs[greg::R8] as usize,
            gregs[greg::R9] as usize,
            gregs[greg::R10] as usize,
            gregs[greg::R11] as usize,
            gregs[greg::R12] as usize,
            gregs[greg::R13] as usize,
            gregs[greg::R14] as usize,
            gregs[greg::R15] as usize,
            gregs[greg::RIP] as usize,
        ])
    }
}

// ============================================================================
// macOS
// ============================================================================

#[cfg(target_os = "macos")]
impl ProcessorContext for libc::ucontext_t {
    fn program_counter(&self) -> usize {
        // SAFETY: a delivered ucontext points at its own machine context
        unsafe { (*self.uc_mcontext).__ss.__rip as usize }
    }

    fn build_registers(&self) -> Registers {
        // SAFETY: as above
        let ss = unsafe { &(*self.uc_mcontext).__ss };
        Registers::from_list([
            ss.__rax as usize,
            ss.__rcx as usize,
            ss.__rdx as usize,
            ss.__rbx as usize,
            ss.__rsp as usize,
            ss.__rbp as usize,
            ss.__rsi as usize,
            ss.__rdi as usize,
            ss.__r8 as usize,
            ss.__r9 as usize,
            ss.__r10 as usize,
            ss.__r11 as usize,
            ss.__r12 as usize,
            ss.__r13 as usize,
            ss.__r14 as usize,
            ss.__r15 as usize,
            ss.__rip as usize,
        ])
    }
}

// ============================================================================
// Windows
// ============================================================================

#[cfg(windows)]
impl ProcessorContext for winapi::um::winnt::CONTEXT {
    fn program_counter(&self) -> usize {
        self.Rip as usize
    }

    fn build_registers(&self) -> Registers {
        Registers::from_list([
            self.Rax as usize,
            self.Rcx as usize,
            self.Rdx as usize,
            self.Rbx as usize,
            self.Rsp as usize,
            self.Rbp as usize,
            self.Rsi as usize,
            self.Rdi as usize,
            self.R8 as usize,
            self.R9 as usize,
            self.R10 as usize,
            self.R11 as usize,
            self.R12 as usize,
            self.R13 as usize,
            self.R14 as usize,
            self.R15 as usize,
            self.Rip as usize,
        ])
    }
}

/// ============================================================================
/// Tests
/// ============================================================================
