// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86 register snapshot
//!
//! Canonical order: EAX ECX EDX EBX ESP EBP ESI EDI EIP.

use super::ProcessorContext;
use crate::registers::Registers;

/// `mcontext_t.gregs` slots
#[cfg(any(all(target_os = "linux", target_env = "gnu"), target_os = "android"))]
mod greg {
    pub const EDI: usize = libc::REG_EDI as usize;
    pub const ESI: usize = libc::REG_ESI as usize;
    pub const EBP: usize = libc::REG_EBP as usize;
    pub const ESP: usize = libc::REG_ESP as usize;
    pub const EBX: usize = libc::REG_EBX as usize;
    pub const EDX: usize = libc::REG_EDX as usize;
    pub const ECX: usize = libc::REG_ECX as usize;
    pub const EAX: usize = libc::REG_EAX as usize;
    pub const EIP: usize = libc::REG_EIP as usize;
}

/// musl does not export the slot names (see `<sys/ucontext.h>`)
#[cfg(all(target_os = "linux", not(target_env = "gnu")))]
mod greg {
    pub const EDI: usize = 4;
    pub const ESI: usize = 5;
    pub const EBP: usize = 6;
    pub const ESP: usize = 7;
    pub const EBX: usize = 8;
    pub const EDX: usize = 9;
    pub const ECX: usize = 10;
    pub const EAX: usize = 11;
    pub const EIP: usize = 14;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl ProcessorContext for libc::ucontext_t {
    fn program_counter(&self) -> usize {
        self.uc_mcontext.gregs[greg::EIP] as usize
    }

    fn build_registers(&self) -> Registers {
        let gregs = &self.uc_mcontext.gregs;
        Registers::from_list([
            gregs[greg::EAX] as usize,
            gregs[greg::ECX] as usize,
            gregs[greg::EDX] as usize,
            gregs[greg::EBX] as usize,
            gregs[greg::ESP] as usize,
            gregs[greg::EBP] as usize,
            gregs[greg::ESI] as usize,
            gregs[greg::EDI] as usize,
            gregs[greg::EIP] as usize,
        ])
    }
}

#[cfg(windows)]
impl ProcessorContext for winapi::um::winnt::CONTEXT {
    fn program_counter(&self) -> usize {
        self.Eip as usize
    }

    fn build_registers(&self) -> Registers {
        Registers::from_list([
            self.Eax as usize,
            self.Ecx as usize,
            self.Edx as usize,
            self.Ebx as usize,
            self.Esp as usize,
            self.Ebp as usize,
            self.Esi as usize,
            self.Edi as usize,
            self.Eip as usize,
        ])
    }
}

#[cfg(all(test, any(target_os = "linux", target_os = "android")))]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        // SAFETY: ucontext_t is plain data; all-zero is a valid value
        let mut uc: libc::ucontext_t = unsafe { core::mem::zeroed() };
        let order = [
            greg::EAX, greg::ECX, greg::EDX, greg::EBX, greg::ESP,
            greg::EBP, greg::ESI, greg::EDI, greg::EIP,
        ];
        for (slot, &index) in order.iter().enumerate() {
            uc.uc_mcontext.gregs[index] = 0x100 + slot as i32;
        }

        let regs = uc.build_registers();
        assert_eq!(regs.list(), &[0x100, 0x101, 0x102, 0x103, 0x104, 0x105, 0x106, 0x107, 0x108]);
        assert_eq!(regs.eip(), 0x108);
        assert_eq!(uc.program_counter(), 0x108);
    }
}
