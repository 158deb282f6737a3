// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Register Snapshot
//!
//! Fixed-order array of machine words captured from the processor context
//! of a fault. Consumers rely on positional meaning, so the index to
//! register mapping below is part of the ABI:
//!
//! | Arch    | Count | Order                                              |
//! |---------|-------|----------------------------------------------------|
//! | x86     | 9     | EAX ECX EDX EBX ESP EBP ESI EDI EIP                |
//! | x86_64  | 17    | RAX RCX RDX RBX RSP RBP RSI RDI R8..R15 RIP        |
//! | aarch64 | 33    | X0..X28 FP(X29) LR(X30) SP PC                      |
//!
//! The type only exists on these architectures.

/// Declares the register order for one architecture.
///
/// Each entry names the accessor, the display name and the slot index.
/// Slots must be dense and ascending; this is checked at compile time.
macro_rules! register_layout {
    ($($reg:ident => $name:literal @ $index:literal),+ $(,)?) => {
        /// Number of registers in a snapshot on this architecture
        pub const NUM_REGISTERS: usize = [$($index),+].len();

        const REGISTER_NAMES: [&str; NUM_REGISTERS] = [$($name),+];

        const _: () = {
            let slots: [usize; NUM_REGISTERS] = [$($index),+];
            let mut i = 0;
            while i < NUM_REGISTERS {
                assert!(slots[i] == i, "register slots must be dense and ascending");
                i += 1;
            }
        };

        impl Registers {
            $(
                #[doc = concat!("Value of ", $name, " (slot ", stringify!($index), ")")]
                #[inline]
                pub fn $reg(&self) -> usize {
                    self.list[$index]
                }
            )+
        }
    };
}

/// Register values at the moment of a fault
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registers {
    list: [usize; NUM_REGISTERS],
}

impl Registers {
    /// Register names, indexed like [`Registers::list`]
    pub const NAMES: [&'static str; NUM_REGISTERS] = REGISTER_NAMES;

    /// Snapshot with every register zeroed
    pub const fn empty() -> Self {
        Self {
            list: [0; NUM_REGISTERS],
        }
    }

    /// Build a snapshot from values already in canonical order
    pub const fn from_list(list: [usize; NUM_REGISTERS]) -> Self {
        Self { list }
    }

    /// All register values in canonical order
    pub fn list(&self) -> &[usize] {
        &self.list
    }

    /// Number of registers in the snapshot
    #[inline]
    pub const fn len(&self) -> usize {
        NUM_REGISTERS
    }

    /// Always false
    #[inline]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Value at `index`, if in range
    pub fn get(&self, index: usize) -> Option<usize> {
        self.list.get(index).copied()
    }

    /// Iterate `(name, value)` pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        Self::NAMES.iter().copied().zip(self.list.iter().copied())
    }

    /// Program counter (always the last slot)
    #[inline]
    pub fn program_counter(&self) -> usize {
        self.list[NUM_REGISTERS - 1]
    }

    /// Stack pointer
    #[inline]
    pub fn stack_pointer(&self) -> usize {
        self.list[STACK_POINTER_SLOT]
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::ops::Index<usize> for Registers {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        &self.list[index]
    }
}

impl core::fmt::Display for Registers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i != 0 {
                f.write_str(if i % 4 == 0 { "\n" } else { " " })?;
            }
            write!(f, "{:>3}: {:#0width$x}", name, value, width = 2 + 2 * core::mem::size_of::<usize>())?;
        }
        Ok(())
    }
}

// ============================================================================
// x86
// ============================================================================

#[cfg(target_arch = "x86")]
const STACK_POINTER_SLOT: usize = 4;

#[cfg(target_arch = "x86")]
register_layout! {
    eax => "EAX" @ 0,
    ecx => "ECX" @ 1,
    edx => "EDX" @ 2,
    ebx => "EBX" @ 3,
    esp => "ESP" @ 4,
    ebp => "EBP" @ 5,
    esi => "ESI" @ 6,
    edi => "EDI" @ 7,
    eip => "EIP" @ 8,
}

// ============================================================================
// x86_64
// ============================================================================

#[cfg(target_arch = "x86_64")]
const STACK_POINTER_SLOT: usize = 4;

#[cfg(target_arch = "x86_64")]
register_layout! {
    rax => "RAX" @ 0,
    rcx => "RCX" @ 1,
    rdx => "RDX" @ 2,
    rbx => "RBX" @ 3,
    rsp => "RSP" @ 4,
    rbp => "RBP" @ 5,
    rsi => "RSI" @ 6,
    rdi => "RDI" @ 7,
    r8 => "R8" @ 8,
    r9 => "R9" @ 9,
    r10 => "R10" @ 10,
    r11 => "R11" @ 11,
    r12 => "R12" @ 12,
    r13 => "R13" @ 13,
    r14 => "R14" @ 14,
    r15 => "R15" @ 15,
    rip => "RIP" @ 16,
}

// ============================================================================
// aarch64
// ============================================================================

#[cfg(target_arch = "aarch64")]
const STACK_POINTER_SLOT: usize = 31;

#[cfg(target_arch = "aarch64")]
register_layout! {
    x0 => "X0" @ 0,
    x1 => "X1" @ 1,
    x2 => "X2" @ 2,
    x3 => "X3" @ 3,
    x4 => "X4" @ 4,
    x5 => "X5" @ 5,
    x6 => "X6" @ 6,
    x7 => "X7" @ 7,
    x8 => "X8" @ 8,
    x9 => "X9" @ 9,
    x10 => "X10" @ 10,
    x11 => "X11" @ 11,
    x12 => "X12" @ 12,
    x13 => "X13" @ 13,
    x14 => "X14" @ 14,
    x15 => "X15" @ 15,
    x16 => "X16" @ 16,
    x17 => "X17" @ 17,
    x18 => "X18" @ 18,
    x19 => "X19" @ 19,
    x20 => "X20" @ 20,
    x21 => "X21" @ 21,
    x22 => "X22" @ 22,
    x23 => "X23" @ 23,
    x24 => "X24" @ 24,
    x25 => "X25" @ 25,
    x26 => "X26" @ 26,
    x27 => "X27" @ 27,
    x28 => "X28" @ 28,
    fp => "FP" @ 29,
    lr => "LR" @ 30,
    sp => "SP" @ 31,
    pc => "PC" @ 32,
}

/// ============================================================================
/// Tests
/// ============================================================================
