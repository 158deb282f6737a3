// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! trapguard
//!
//! Runs native callbacks under OS fault supervision. A callback that
//! faults (bad memory access, illegal instruction, breakpoint, arithmetic
//! trap) does not take the process down; the fault is captured into an
//! [`Exception`] carrying the fault code, the faulting instruction address
//! and a snapshot of the general purpose registers.
//!
//! Two entry points share one mechanism:
//!
//! - [`trap`]: raw C ABI (`trapguard_trap`) taking a callback, an opaque
//!   argument and a caller-owned descriptor.
//! - [`run_guarded`] / [`run_guarded!`]: closure form for Rust callers.
//!
//! ```
//! # if !trapguard::is_supported() { return; }
//! let result = trapguard::run_guarded(|| unsafe {
//!     core::ptr::read_volatile(core::mem::align_of::<u64>() as *const u64);
//! });
//! assert_eq!(result.unwrap_err().code(), trapguard::ExceptionCode::AccessViolation);
//! ```
//!
//! # Features
//!
//! - `std` (default): `std::error::Error` impls and panic propagation out
//!   of [`run_guarded`].
//! - `log` / `logging` (default): diagnostics through the `log` facade.

#![cfg_attr(not(feature = "std"), no_std)]

mod debug;

pub mod code;
pub mod exception;
pub mod trap;

#[cfg(trapguard_registers)]
pub mod arch;
#[cfg(trapguard_registers)]
pub mod registers;

pub use code::ExceptionCode;
pub use exception::Exception;
#[cfg(trapguard_registers)]
pub use registers::{Registers, NUM_REGISTERS};
pub use trap::{install, is_supported, run_guarded, trap, InstallError, TrapProc};

/// Run a block under fault supervision and return early on a fault
///
/// Expands to `run_guarded(|| block)?`, so the enclosing function must
/// return a `Result` whose error type converts from [`Exception`].
///
/// ```
/// # if !trapguard::is_supported() { return; }
/// fn probe(ptr: *const u8) -> Result<u8, trapguard::Exception> {
///     let mut value = 0;
///     trapguard::run_guarded!({
///         value = unsafe { ptr.read_volatile() };
///     });
///     Ok(value)
/// }
///
/// assert!(probe(core::ptr::null()).is_err());
/// ```
#[macro_export]
macro_rules! run_guarded {
    ($body:block) => {
        $crate::run_guarded(|| $body)?
    };
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(all(
    test,
    trapguard_registers,
    any(trapguard_backend = "posix", trapguard_backend = "windows")
))]
mod tests {
    use super::*;
    use core::arch::asm;

    const INVALID_PTR: *mut i32 = core::mem::align_of::<i32>() as _;
    const SENTINEL: usize = 0xbadc0debabefffff_u64 as usize;

    /// Fault with `value` in the first canonical register
    #[inline(never)]
    fn fault_with_first_register(value: usize) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            asm!(
                "xor ecx, ecx",
                "mov rcx, qword ptr [rcx]",
                in("rax") value,
                out("rcx") _,
                options(nostack),
            );
        }
        #[cfg(target_arch = "x86")]
        unsafe {
            asm!(
                "xor ecx, ecx",
                "mov ecx, dword ptr [ecx]",
                in("eax") value,
                out("ecx") _,
                options(nostack),
            );
        }
        #[cfg(target_arch = "aarch64")]
        unsafe {
            asm!(
                "mov x1, xzr",
                "ldr x1, [x1]",
                in("x0") value,
                out("x1") _,
                options(nostack),
            );
        }
    }

    #[test]
    fn test_all_good() {
        assert_eq!(run_guarded(|| {}), Ok(()));
    }

    #[test]
    fn test_access_violation_rs() {
        let ex = run_guarded(|| unsafe {
            INVALID_PTR.read_volatile();
        });
        assert_eq!(ex.map_err(|e| e.code()), Err(ExceptionCode::AccessViolation));
    }

    #[test]
    fn test_access_violation_asm() {
        let ex = run_guarded(|| unsafe {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            asm!("mov eax, dword ptr [0]", out("eax") _, options(nostack));
            #[cfg(target_arch = "aarch64")]
            asm!("mov x1, xzr", "ldr x0, [x1]", out("x0") _, out("x1") _, options(nostack));
        });
        assert_eq!(ex.map_err(|e| e.code()), Err(ExceptionCode::AccessViolation));
    }

    #[test]
    fn test_breakpoint() {
        let ex = run_guarded(|| unsafe {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            asm!("int3", options(nostack));
            #[cfg(target_arch = "aarch64")]
            asm!("brk #0", options(nostack));
        })
        .unwrap_err();

        assert_eq!(ex.code(), ExceptionCode::Breakpoint);
        assert_eq!(ex.address() as usize, ex.registers().program_counter());

        // The address names the breakpoint instruction itself
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        assert_eq!(unsafe { *(ex.address() as *const u8) }, 0xcc);
    }

    #[test]
    fn test_illegal_instruction() {
        let ex = run_guarded(|| unsafe {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            asm!("ud2", options(nostack));
            #[cfg(target_arch = "aarch64")]
            asm!("udf #0", options(nostack));
        });
        assert_eq!(ex.map_err(|e| e.code()), Err(ExceptionCode::IllegalInstruction));
    }

    #[test]
    fn test_reg_state_check() {
        let ex = run_guarded(|| fault_with_first_register(SENTINEL)).unwrap_err();

        assert_eq!(ex.code(), ExceptionCode::AccessViolation);
        assert_eq!(ex.registers().list()[0], SENTINEL);
        assert_eq!(ex.registers().len(), NUM_REGISTERS);
    }

    #[test]
    fn test_first_register_small_value() {
        let ex = run_guarded(|| fault_with_first_register(0xDEAD)).unwrap_err();

        assert_eq!(ex.code(), ExceptionCode::AccessViolation);
        assert_eq!(ex.registers().list()[0], 0xDEAD);
        assert_ne!(ex.registers().stack_pointer(), 0);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_address_matches_program_counter() {
        let ex = run_guarded(|| unsafe {
            asm!("lea rax, [rip + 2f]", "2:", "ud2", out("rax") _, options(nostack));
        })
        .unwrap_err();

        assert_eq!(ex.code(), ExceptionCode::IllegalInstruction);
        assert_eq!(ex.address() as usize, ex.registers().rax());
        assert_eq!(ex.address() as usize, ex.registers().rip());
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_address_matches_program_counter() {
        let ex = run_guarded(|| unsafe {
            asm!("adr x0, 2f", "2:", "udf #0", out("x0") _, options(nostack));
        })
        .unwrap_err();

        assert_eq!(ex.code(), ExceptionCode::IllegalInstruction);
        assert_eq!(ex.address() as usize, ex.registers().x0());
        assert_eq!(ex.address() as usize, ex.registers().pc());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_concurrent_traps() {
        let handles: std::vec::Vec<_> = (0..8usize)
            .map(|i| {
                std::thread::spawn(move || {
                    let value = 0x1000 + i;
                    if i % 2 == 0 {
                        run_guarded(|| fault_with_first_register(value))
                            .map(|()| 0)
                            .unwrap_or_else(|ex| ex.registers().list()[0])
                    } else {
                        let mut seen = 0;
                        assert_eq!(run_guarded(|| seen = value), Ok(()));
                        seen
                    }
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), 0x1000 + i);
        }
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_macro_propagates_fault() {
        fn read(ptr: *const i32) -> Result<i32, std::boxed::Box<dyn std::error::Error>> {
            let mut value = 0;
            run_guarded!({
                value = unsafe { ptr.read_volatile() };
            });
            Ok(value)
        }

        let good = 7;
        assert_eq!(read(&good).unwrap(), 7);

        let err = read(INVALID_PTR).unwrap_err();
        let ex = err.downcast_ref::<Exception>().unwrap();
        assert_eq!(ex.code(), ExceptionCode::AccessViolation);
    }
}
