// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Windows Fault Supervision
//!
//! The `__except` filter in the C stub calls [`trapguard_capture`] while
//! the faulting frame is still intact, then the stub returns
//! `TG_CATCHED`. Structured exception handling is always available, so
//! installation has nothing to do.

use core::ffi::c_void;

use winapi::um::winnt::EXCEPTION_POINTERS;

use super::{InstallError, TrapProc};
use crate::exception::Exception;

#[cfg(trapguard_registers)]
use crate::arch;
#[cfg(trapguard_registers)]
use crate::registers::Registers;

/// Filter result: run the `__except` block
const EXCEPTION_EXECUTE_HANDLER: i32 = 1;

extern "C" {
    fn trapguard_handler_stub(
        proc_: TrapProc,
        closure: *mut c_void,
        exception: *mut Exception,
    ) -> u32;
}

/// `__except` filter: record the fault and take the handler
///
/// # Safety
///
/// `pointers` is what `GetExceptionInformation()` returned; `exception` is
/// the descriptor passed to the stub (null or writable).
#[no_mangle]
pub unsafe extern "C" fn trapguard_capture(
    code: u32,
    pointers: *mut EXCEPTION_POINTERS,
    exception: *mut c_void,
) -> i32 {
    let Some(exception) = exception.cast::<Exception>().as_mut() else {
        return EXCEPTION_EXECUTE_HANDLER;
    };

    let pointers = pointers.as_ref();
    let address = pointers
        .and_then(|pointers| pointers.ExceptionRecord.as_ref())
        .map_or(core::ptr::null_mut(), |record| record.ExceptionAddress.cast::<c_void>());

    #[cfg(trapguard_registers)]
    {
        let registers = pointers
            .and_then(|pointers| pointers.ContextRecord.as_ref())
            .map_or_else(Registers::empty, arch::build_registers);
        exception.record(code, address, registers);
    }
    #[cfg(not(trapguard_registers))]
    exception.record(code, address);

    EXCEPTION_EXECUTE_HANDLER
}

/// Structured exception handling needs no setup
pub fn install() -> Result<(), InstallError> {
    Ok(())
}

/// Run `proc_(closure)` inside `__try`
pub(super) unsafe fn handler_stub(
    proc_: TrapProc,
    closure: *mut c_void,
    exception: *mut Exception,
) -> u32 {
    trapguard_handler_stub(proc_, closure, exception)
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::ExceptionCode;
    use core::{mem, ptr};
    use winapi::um::winnt::{CONTEXT, EXCEPTION_RECORD};

    #[test]
    fn test_capture_fills_descriptor() {
        // SAFETY: both records are plain data; all-zero is a valid value
        let mut record: EXCEPTION_RECORD = unsafe { mem::zeroed() };
        let mut context: CONTEXT = unsafe { mem::zeroed() };
        record.ExceptionCode = ExceptionCode::IntDivideByZero.raw();
        record.ExceptionAddress = 0x1000 as _;
        let mut pointers = EXCEPTION_POINTERS {
            ExceptionRecord: &mut record,
            ContextRecord: &mut context,
        };

        let mut exception = Exception::empty();
        let filter = unsafe {
            trapguard_capture(
                record.ExceptionCode,
                &mut pointers,
                (&mut exception as *mut Exception).cast(),
            )
        };

        assert_eq!(filter, EXCEPTION_EXECUTE_HANDLER);
        assert_eq!(exception.code(), ExceptionCode::IntDivideByZero);
        assert_eq!(exception.address() as usize, 0x1000);
    }

    #[test]
    fn test_capture_without_descriptor() {
        let filter = unsafe { trapguard_capture(0xC0000005, ptr::null_mut(), ptr::null_mut()) };
        assert_eq!(filter, EXCEPTION_EXECUTE_HANDLER);
    }
}
