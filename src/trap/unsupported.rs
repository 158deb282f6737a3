// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Fallback for targets without fault supervision

use core::ffi::c_void;

use super::{InstallError, TrapProc, TG_DISABLED};
use crate::exception::Exception;

pub fn install() -> Result<(), InstallError> {
    Err(InstallError::Unsupported)
}

/// Never runs the callback; the caller decides what to do instead
pub(super) unsafe fn handler_stub(
    _proc: TrapProc,
    _closure: *mut c_void,
    _exception: *mut Exception,
) -> u32 {
    TG_DISABLED
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr;

    unsafe extern "C" fn counting_proc(argument: *mut c_void) {
        *argument.cast::<u32>() += 1;
    }

    #[test]
    fn test_install_reports_unsupported() {
        assert_eq!(install(), Err(InstallError::Unsupported));
        assert!(!crate::is_supported());
    }

    #[test]
    fn test_raw_trap_runs_unsupervised() {
        let mut count = 0u32;
        let argument = (&mut count as *mut u32).cast::<c_void>();

        assert!(unsafe { crate::trap(counting_proc, argument, ptr::null_mut()) });
        assert_eq!(count, 1);
    }

    #[cfg(feature = "std")]
    #[test]
    #[should_panic(expected = "not supported")]
    fn test_run_guarded_panics() {
        let _ = crate::run_guarded(|| {});
    }
}
