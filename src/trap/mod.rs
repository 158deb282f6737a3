// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Exception Trap
//!
//! Runs a callback inside a scoped fault supervision region. If the
//! callback faults, the fault is captured into an [`Exception`] and the
//! call returns normally instead of terminating the process.
//!
//! # Backends
//!
//! - **windows** (MSVC): `__try`/`__except` in `src/stub/windows.c`.
//! - **posix** (Linux, Android, macOS): signal handlers plus
//!   `sigsetjmp`/`siglongjmp` in `src/stub/posix.c`.
//!
//! Other targets build without a backend; see [`is_supported`].
//!
//! # State machine
//!
//! Each invocation goes `Idle -> Running -> {Completed | Faulted}` and
//! shares no state with other invocations. Supervision covers only the
//! dynamic extent of the callback.

use core::ffi::c_void;

use crate::exception::Exception;

#[cfg(trapguard_backend = "posix")]
mod posix;
#[cfg(trapguard_backend = "posix")]
use posix as backend;

#[cfg(trapguard_backend = "windows")]
mod windows;
#[cfg(trapguard_backend = "windows")]
use windows as backend;

#[cfg(not(any(trapguard_backend = "posix", trapguard_backend = "windows")))]
mod unsupported;
#[cfg(not(any(trapguard_backend = "posix", trapguard_backend = "windows")))]
use unsupported as backend;

/// Callback run inside the supervised region
///
/// The argument is passed through unmodified. The trap never owns it.
pub type TrapProc = unsafe extern "C" fn(argument: *mut c_void);

/// Stub status: callback returned normally
pub(crate) const TG_SUCCEEDED: u32 = 0x0;
/// Stub status: a fault was captured
pub(crate) const TG_CATCHED: u32 = 0x1;
/// Stub status: no supervision available, callback was not run
pub(crate) const TG_DISABLED: u32 = 0x2;

/// Error returned when fault handlers cannot be installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallError {
    /// This build has no fault supervision backend
    Unsupported,

    /// `sigaction` rejected the handler for this signal
    Signal(i32),
}

impl core::fmt::Display for InstallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InstallError::Unsupported => {
                write!(f, "fault supervision is not supported on this target")
            }
            InstallError::Signal(signal) => {
                write!(f, "failed to install the fault handler for signal {}", signal)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InstallError {}

/// Whether fault supervision is compiled into this build
pub const fn is_supported() -> bool {
    cfg!(any(trapguard_backend = "posix", trapguard_backend = "windows"))
}

/// Install the process-wide fault handlers
///
/// Called lazily by every trap; calling it up front only moves the cost
/// (and any logging) out of the first trap. Idempotent.
pub fn install() -> Result<(), InstallError> {
    backend::install()
}

/// Run `callback(argument)` under fault supervision
///
/// Returns `true` if the callback returned normally; `exception` is left
/// untouched. Returns `false` if the callback faulted; `exception`, when
/// not null, then holds the fault code, faulting instruction address and
/// register snapshot.
///
/// If supervision is unavailable (no backend, or the handlers could not
/// be installed) the callback still runs exactly once, unsupervised.
///
/// # Safety
///
/// - `callback` must be safe to call with `argument`.
/// - `exception` must be null or valid for writes.
/// - If a fault occurs, the frames between this call and the fault are
///   abandoned without running destructors.
#[export_name = "trapguard_trap"]
pub unsafe extern "C" fn trap(
    callback: TrapProc,
    argument: *mut c_void,
    exception: *mut Exception,
) -> bool {
    match backend::handler_stub(callback, argument, exception) {
        TG_CATCHED => false,
        TG_DISABLED => {
            callback(argument);
            true
        }
        status => {
            debug_assert_eq!(status, TG_SUCCEEDED);
            true
        }
    }
}

/// Closure plus the panic it raised, if any
struct Guarded<F> {
    closure: F,
    #[cfg(feature = "std")]
    panic: Option<std::boxed::Box<dyn core::any::Any + Send + 'static>>,
}

unsafe extern "C" fn handled_proc<F>(guarded: *mut c_void)
where
    F: FnMut(),
{
    let Some(guarded) = guarded.cast::<Guarded<F>>().as_mut() else {
        return;
    };

    // A panic must not unwind through the C stub
    #[cfg(feature = "std")]
    {
        let closure = &mut guarded.closure;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| closure()));
        if let Err(payload) = result {
            guarded.panic = Some(payload);
        }
    }

    #[cfg(not(feature = "std"))]
    (guarded.closure)();
}

/// Executes the provided closure in a context where hardware exceptions
/// are caught.
///
/// # Returns
///
/// * `Ok(())` - The closure returned without faulting.
/// * `Err(Exception)` - The closure faulted; see [`Exception`].
///
/// # Examples
///
/// ```
/// # if !trapguard::is_supported() { return; }
/// if let Err(e) = trapguard::run_guarded(|| unsafe {
///     core::ptr::read_volatile(core::mem::align_of::<i32>() as *const i32);
/// }) {
///     println!("an exception occurred: {:?}", e);
/// }
/// ```
///
/// # Caveats
///
/// If the closure faults, values owned by frames inside the closure are
/// not dropped. Create resources that need `Drop` outside the closure.
///
/// A panic inside the closure is resumed after the trap returns when the
/// `std` feature is enabled; without it, such a panic aborts.
///
/// # Panics
///
/// If this build has no fault supervision backend (see [`is_supported`])
/// or the fault handlers could not be installed.
pub fn run_guarded<F>(closure: F) -> Result<(), Exception>
where
    F: FnMut(),
{
    let mut exception = Exception::empty();
    let mut guarded = Guarded {
        closure,
        #[cfg(feature = "std")]
        panic: None,
    };
    let argument = (&mut guarded as *mut Guarded<F>).cast::<c_void>();

    // SAFETY: handled_proc::<F> matches the type behind `argument`, and
    // both pointers outlive the call.
    let status = unsafe { backend::handler_stub(handled_proc::<F>, argument, &mut exception) };

    #[cfg(feature = "std")]
    if let Some(payload) = guarded.panic.take() {
        std::panic::resume_unwind(payload);
    }

    match status {
        TG_CATCHED => Err(exception),
        TG_DISABLED => match install() {
            Err(err) => panic!("trapguard: {}", err),
            Ok(()) => panic!("trapguard: fault supervision is unavailable"),
        },
        _ => Ok(()),
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(all(test, any(trapguard_backend = "posix", trapguard_backend = "windows")))]
mod tests {
    use super::*;
    use crate::code::ExceptionCode;
    use core::ptr;

    const INVALID_PTR: *mut i32 = core::mem::align_of::<i32>() as _;

    unsafe extern "C" fn faulting_proc(_argument: *mut c_void) {
        INVALID_PTR.read_volatile();
    }

    unsafe extern "C" fn counting_proc(argument: *mut c_void) {
        *argument.cast::<u32>() += 1;
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported());
        assert_eq!(install(), Ok(()));
        assert_eq!(install(), Ok(()));
    }

    #[test]
    fn test_trap_success_leaves_descriptor_untouched() {
        let mut exception = Exception::empty();
        #[cfg(trapguard_registers)]
        exception.record(0x1234_5678, 0x42 as *mut c_void, crate::Registers::from_list(
            [0x5a; crate::registers::NUM_REGISTERS],
        ));
        #[cfg(not(trapguard_registers))]
        exception.record(0x1234_5678, 0x42 as *mut c_void);
        let before = exception;

        let mut count = 0u32;
        let ok = unsafe { trap(counting_proc, (&mut count as *mut u32).cast(), &mut exception) };

        assert!(ok);
        assert_eq!(count, 1);
        assert_eq!(exception, before);
    }

    #[test]
    fn test_trap_passes_argument_through() {
        let mut count = 41u32;
        let argument = (&mut count as *mut u32).cast::<c_void>();

        assert!(unsafe { trap(counting_proc, argument, ptr::null_mut()) });
        assert_eq!(count, 42);
    }

    #[test]
    fn test_trap_fault_fills_descriptor() {
        let mut exception = Exception::empty();
        let ok = unsafe { trap(faulting_proc, ptr::null_mut(), &mut exception) };

        assert!(!ok);
        assert_eq!(exception.code(), ExceptionCode::AccessViolation);
        assert_eq!(exception.raw_code(), 0xC0000005);
    }

    #[test]
    fn test_trap_fault_without_descriptor() {
        let ok = unsafe { trap(faulting_proc, ptr::null_mut(), ptr::null_mut()) };
        assert!(!ok);
    }

    #[test]
    fn test_fault_address_inside_faulting_function() {
        let mut exception = Exception::empty();
        let ok = unsafe { trap(faulting_proc, ptr::null_mut(), &mut exception) };
        assert!(!ok);

        let start = faulting_proc as *const () as usize;
        let address = exception.address() as usize;
        assert!(
            address >= start && address < start + 0x200,
            "fault at {:#x}, function at {:#x}",
            address,
            start
        );
    }

    #[test]
    fn test_sequential_traps_are_independent() {
        assert_eq!(run_guarded(|| {}), Ok(()));
        assert_eq!(run_guarded(|| {}), Ok(()));

        let first = run_guarded(|| unsafe {
            INVALID_PTR.read_volatile();
        });
        assert!(first.is_err());

        let mut ran = false;
        assert_eq!(run_guarded(|| ran = true), Ok(()));
        assert!(ran);
    }

    #[test]
    fn test_nested_traps() {
        let mut inner = None;
        let outer = run_guarded(|| {
            inner = Some(run_guarded(|| unsafe {
                INVALID_PTR.read_volatile();
            }));
        });

        assert_eq!(outer, Ok(()));
        let inner = inner.expect("inner trap ran");
        assert_eq!(inner.unwrap_err().code(), ExceptionCode::AccessViolation);
    }

    #[test]
    fn test_fault_after_nested_success_reaches_outer() {
        let result = run_guarded(|| {
            assert_eq!(run_guarded(|| {}), Ok(()));
            unsafe {
                INVALID_PTR.read_volatile();
            }
        });

        assert_eq!(result.unwrap_err().code(), ExceptionCode::AccessViolation);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_panic_is_resumed_outside_trap() {
        let caught = std::panic::catch_unwind(|| {
            let _ = run_guarded(|| panic!("boom"));
        });
        assert!(caught.is_err());

        // The frame chain is intact afterwards
        let result = run_guarded(|| unsafe {
            INVALID_PTR.read_volatile();
        });
        assert_eq!(result.unwrap_err().code(), ExceptionCode::AccessViolation);
    }
}
