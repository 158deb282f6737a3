// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! POSIX Fault Supervision
//!
//! Synchronous fault signals are caught by [`fault_handler`]. When the
//! faulting thread is inside a trap, the handler fills that trap's
//! descriptor and jumps back into the C stub. Otherwise the signal is
//! handed to whatever action was installed before us.
//!
//! Everything reachable from the handler is async-signal-safe: no
//! allocation, no locks, no logging. The frame chain uses initial-exec
//! TLS so reading it never goes through `__tls_get_addr`, including when
//! the crate is loaded with `dlopen`.

use core::ffi::c_void;
use core::{mem, ptr};

use libc::{c_int, siginfo_t};
use spin::Once;

use super::{InstallError, TrapProc, TG_DISABLED};
use crate::code::ExceptionCode;
use crate::debug::{log_debug, log_warn};
use crate::exception::Exception;

#[cfg(trapguard_registers)]
use crate::arch::{self, NativeContext, ProcessorContext};
#[cfg(trapguard_registers)]
use crate::registers::Registers;

extern "C" {
    fn trapguard_handler_stub(
        proc_: TrapProc,
        closure: *mut c_void,
        exception: *mut Exception,
    ) -> u32;
    fn trapguard_current_frame(exception: *mut *mut Exception) -> c_int;
    fn trapguard_resume() -> !;
}

/// Signals that report a synchronous fault of the running thread
const FAULT_SIGNALS: [c_int; 5] = [
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGILL,
    libc::SIGFPE,
    libc::SIGTRAP,
];

/// Actions replaced by ours, indexed like `FAULT_SIGNALS`
type PreviousActions = [libc::sigaction; FAULT_SIGNALS.len()];

static HANDLERS: Once<Result<PreviousActions, InstallError>> = Once::new();

// ============================================================================
// si_code values
// ============================================================================

#[cfg(any(target_os = "linux", target_os = "android"))]
mod si_code {
    use libc::c_int;

    pub use libc::{BUS_ADRALN, TRAP_HWBKPT, TRAP_TRACE};

    // Not exported by libc on linux_like
    pub const ILL_PRVOPC: c_int = 5;
    pub const ILL_PRVREG: c_int = 6;

    pub const FPE_INTDIV: c_int = 1;
    pub const FPE_INTOVF: c_int = 2;
    pub const FPE_FLTDIV: c_int = 3;
    pub const FPE_FLTOVF: c_int = 4;
    pub const FPE_FLTUND: c_int = 5;
    pub const FPE_FLTRES: c_int = 6;
    pub const FPE_FLTINV: c_int = 7;
    pub const FPE_FLTSUB: c_int = 8;

    pub const SINGLE_STEP: &[c_int] = &[TRAP_TRACE, TRAP_HWBKPT];
}

#[cfg(target_os = "macos")]
mod si_code {
    use libc::c_int;

    pub const BUS_ADRALN: c_int = 1;

    pub const ILL_PRVOPC: c_int = 3;
    pub const ILL_PRVREG: c_int = 6;

    pub const FPE_FLTDIV: c_int = 1;
    pub const FPE_FLTOVF: c_int = 2;
    pub const FPE_FLTUND: c_int = 3;
    pub const FPE_FLTRES: c_int = 4;
    pub const FPE_FLTINV: c_int = 5;
    pub const FPE_FLTSUB: c_int = 6;
    pub const FPE_INTDIV: c_int = 7;
    pub const FPE_INTOVF: c_int = 8;

    pub const TRAP_TRACE: c_int = 2;

    pub const SINGLE_STEP: &[c_int] = &[TRAP_TRACE];
}

/// Map a fault signal and its `si_code` onto the exception catalogue
pub(crate) fn translate(signal: c_int, code: c_int) -> ExceptionCode {
    use si_code::*;

    match signal {
        libc::SIGSEGV => ExceptionCode::AccessViolation,
        libc::SIGBUS => match code {
            BUS_ADRALN => ExceptionCode::DataTypeMisalignment,
            _ => ExceptionCode::InPageError,
        },
        libc::SIGILL => match code {
            ILL_PRVOPC | ILL_PRVREG => ExceptionCode::PrivilegedInstruction,
            _ => ExceptionCode::IllegalInstruction,
        },
        libc::SIGFPE => match code {
            FPE_INTDIV => ExceptionCode::IntDivideByZero,
            FPE_INTOVF => ExceptionCode::IntOverflow,
            FPE_FLTDIV => ExceptionCode::FltDivideByZero,
            FPE_FLTOVF => ExceptionCode::FltOverflow,
            FPE_FLTUND => ExceptionCode::FltUnderflow,
            FPE_FLTRES => ExceptionCode::FltInexactResult,
            FPE_FLTSUB => ExceptionCode::ArrayBoundsExceeded,
            FPE_FLTINV => ExceptionCode::FltInvalidOperation,
            _ => ExceptionCode::FltInvalidOperation,
        },
        libc::SIGTRAP if SINGLE_STEP.contains(&code) => ExceptionCode::SingleStep,
        libc::SIGTRAP => ExceptionCode::Breakpoint,
        _ => ExceptionCode::Invalid,
    }
}

// ============================================================================
// Installation
// ============================================================================

/// Install the fault handlers once per process
pub fn install() -> Result<(), InstallError> {
    match HANDLERS.call_once(install_handlers) {
        Ok(_) => Ok(()),
        Err(err) => Err(*err),
    }
}

fn install_handlers() -> Result<PreviousActions, InstallError> {
    // SAFETY: sigaction is plain data; all-zero is a valid value
    let mut previous: PreviousActions = unsafe { mem::zeroed() };
    let mut action: libc::sigaction = unsafe { mem::zeroed() };

    action.sa_sigaction =
        fault_handler as extern "C" fn(c_int, *mut siginfo_t, *mut c_void) as libc::sighandler_t;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
    // SAFETY: sa_mask is a valid, owned sigset_t
    unsafe { libc::sigemptyset(&mut action.sa_mask) };

    for (index, &signal) in FAULT_SIGNALS.iter().enumerate() {
        // SAFETY: both pointers are valid for the duration of the call
        if unsafe { libc::sigaction(signal, &action, &mut previous[index]) } != 0 {
            log_warn!("sigaction({}) failed, restoring previous handlers", signal);

            for (&installed, old) in FAULT_SIGNALS[..index].iter().zip(previous.iter()) {
                // SAFETY: `old` was filled by the successful call above
                unsafe { libc::sigaction(installed, old, ptr::null_mut()) };
            }
            return Err(InstallError::Signal(signal));
        }
    }

    log_debug!("fault handlers installed for {} signals", FAULT_SIGNALS.len());
    Ok(previous)
}

// ============================================================================
// Signal path
// ============================================================================

extern "C" fn fault_handler(signal: c_int, info: *mut siginfo_t, context: *mut c_void) {
    let mut exception: *mut Exception = ptr::null_mut();

    // SAFETY: only reads this thread's frame chain
    if unsafe { trapguard_current_frame(&mut exception) } == 0 {
        // SAFETY: arguments are exactly what the kernel delivered
        unsafe { forward(signal, info, context) };
        return;
    }

    // SAFETY: the innermost trap owns `exception`, null or writable
    if let Some(exception) = unsafe { exception.as_mut() } {
        unsafe { capture(exception, signal, info, context) };
    }

    // SAFETY: a frame is active on this thread
    unsafe { trapguard_resume() }
}

/// Fill the descriptor from the delivered signal
unsafe fn capture(
    exception: &mut Exception,
    signal: c_int,
    info: *const siginfo_t,
    context: *const c_void,
) {
    let si_code = info.as_ref().map_or(0, |info| info.si_code);
    let code = translate(signal, si_code);

    #[cfg(trapguard_registers)]
    {
        if let Some(context) = context.cast::<NativeContext>().as_ref() {
            let mut registers = arch::build_registers(context);
            let mut address = context.program_counter();

            // The kernel reports int3 with the PC already past it
            if cfg!(any(target_arch = "x86", target_arch = "x86_64"))
                && code == ExceptionCode::Breakpoint
                && si_code > 0
            {
                address = address.wrapping_sub(1);
                registers = with_program_counter(&registers, address);
            }

            exception.record(code.raw(), address as *mut c_void, registers);
            return;
        }
    }

    #[cfg(not(trapguard_registers))]
    let _ = context;

    // No processor context: only some signals name the instruction
    let address = instruction_address(signal, info);

    #[cfg(trapguard_registers)]
    exception.record(code.raw(), address, Registers::empty());
    #[cfg(not(trapguard_registers))]
    exception.record(code.raw(), address);
}

#[cfg(trapguard_registers)]
fn with_program_counter(registers: &Registers, pc: usize) -> Registers {
    use crate::registers::NUM_REGISTERS;

    let mut list = [0usize; NUM_REGISTERS];
    list.copy_from_slice(registers.list());
    list[NUM_REGISTERS - 1] = pc;
    Registers::from_list(list)
}

/// Faulting instruction address from `si_addr`, or null
///
/// `si_addr` is the instruction for SIGILL, SIGFPE and SIGTRAP. For
/// SIGSEGV and SIGBUS it is the data address that was accessed, which
/// must not be reported as the instruction.
unsafe fn instruction_address(signal: c_int, info: *const siginfo_t) -> *mut c_void {
    if !matches!(signal, libc::SIGILL | libc::SIGFPE | libc::SIGTRAP) {
        return ptr::null_mut();
    }
    let Some(info) = info.as_ref() else {
        return ptr::null_mut();
    };

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        info.si_addr()
    }
    #[cfg(target_os = "macos")]
    {
        info.si_addr
    }
}

/// Hand a fault outside any trap to the action we replaced
unsafe fn forward(signal: c_int, info: *mut siginfo_t, context: *mut c_void) {
    let previous = match HANDLERS.get() {
        Some(Ok(actions)) => FAULT_SIGNALS
            .iter()
            .position(|&s| s == signal)
            .map(|index| &actions[index]),
        _ => None,
    };

    match previous {
        Some(action) if action.sa_sigaction != libc::SIG_DFL && action.sa_sigaction != libc::SIG_IGN => {
            if action.sa_flags & libc::SA_SIGINFO != 0 {
                let handler: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) =
                    mem::transmute(action.sa_sigaction);
                handler(signal, info, context);
            } else {
                let handler: extern "C" fn(c_int) = mem::transmute(action.sa_sigaction);
                handler(signal);
            }
        }
        _ => {
            // Terminate the way the signal would have without us
            let mut default: libc::sigaction = mem::zeroed();
            default.sa_sigaction = libc::SIG_DFL;
            libc::sigemptyset(&mut default.sa_mask);
            libc::sigaction(signal, &default, ptr::null_mut());
            libc::raise(signal);
        }
    }
}

/// Run `proc_(closure)` inside a trap frame
pub(super) unsafe fn handler_stub(
    proc_: TrapProc,
    closure: *mut c_void,
    exception: *mut Exception,
) -> u32 {
    if install().is_err() {
        return TG_DISABLED;
    }

    trapguard_handler_stub(proc_, closure, exception)
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_segv() {
        assert_eq!(translate(libc::SIGSEGV, 1), ExceptionCode::AccessViolation);
        assert_eq!(translate(libc::SIGSEGV, 2), ExceptionCode::AccessViolation);
    }

    #[test]
    fn test_translate_bus() {
        assert_eq!(
            translate(libc::SIGBUS, si_code::BUS_ADRALN),
            ExceptionCode::DataTypeMisalignment
        );
        assert_eq!(translate(libc::SIGBUS, 0x7f), ExceptionCode::InPageError);
    }

    #[test]
    fn test_translate_ill() {
        assert_eq!(
            translate(libc::SIGILL, si_code::ILL_PRVOPC),
            ExceptionCode::PrivilegedInstruction
        );
        assert_eq!(
            translate(libc::SIGILL, si_code::ILL_PRVREG),
            ExceptionCode::PrivilegedInstruction
        );
        assert_eq!(translate(libc::SIGILL, 0), ExceptionCode::IllegalInstruction);
    }

    #[test]
    fn test_translate_fpe() {
        let cases = [
            (si_code::FPE_INTDIV, ExceptionCode::IntDivideByZero),
            (si_code::FPE_INTOVF, ExceptionCode::IntOverflow),
            (si_code::FPE_FLTDIV, ExceptionCode::FltDivideByZero),
            (si_code::FPE_FLTOVF, ExceptionCode::FltOverflow),
            (si_code::FPE_FLTUND, ExceptionCode::FltUnderflow),
            (si_code::FPE_FLTRES, ExceptionCode::FltInexactResult),
            (si_code::FPE_FLTINV, ExceptionCode::FltInvalidOperation),
            (si_code::FPE_FLTSUB, ExceptionCode::ArrayBoundsExceeded),
            (0x7f, ExceptionCode::FltInvalidOperation),
        ];
        for (code, expected) in cases {
            assert_eq!(translate(libc::SIGFPE, code), expected, "si_code {}", code);
        }
    }

    #[test]
    fn test_translate_trap() {
        assert_eq!(
            translate(libc::SIGTRAP, si_code::TRAP_TRACE),
            ExceptionCode::SingleStep
        );
        assert_eq!(translate(libc::SIGTRAP, 1), ExceptionCode::Breakpoint);
        // Linux reports int3 as SI_KERNEL
        assert_eq!(translate(libc::SIGTRAP, 0x80), ExceptionCode::Breakpoint);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_translate_hardware_breakpoint() {
        assert_eq!(
            translate(libc::SIGTRAP, si_code::TRAP_HWBKPT),
            ExceptionCode::SingleStep
        );
    }

    #[test]
    fn test_translate_unknown_signal() {
        assert_eq!(translate(libc::SIGUSR1, 0), ExceptionCode::Invalid);
    }

    #[test]
    fn test_install_is_idempotent() {
        assert_eq!(install(), Ok(()));
        assert_eq!(install(), Ok(()));
        assert!(matches!(HANDLERS.get(), Some(Ok(_))));
    }

    #[test]
    fn test_no_frame_outside_trap() {
        let mut exception: *mut Exception = ptr::null_mut();
        assert_eq!(unsafe { trapguard_current_frame(&mut exception) }, 0);
        assert!(exception.is_null());
    }

    /// `siginfo_t` with `si_addr` set; the field follows three ints
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn siginfo_with_addr(addr: usize) -> siginfo_t {
        // SAFETY: siginfo_t is plain data; all-zero is a valid value
        let mut info: siginfo_t = unsafe { mem::zeroed() };
        let offset = (3 * mem::size_of::<c_int>()).next_multiple_of(mem::align_of::<usize>());
        unsafe {
            (&mut info as *mut siginfo_t)
                .cast::<u8>()
                .add(offset)
                .cast::<usize>()
                .write_unaligned(addr);
            assert_eq!(info.si_addr() as usize, addr);
        }
        info
    }

    #[test]
    fn test_capture_without_siginfo() {
        let mut exception = Exception::empty();

        unsafe { capture(&mut exception, libc::SIGILL, ptr::null(), ptr::null()) };

        assert_eq!(exception.code(), ExceptionCode::IllegalInstruction);
        assert!(exception.address().is_null());
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_capture_without_context_instruction_signal() {
        let info = siginfo_with_addr(0x4000_1234);
        let mut exception = Exception::empty();

        unsafe { capture(&mut exception, libc::SIGILL, &info, ptr::null()) };

        assert_eq!(exception.code(), ExceptionCode::IllegalInstruction);
        assert_eq!(exception.address() as usize, 0x4000_1234);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_capture_without_context_ignores_data_address() {
        let mut exception = Exception::empty();

        // si_addr is the accessed data for SIGSEGV and SIGBUS
        let info = siginfo_with_addr(0x8);
        unsafe { capture(&mut exception, libc::SIGSEGV, &info, ptr::null()) };
        assert_eq!(exception.code(), ExceptionCode::AccessViolation);
        assert!(exception.address().is_null());

        let info = siginfo_with_addr(0xdead_0000);
        unsafe { capture(&mut exception, libc::SIGBUS, &info, ptr::null()) };
        assert_eq!(exception.code(), ExceptionCode::InPageError);
        assert!(exception.address().is_null());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_fault_outside_trap_keeps_default_action() {
        assert_eq!(install(), Ok(()));

        // SAFETY: the child only faults or calls _exit
        let pid = unsafe { libc::fork() };
        assert!(pid >= 0, "fork failed");
        if pid == 0 {
            unsafe {
                (8 as *const u32).read_volatile();
                libc::_exit(0);
            }
        }

        let mut status = 0;
        assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);
        assert!(libc::WIFSIGNALED(status), "child exited with status {:#x}", status);
        assert_eq!(libc::WTERMSIG(status), libc::SIGSEGV);
    }
}
