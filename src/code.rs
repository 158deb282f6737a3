// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Fault Codes
//!
//! Fault codes use the Windows `GetExceptionCode` namespace on every
//! target. POSIX backends translate signals into the same values.
//!
//! See: https://learn.microsoft.com/en-us/windows/win32/debug/getexceptioncode

/// Fault code reported by a trapped exception
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    /// No fault was recorded, or the OS code has no variant here
    Invalid = 0x0,
    AccessViolation = 0xC0000005,
    ArrayBoundsExceeded = 0xC000008C,
    Breakpoint = 0x80000003,
    DataTypeMisalignment = 0x80000002,
    FltDenormalOperand = 0xC000008D,
    FltDivideByZero = 0xC000008E,
    FltInexactResult = 0xC000008F,
    FltInvalidOperation = 0xC0000090,
    FltOverflow = 0xC0000091,
    FltStackCheck = 0xC0000092,
    FltUnderflow = 0xC0000093,
    GuardPage = 0x80000001,
    IllegalInstruction = 0xC000001D,
    InPageError = 0xC0000006,
    IntDivideByZero = 0xC0000094,
    IntOverflow = 0xC0000095,
    InvalidDisposition = 0xC0000026,
    InvalidHandle = 0xC0000008,
    NonContinuableException = 0xC0000025,
    PrivilegedInstruction = 0xC0000096,
    SingleStep = 0x80000004,
    StackOverflow = 0xC00000FD,
    UnwindConsolidate = 0x80000029,
}

impl ExceptionCode {
    /// Every known code, in declaration order
    pub const ALL: [ExceptionCode; 24] = [
        ExceptionCode::Invalid,
        ExceptionCode::AccessViolation,
        ExceptionCode::ArrayBoundsExceeded,
        ExceptionCode::Breakpoint,
        ExceptionCode::DataTypeMisalignment,
        ExceptionCode::FltDenormalOperand,
        ExceptionCode::FltDivideByZero,
        ExceptionCode::FltInexactResult,
        ExceptionCode::FltInvalidOperation,
        ExceptionCode::FltOverflow,
        ExceptionCode::FltStackCheck,
        ExceptionCode::FltUnderflow,
        ExceptionCode::GuardPage,
        ExceptionCode::IllegalInstruction,
        ExceptionCode::InPageError,
        ExceptionCode::IntDivideByZero,
        ExceptionCode::IntOverflow,
        ExceptionCode::InvalidDisposition,
        ExceptionCode::InvalidHandle,
        ExceptionCode::NonContinuableException,
        ExceptionCode::PrivilegedInstruction,
        ExceptionCode::SingleStep,
        ExceptionCode::StackOverflow,
        ExceptionCode::UnwindConsolidate,
    ];

    /// Map a raw OS fault code to its variant
    ///
    /// Codes without a variant (e.g. C++ or user-raised exceptions) map
    /// to [`ExceptionCode::Invalid`]; the raw value is still available
    /// through [`crate::Exception::raw_code`].
    pub const fn from_raw(raw: u32) -> Self {
        let mut i = 0;
        while i < Self::ALL.len() {
            if Self::ALL[i] as u32 == raw {
                return Self::ALL[i];
            }
            i += 1;
        }
        ExceptionCode::Invalid
    }

    /// Raw OS value of this code
    #[inline]
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

impl From<ExceptionCode> for u32 {
    fn from(code: ExceptionCode) -> Self {
        code.raw()
    }
}

impl core::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            ExceptionCode::Invalid => "invalid exception",
            ExceptionCode::AccessViolation => "the thread attempted to read from or write to a virtual address for which it does not have access",
            ExceptionCode::ArrayBoundsExceeded => "the thread attempted to access an array element that is out of bounds and the hardware supports bounds checking",
            ExceptionCode::Breakpoint => "a breakpoint was encountered",
            ExceptionCode::DataTypeMisalignment => "the thread attempted to read or write misaligned data on hardware that does not provide alignment",
            ExceptionCode::FltDenormalOperand => "one of the operands in a floating point operation is denormal",
            ExceptionCode::FltDivideByZero => "the thread attempted to divide a floating point value by a floating point divisor of 0",
            ExceptionCode::FltInexactResult => "the result of a floating point operation cannot be represented exactly as a decimal fraction",
            ExceptionCode::FltInvalidOperation => "a floating point exception not covered by any other code occurred",
            ExceptionCode::FltOverflow => "the exponent of a floating point operation is greater than the magnitude allowed by the type",
            ExceptionCode::FltStackCheck => "the stack overflowed or underflowed because of a floating point operation",
            ExceptionCode::FltUnderflow => "the exponent of a floating point operation is less than the magnitude allowed by the type",
            ExceptionCode::GuardPage => "the thread accessed memory allocated with the PAGE_GUARD modifier",
            ExceptionCode::IllegalInstruction => "the thread tried to execute an invalid instruction",
            ExceptionCode::InPageError => "the thread tried to access a page that is not present and the system is unable to load it",
            ExceptionCode::IntDivideByZero => "the thread attempted to divide an integer value by an integer divisor of 0",
            ExceptionCode::IntOverflow => "the result of an integer operation is too large for the destination register",
            ExceptionCode::InvalidDisposition => "an exception handler returned an invalid disposition to the exception dispatcher",
            ExceptionCode::InvalidHandle => "the thread used a handle to a kernel object that was invalid",
            ExceptionCode::NonContinuableException => "the thread attempted to continue execution after a non-continuable exception",
            ExceptionCode::PrivilegedInstruction => "the thread attempted to execute an instruction not allowed in the current processor mode",
            ExceptionCode::SingleStep => "a trace trap or other single instruction mechanism signaled that one instruction was executed",
            ExceptionCode::StackOverflow => "the thread used up its stack",
            ExceptionCode::UnwindConsolidate => "a frame consolidation has been executed",
        };
        f.write_str(text)
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_known_codes() {
        for code in ExceptionCode::ALL {
            assert_eq!(ExceptionCode::from_raw(code.raw()), code);
        }

        assert_eq!(ExceptionCode::from_raw(0xC0000005), ExceptionCode::AccessViolation);
        assert_eq!(ExceptionCode::from_raw(0x80000003), ExceptionCode::Breakpoint);
    }

    #[test]
    fn test_from_raw_unknown_code() {
        // MSVC C++ exception code
        assert_eq!(ExceptionCode::from_raw(0xE06D7363), ExceptionCode::Invalid);
        assert_eq!(ExceptionCode::from_raw(0xFFFF_FFFF), ExceptionCode::Invalid);
    }

    #[test]
    fn test_codes_are_distinct() {
        for (i, a) in ExceptionCode::ALL.iter().enumerate() {
            for b in &ExceptionCode::ALL[i + 1..] {
                assert_ne!(a.raw(), b.raw());
            }
        }
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_display() {
        assert_eq!(ExceptionCode::Breakpoint.to_string(), "a breakpoint was encountered");
        assert_eq!(ExceptionCode::StackOverflow.to_string(), "the thread used up its stack");
    }
}
