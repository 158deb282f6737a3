// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Logging Support
//!
//! Thin wrappers over the `log` facade. With the `log` feature disabled
//! the macros expand to nothing, so call sites need no `cfg`.
//!
//! Never call these from a signal handler or an SEH filter.

/// Log a debug message
#[cfg(feature = "log")]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        ::log::debug!(target: "trapguard", $($arg)*)
    };
}

/// Log a debug message
#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

/// Log a warning message
#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        ::log::warn!(target: "trapguard", $($arg)*)
    };
}

/// Log a warning message
#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

#[allow(unused_imports)]
pub(crate) use log_debug;
#[allow(unused_imports)]
pub(crate) use log_warn;
