// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Build script for trapguard
//!
//! This build script selects the fault supervision backend for the target
//! and compiles the matching C stub that hosts the guarded call.

use std::env;
use std::path::PathBuf;

fn main() {
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    println!("cargo:rustc-check-cfg=cfg(trapguard_backend, values(\"windows\", \"posix\"))");
    println!("cargo:rustc-check-cfg=cfg(trapguard_registers)");
    println!("cargo:rerun-if-changed=build.rs");

    // Register snapshots exist only where the canonical layout is defined
    if matches!(target_arch.as_str(), "x86" | "x86_64" | "aarch64") {
        println!("cargo:rustc-cfg=trapguard_registers");
    }

    match target_os.as_str() {
        // __try/__except is only understood by MSVC
        "windows" if target_env == "msvc" => build_stub("windows", &[]),
        "linux" | "android" | "macos" => build_stub("posix", &["-fno-omit-frame-pointer"]),
        _ => {
            // No backend: run_guarded panics, the raw trap runs unsupervised
        }
    }
}

fn build_stub(backend: &str, flags: &[&str]) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let source = manifest_dir.join("src/stub").join(format!("{backend}.c"));

    let mut cc_build = cc::Build::new();
    cc_build.file(&source).warnings(true);
    for flag in flags {
        cc_build.flag_if_supported(flag);
    }

    // Compile
    cc_build.compile("trapguard_stub");

    println!("cargo:rustc-cfg=trapguard_backend=\"{backend}\"");
    println!("cargo:rerun-if-changed={}", source.display());
}
