//! Build script for trapline-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (1.77.0, for `core::mem::offset_of!`)
//! - Target platform (the process backend is Linux x86-64 only)
//!
//! ## Requirements
//!
//! - **Rust**: 1.77.0 or newer
//! - **Linux**: x86-64 with `ptrace(2)` and `process_vm_readv(2)` (kernel 3.2+)

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    // The register catalog computes `struct user` offsets at compile time
    match rustc_version::version() {
        Ok(rustc_version) => {
            let min_rust_version = rustc_version::Version::new(1, 77, 0);

            if rustc_version < min_rust_version {
                println!(
                    "cargo:warning=trapline-core requires Rust {min_rust_version} or newer, found {rustc_version}"
                );
            }
        }
        Err(_) => {
            // Some build environments hide rustc; keep going
            println!("cargo:warning=could not verify Rust version");
        }
    }

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if target_os != "linux" || target_arch != "x86_64" {
        println!(
            "cargo:warning=trapline-core only controls processes on linux/x86_64 (building for {target_os}/{target_arch}); \
             the process backend is disabled"
        );
    }
}
