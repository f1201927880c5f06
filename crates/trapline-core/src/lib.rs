//! # trapline-core
//!
//! Process control and breakpoints for the trapline debugger.
//!
//! This crate provides:
//! - Launching a program under `ptrace`, or attaching to a running one
//! - Resume, single-step and wait, with decoded stop reasons
//! - Register snapshots with typed, catalog-driven access
//! - Memory reads and writes that hide software breakpoints
//! - Software (`int3`) and hardware (debug-register) breakpoints, and data
//!   watchpoints
//! - Name-to-address resolution for ELF images
//!
//! ## Platform Support
//!
//! - **Linux x86-64**: `ptrace(2)` and friends, see [`platform::linux`]
//!
//! Addresses, stop reasons, breakpoint bookkeeping and ELF resolution are
//! plain data and build anywhere; [`Process`] and [`registers`] exist only on
//! Linux x86-64.
//!
//! ## Why unsafe code is needed
//!
//! `fork(2)` and the register-set `ptrace` requests have no safe wrapper: the
//! kernel writes straight into a buffer we hand it. Those calls live in
//! `platform::linux` behind safe functions.

#![allow(unsafe_code)] // fork and raw ptrace register transfers

pub mod breakpoints;
pub mod error;
pub mod platform;
pub mod prelude;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod registers;
pub mod symbols;
pub mod types;

pub use error::{DebuggerError, Result};
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use platform::linux::{LaunchOptions, Process};
