//! # Types
//!
//! Platform-agnostic types used throughout the debugger.
//!
//! These types carry no operating-system handles, so breakpoint bookkeeping
//! and stop-reason decoding can be exercised without a live process.

pub mod address;
pub mod memory;
pub mod process;

// Re-export all public types
pub use address::VirtualAddress;
pub use memory::FromMemoryBytes;
pub use process::{ProcessId, ProcessState, StopReason};
