//! # Linux Backend
//!
//! Process control for Linux x86-64.
//!
//! ## Pieces
//!
//! - [`launch`]: `fork` + `PTRACE_TRACEME` + `execvp`, with a close-on-exec
//!   pipe that carries setup failures from the child back to the parent
//! - [`ptrace`]: thin wrappers for the requests `nix` does not cover uniformly
//!   (register sets, `POKEDATA`, `POKEUSER`)
//! - [`debug_registers`]: DR7 slot allocation and encoding
//! - [`tracee`]: register and memory access for one traced pid
//! - [`process`]: the lifecycle state machine tying it all together
//!
//! ## References
//!
//! - [ptrace(2)](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [process_vm_readv(2)](https://man7.org/linux/man-pages/man2/process_vm_readv.2.html)
//! - Intel SDM Vol. 3B, 18.2 "Debug Registers"

pub mod debug_registers;
pub mod launch;
pub mod process;
pub(crate) mod ptrace;
pub(crate) mod tracee;

pub use launch::LaunchOptions;
pub use process::Process;
