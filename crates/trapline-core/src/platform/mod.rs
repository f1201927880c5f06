//! # Platform-Specific Implementations
//!
//! This module contains the operating-system backend that actually controls
//! processes.
//!
//! - **Linux x86-64**: `ptrace(2)`, `waitpid(2)` and `process_vm_readv(2)`
//!   - See: [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//!
//! Everything outside this module (addresses, stop reasons, breakpoint
//! bookkeeping) is plain data and compiles on any target.

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod linux;
