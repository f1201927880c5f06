//! # Error Types
//!
//! General error handling for the debugger.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages. Every fallible operation in the crate returns
//! [`Result`]; nothing in the library panics or prints on failure.

use std::io;

use thiserror::Error;

use crate::types::VirtualAddress;

/// Main error type for debugger operations
///
/// This enum represents all the ways a debugger operation can fail.
///
/// ## Error Categories
///
/// 1. **System errors**: SystemCall, SpawnFailed, AttachFailed, Io
/// 2. **State errors**: NotAttached, NotStopped, AlreadyStopped, ProcessNotRunning, UnexpectedWaitStatus
/// 3. **Breakpoint errors**: DuplicateAddress, NoBreakpoint, BreakpointIdNotFound, NoFreeSlot
/// 4. **Register errors**: RegisterNotFound, SizeMismatch
/// 5. **Memory errors**: MemoryAccess
/// 6. **Input errors**: MalformedInput, InvalidArgument
#[derive(Error, Debug)]
pub enum DebuggerError
{
    /// An operating system call failed
    ///
    /// `errno` is the raw OS error code; the display message includes the
    /// system's description of it.
    #[error("{operation} failed: {}", io::Error::from_raw_os_error(*errno))]
    SystemCall
    {
        /// The system call or logical operation that failed (e.g. `PTRACE_POKEDATA`)
        operation: &'static str,
        /// Raw `errno` value reported by the kernel
        errno: i32,
    },

    /// The child process could not be set up or executed
    ///
    /// The message is the one the child wrote to its error channel before
    /// exiting (for example `exec failed: No such file or directory`).
    #[error("Failed to launch process: {0}")]
    SpawnFailed(String),

    /// Attaching to a running process was refused
    ///
    /// This happens when:
    /// - The PID does not exist
    /// - The process is already traced by someone else
    /// - `ptrace_scope` or missing `CAP_SYS_PTRACE` forbids it
    #[error("Failed to attach to process {pid}: {}", io::Error::from_raw_os_error(*errno))]
    AttachFailed
    {
        /// The PID that was requested
        pid: u32,
        /// Raw `errno` value reported by `PTRACE_ATTACH`
        errno: i32,
    },

    /// The process was launched without tracing (or has been detached)
    #[error("Not attached to a process")]
    NotAttached,

    /// Operation requires the process to be stopped
    ///
    /// Call [`wait_on_signal`](crate::Process::wait_on_signal) after
    /// resuming before inspecting or controlling the process.
    #[error("Process must be stopped for this operation")]
    NotStopped,

    /// Waiting on a process that is already stopped and has nothing to report
    #[error("Process is already stopped; resume it before waiting")]
    AlreadyStopped,

    /// The process has exited or was terminated by a signal
    #[error("Process is no longer running")]
    ProcessNotRunning,

    /// `waitpid` reported a status the state machine has no transition for
    #[error("Unexpected wait status: {0}")]
    UnexpectedWaitStatus(String),

    /// A breakpoint site already occupies this address
    #[error("Breakpoint site already exists at address {0}")]
    DuplicateAddress(VirtualAddress),

    /// No breakpoint found at the specified address
    #[error("No breakpoint at address {0}")]
    NoBreakpoint(VirtualAddress),

    /// No breakpoint exists for the given identifier.
    #[error("No breakpoint with id {0}")]
    BreakpointIdNotFound(u64),

    /// No register with this name (or DWARF number) exists in the catalog
    #[error("No such register: {0}")]
    RegisterNotFound(String),

    /// All hardware debug-register slots are in use
    ///
    /// x86-64 offers four address slots (DR0-DR3). Remove or disable a
    /// hardware breakpoint or watchpoint before adding another one.
    #[error("No free hardware breakpoint slot ({slots} in use)")]
    NoFreeSlot
    {
        /// Number of slots the architecture offers
        slots: usize,
    },

    /// The value's width does not match the register's width
    #[error("Register {register} is {expected} bytes wide, value is {actual} bytes")]
    SizeMismatch
    {
        /// Register name
        register: &'static str,
        /// Width of the register in bytes
        expected: usize,
        /// Width of the value in bytes
        actual: usize,
    },

    /// Reading or writing the target's memory failed or came up short
    #[error("Cannot access {length} bytes at {address}: {reason}")]
    MemoryAccess
    {
        /// First address of the requested range
        address: VirtualAddress,
        /// Number of bytes requested
        length: usize,
        /// What went wrong
        reason: String,
    },

    /// Text could not be parsed into the requested value
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Invalid argument passed to a debugger function
    ///
    /// Examples:
    /// - A path containing an interior NUL byte
    /// - A misaligned watchpoint address
    /// - An unsupported watchpoint size
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (for file operations, etc.)
    ///
    /// Used for errors when reading files such as ELF images or `/proc` entries.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DebuggerError
{
    /// `true` for lookup misses: unknown breakpoint id, address, or register name.
    #[must_use]
    pub const fn is_not_found(&self) -> bool
    {
        matches!(
            self,
            Self::NoBreakpoint(_) | Self::BreakpointIdNotFound(_) | Self::RegisterNotFound(_)
        )
    }

    /// The raw OS error code carried by system-level failures, if any.
    #[must_use]
    pub fn errno(&self) -> Option<i32>
    {
        match self {
            Self::SystemCall { errno, .. } | Self::AttachFailed { errno, .. } => Some(*errno),
            Self::Io(error) => error.raw_os_error(),
            _ => None,
        }
    }
}

/// Convenience type alias for `Result<T, DebuggerError>`
///
/// ```rust
/// use trapline_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, DebuggerError>;
