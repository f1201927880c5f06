//! Raw `ptrace` requests.
//!
//! Word-sized peeks and pokes go through `nix`. Its register-set wrappers
//! return `libc` structs, so the bulk requests here hand the kernel a byte
//! buffer instead: the kernel copies the register set into (or out of) the
//! caller's slice, which is always the matching range of the
//! [`Registers`](crate::registers::Registers) snapshot.

use std::mem::size_of;
use std::ptr;

use libc::{c_long, c_void};
use nix::errno::Errno;
use nix::unistd::Pid;

use crate::error::{DebuggerError, Result};
use crate::types::VirtualAddress;

/// Build the error-mapping closure for a failed system call.
pub(crate) fn syscall_error(operation: &'static str) -> impl Fn(Errno) -> DebuggerError
{
    move |errno| DebuggerError::SystemCall {
        operation,
        errno: errno as i32,
    }
}

/// Which bulk register set a request transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegisterSet
{
    /// `struct user_regs_struct`
    General,
    /// `struct user_fpregs_struct`
    FloatingPoint,
}

impl RegisterSet
{
    const fn size(self) -> usize
    {
        match self {
            Self::General => size_of::<libc::user_regs_struct>(),
            Self::FloatingPoint => size_of::<libc::user_fpregs_struct>(),
        }
    }

    fn check(self, buffer_len: usize) -> Result<()>
    {
        if buffer_len == self.size() {
            Ok(())
        } else {
            Err(DebuggerError::InvalidArgument(format!(
                "{self:?} register buffer is {buffer_len} bytes, expected {}",
                self.size()
            )))
        }
    }
}

/// `PTRACE_GETREGS` / `PTRACE_GETFPREGS` into `buffer`.
pub(crate) fn read_register_set(pid: Pid, set: RegisterSet, buffer: &mut [u8]) -> Result<()>
{
    set.check(buffer.len())?;
    let (request, operation) = match set {
        RegisterSet::General => (libc::PTRACE_GETREGS, "PTRACE_GETREGS"),
        RegisterSet::FloatingPoint => (libc::PTRACE_GETFPREGS, "PTRACE_GETFPREGS"),
    };

    // SAFETY: `buffer` is exactly as long as the structure the kernel writes.
    let result = unsafe {
        libc::ptrace(
            request,
            pid.as_raw(),
            ptr::null_mut::<c_void>(),
            buffer.as_mut_ptr().cast::<c_void>(),
        )
    };
    Errno::result(result).map(drop).map_err(syscall_error(operation))
}

/// `PTRACE_SETREGS` / `PTRACE_SETFPREGS` from `buffer`.
pub(crate) fn write_register_set(pid: Pid, set: RegisterSet, buffer: &[u8]) -> Result<()>
{
    set.check(buffer.len())?;
    let (request, operation) = match set {
        RegisterSet::General => (libc::PTRACE_SETREGS, "PTRACE_SETREGS"),
        RegisterSet::FloatingPoint => (libc::PTRACE_SETFPREGS, "PTRACE_SETFPREGS"),
    };

    // SAFETY: the kernel only reads `size()` bytes, which `check` guarantees exist.
    let result = unsafe {
        libc::ptrace(
            request,
            pid.as_raw(),
            ptr::null_mut::<c_void>(),
            buffer.as_ptr().cast_mut().cast::<c_void>(),
        )
    };
    Errno::result(result).map(drop).map_err(syscall_error(operation))
}

/// `PTRACE_POKEDATA`: store one word of target memory.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) fn poke_data(pid: Pid, address: VirtualAddress, word: u64) -> Result<()>
{
    nix::sys::ptrace::write(pid, address.value() as usize as *mut c_void, word as c_long)
        .map_err(syscall_error("PTRACE_POKEDATA"))
}

/// `PTRACE_POKEUSER`: store one word of `struct user` (used for debug registers).
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn poke_user(pid: Pid, offset: usize, word: u64) -> Result<()>
{
    nix::sys::ptrace::write_user(pid, offset as *mut c_void, word as c_long).map_err(syscall_error("PTRACE_POKEUSER"))
}

/// `PTRACE_PEEKUSER`: load one word of `struct user`.
#[allow(clippy::cast_sign_loss)]
pub(crate) fn peek_user(pid: Pid, offset: usize) -> Result<u64>
{
    nix::sys::ptrace::read_user(pid, offset as *mut c_void)
        .map(|word| word as u64)
        .map_err(syscall_error("PTRACE_PEEKUSER"))
}
