//! Tests for error handling

use std::io;

use trapline_core::error::{DebuggerError, Result};
use trapline_core::types::VirtualAddress;

const ENOENT: i32 = 2;
const ESRCH: i32 = 3;

#[test]
fn test_debugger_error_display()
{
    let error = DebuggerError::NotStopped;
    assert_eq!(error.to_string(), "Process must be stopped for this operation");

    let error = DebuggerError::DuplicateAddress(VirtualAddress::new(0x401000));
    assert_eq!(error.to_string(), "Breakpoint site already exists at address 0x0000000000401000");

    let error = DebuggerError::AlreadyStopped;
    assert_eq!(error.to_string(), "Process is already stopped; resume it before waiting");
    assert!(!error.is_not_found());

    let error = DebuggerError::BreakpointIdNotFound(7);
    assert_eq!(error.to_string(), "No breakpoint with id 7");

    let error = DebuggerError::RegisterNotFound("rgx".to_string());
    assert_eq!(error.to_string(), "No such register: rgx");
}

#[test]
fn test_system_call_error_includes_os_message()
{
    let error = DebuggerError::SystemCall {
        operation: "PTRACE_PEEKUSER",
        errno: ESRCH,
    };
    let message = error.to_string();
    assert!(message.starts_with("PTRACE_PEEKUSER failed: "));
    assert!(message.contains(&io::Error::from_raw_os_error(ESRCH).to_string()));
    assert_eq!(error.errno(), Some(ESRCH));
}

#[test]
fn test_attach_failed_reports_pid_and_errno()
{
    let error = DebuggerError::AttachFailed { pid: 4242, errno: ESRCH };
    assert!(error.to_string().contains("4242"));
    assert_eq!(error.errno(), Some(ESRCH));
}

#[test]
fn test_size_mismatch_display()
{
    let error = DebuggerError::SizeMismatch {
        register: "rax",
        expected: 8,
        actual: 4,
    };
    assert_eq!(error.to_string(), "Register rax is 8 bytes wide, value is 4 bytes");
}

#[test]
fn test_memory_access_display()
{
    let error = DebuggerError::MemoryAccess {
        address: VirtualAddress::new(0x10),
        length: 4,
        reason: "Bad address".to_string(),
    };
    assert_eq!(error.to_string(), "Cannot access 4 bytes at 0x0000000000000010: Bad address");
}

#[test]
fn test_no_free_slot_display()
{
    let error = DebuggerError::NoFreeSlot { slots: 4 };
    assert!(error.to_string().contains('4'));
}

#[test]
fn test_is_not_found()
{
    assert!(DebuggerError::BreakpointIdNotFound(1).is_not_found());
    assert!(DebuggerError::NoBreakpoint(VirtualAddress::ZERO).is_not_found());
    assert!(DebuggerError::RegisterNotFound("foo".to_string()).is_not_found());
    assert!(!DebuggerError::NotStopped.is_not_found());
    assert!(!DebuggerError::DuplicateAddress(VirtualAddress::ZERO).is_not_found());
}

#[test]
fn test_io_error_conversion()
{
    let io_error = io::Error::from_raw_os_error(ENOENT);
    let error: DebuggerError = io_error.into();

    assert!(matches!(error, DebuggerError::Io(_)));
    assert!(error.to_string().starts_with("IO error: "));
    assert_eq!(error.errno(), Some(ENOENT));
}

#[test]
fn test_errno_absent_for_logical_errors()
{
    assert_eq!(DebuggerError::NotAttached.errno(), None);
    assert_eq!(DebuggerError::MalformedInput("x".to_string()).errno(), None);
}

#[test]
fn test_result_type_alias()
{
    fn returns_ok() -> Result<u64>
    {
        Ok(42)
    }

    fn returns_err() -> Result<u64>
    {
        Err(DebuggerError::ProcessNotRunning)
    }

    assert_eq!(returns_ok().unwrap(), 42);
    assert!(matches!(returns_err(), Err(DebuggerError::ProcessNotRunning)));
}
