//! Process identity, lifecycle state, and stop reasons.

use std::fmt;

/// Process identifier (PID)
///
/// Using a newtype instead of a raw `u32` keeps PIDs from being confused with
/// exit codes or signal numbers, which travel through the same code paths.
///
/// ## Example
///
/// ```rust
/// use trapline_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(u32::from(pid), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a traced process
///
/// ## State Transitions
///
/// ```text
/// Stopped --resume/step--> Running --wait--> Stopped | Exited | Terminated
/// ```
///
/// `Exited` and `Terminated` are absorbing: once observed, every control
/// operation fails with [`ProcessNotRunning`](crate::DebuggerError::ProcessNotRunning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState
{
    /// Stopped in a trace-stop; registers and memory may be inspected
    Stopped,
    /// Executing; the next event arrives through `wait_on_signal`
    Running,
    /// Exited normally
    Exited,
    /// Killed by a signal
    Terminated,
}

impl ProcessState
{
    /// `true` once the process has exited or been killed.
    #[must_use]
    pub const fn is_finished(self) -> bool
    {
        matches!(self, Self::Exited | Self::Terminated)
    }
}

impl fmt::Display for ProcessState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Why a wait returned
///
/// `info` is the exit status for [`ProcessState::Exited`] and the signal number
/// for [`ProcessState::Stopped`] and [`ProcessState::Terminated`]. A stop
/// reason never carries [`ProcessState::Running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StopReason
{
    /// Resulting process state
    pub reason: ProcessState,
    /// Exit status or signal number
    pub info: u8,
}

impl StopReason
{
    /// The process exited with `status`.
    #[must_use]
    pub const fn exited(status: u8) -> Self
    {
        Self { reason: ProcessState::Exited, info: status }
    }

    /// The process was killed by `signal`.
    #[must_use]
    pub const fn terminated(signal: u8) -> Self
    {
        Self { reason: ProcessState::Terminated, info: signal }
    }

    /// The process entered a trace-stop because of `signal`.
    #[must_use]
    pub const fn stopped(signal: u8) -> Self
    {
        Self { reason: ProcessState::Stopped, info: signal }
    }

    /// `true` for a trace-stop caused by `SIGTRAP` (breakpoints and single steps).
    #[must_use]
    pub const fn is_trap(&self) -> bool
    {
        matches!(self.reason, ProcessState::Stopped) && self.info as i32 == libc::SIGTRAP
    }
}

impl fmt::Display for StopReason
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.reason {
            ProcessState::Exited => write!(f, "exited with status {}", self.info),
            ProcessState::Terminated => write!(f, "terminated with signal {}", self.info),
            ProcessState::Stopped => write!(f, "stopped with signal {}", self.info),
            ProcessState::Running => f.write_str("running"),
        }
    }
}
