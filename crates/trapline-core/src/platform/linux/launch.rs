//! # Linux Process Launch
//!
//! Launching a process under debugger control with `fork` and `execvp`.
//!
//! The child optionally redirects its standard output, optionally disables
//! address-space randomisation, requests tracing with `PTRACE_TRACEME`, and
//! executes the program. The kernel then stops it with `SIGTRAP` right after
//! `execve` returns, before the first instruction of the dynamic loader.
//!
//! ## Error channel
//!
//! Failures in the child happen after `fork`, where the only way back to the
//! parent is an inherited file descriptor. The child writes a short message
//! into a pipe created with `O_CLOEXEC` and exits. A successful `execvp`
//! closes the write end, so the parent reading end-of-file without any bytes
//! means the program is running.
//!
//! Between `fork` and `execvp` the child only performs async-signal-safe
//! work: every C string is prepared before forking and error messages are
//! static.

use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::wait::waitpid;
use nix::unistd::{dup2, execvp, fork, pipe2, ForkResult, Pid};
use tracing::{debug, trace};

use super::ptrace::syscall_error;
use crate::error::{DebuggerError, Result};

/// How to start a process
///
/// ## Example
///
/// ```rust,no_run
/// use trapline_core::{LaunchOptions, Process};
///
/// let options = LaunchOptions::default().with_args(["--verbose"]).with_aslr_disabled();
/// let process = Process::launch_with("/usr/bin/env", options)?;
/// # Ok::<(), trapline_core::DebuggerError>(())
/// ```
#[derive(Debug)]
pub struct LaunchOptions
{
    /// Trace the child (default `true`). Without tracing the process runs
    /// freely and only its pid is available.
    pub debug: bool,
    /// Replacement for the child's standard output
    pub stdout: Option<OwnedFd>,
    /// Arguments passed after `argv[0]`
    pub args: Vec<String>,
    /// Run the child with `ADDR_NO_RANDOMIZE` so load addresses are stable
    pub disable_aslr: bool,
}

impl Default for LaunchOptions
{
    fn default() -> Self
    {
        Self {
            debug: true,
            stdout: None,
            args: Vec::new(),
            disable_aslr: false,
        }
    }
}

impl LaunchOptions
{
    /// Set the program arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Redirect the child's standard output to `fd`.
    #[must_use]
    pub fn with_stdout(mut self, fd: OwnedFd) -> Self
    {
        self.stdout = Some(fd);
        self
    }

    /// Disable address-space layout randomisation for the child.
    #[must_use]
    pub fn with_aslr_disabled(mut self) -> Self
    {
        self.disable_aslr = true;
        self
    }
}

fn to_cstring(value: &[u8]) -> Result<CString>
{
    CString::new(value).map_err(|_| {
        DebuggerError::InvalidArgument(format!(
            "{:?} contains an interior NUL byte",
            String::from_utf8_lossy(value)
        ))
    })
}

/// Fork and execute `path`, returning the child's pid once `execvp` succeeded.
///
/// When `options.debug` is set the child is left in its initial trace-stop;
/// the caller must reap that stop with `waitpid`.
pub(crate) fn spawn(path: &Path, options: LaunchOptions) -> Result<Pid>
{
    let program = to_cstring(path.as_os_str().as_bytes())?;
    let mut argv = vec![program.clone()];
    for arg in &options.args {
        argv.push(to_cstring(arg.as_bytes())?);
    }

    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).map_err(syscall_error("pipe2"))?;

    trace!("Forking to launch {}", path.display());
    // SAFETY: the child only calls async-signal-safe functions before exec.
    match unsafe { fork() }.map_err(syscall_error("fork"))? {
        ForkResult::Child => {
            drop(read_end);
            exec_child(&program, &argv, &options, write_end)
        }
        ForkResult::Parent { child } => {
            drop(write_end);
            drop(options);

            let mut message = Vec::new();
            File::from(read_end).read_to_end(&mut message)?;
            if !message.is_empty() {
                // The child has exited; reap it so no zombie is left behind
                let _ = waitpid(child, None);
                return Err(DebuggerError::SpawnFailed(String::from_utf8_lossy(&message).into_owned()));
            }

            debug!("Launched {} as PID {}", path.display(), child);
            Ok(child)
        }
    }
}

fn exec_child(program: &CString, argv: &[CString], options: &LaunchOptions, channel: OwnedFd) -> !
{
    if let Some(stdout) = &options.stdout {
        if let Err(errno) = dup2(stdout.as_raw_fd(), libc::STDOUT_FILENO) {
            exit_with_error(channel, "stdout replacement failed", errno);
        }
    }

    if options.disable_aslr {
        if let Err(errno) = personality::get().and_then(|persona| personality::set(persona | Persona::ADDR_NO_RANDOMIZE)) {
            exit_with_error(channel, "disabling ASLR failed", errno);
        }
    }

    if options.debug {
        if let Err(errno) = ptrace::traceme() {
            exit_with_error(channel, "tracing failed", errno);
        }
    }

    match execvp(program, argv) {
        Err(errno) => exit_with_error(channel, "exec failed", errno),
        Ok(never) => match never {},
    }
}

fn exit_with_error(channel: OwnedFd, step: &'static str, errno: Errno) -> !
{
    let mut channel = File::from(channel);
    let _ = channel.write_all(step.as_bytes());
    let _ = channel.write_all(b": ");
    let _ = channel.write_all(errno.desc().as_bytes());
    drop(channel);

    // SAFETY: `_exit` skips atexit handlers inherited from the parent.
    unsafe { libc::_exit(1) }
}
