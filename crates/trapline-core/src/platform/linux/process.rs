//! # Traced Processes
//!
//! [`Process`] owns one traced OS process: its lifecycle state, its register
//! snapshot, and the breakpoint sites planted in it.
//!
//! ## Lifecycle
//!
//! ```text
//! launch / attach ──> Stopped ──resume/step──> Running ──wait_on_signal──> Stopped
//!                                                                     ├──> Exited
//!                                                                     └──> Terminated
//! ```
//!
//! Control operations outside `Stopped` fail with
//! [`NotStopped`](DebuggerError::NotStopped), and with
//! [`ProcessNotRunning`](DebuggerError::ProcessNotRunning) once the process
//! has exited or been killed.
//!
//! ## Breakpoint transparency
//!
//! Software breakpoints are `int3` bytes patched into the target. The process
//! hides them:
//!
//! - [`read_memory`](Process::read_memory) returns the original bytes
//! - [`write_memory`](Process::write_memory) keeps traps in place and adopts
//!   the written byte as the new original
//! - after a breakpoint hit the PC is moved back onto the breakpoint address
//! - [`resume`](Process::resume) and [`step_instruction`](Process::step_instruction)
//!   step over a breakpoint at the current PC before re-arming it
//!
//! ## Teardown
//!
//! Dropping a launched process kills and reaps it. Dropping an attached
//! process removes its breakpoints and detaches, leaving it running.

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, trace, warn};

use super::launch::{self, LaunchOptions};
use super::ptrace::syscall_error;
use super::tracee::Tracee;
use crate::breakpoints::{BreakpointSite, Stoppoint, StoppointCollection, StoppointId, StoppointMode, StoppointOperations};
use crate::error::{DebuggerError, Result};
use crate::registers::{RegisterId, RegisterInfo, RegisterValue, Registers};
use crate::types::{FromMemoryBytes, ProcessId, ProcessState, StopReason, VirtualAddress};

/// `AT_NULL` terminates the auxiliary vector
const AT_NULL: u64 = 0;

impl TryFrom<WaitStatus> for StopReason
{
    type Error = DebuggerError;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn try_from(status: WaitStatus) -> Result<Self>
    {
        match status {
            WaitStatus::Exited(_, code) => Ok(Self::exited(code as u8)),
            WaitStatus::Signaled(_, signal, _) => Ok(Self::terminated(signal as i32 as u8)),
            WaitStatus::Stopped(_, signal) | WaitStatus::PtraceEvent(_, signal, _) => {
                Ok(Self::stopped(signal as i32 as u8))
            }
            WaitStatus::PtraceSyscall(_) => Ok(Self::stopped(libc::SIGTRAP as u8)),
            other => Err(DebuggerError::UnexpectedWaitStatus(format!("{other:?}"))),
        }
    }
}

/// A process under the debugger's control
#[derive(Debug)]
pub struct Process
{
    tracee: Tracee,
    state: ProcessState,
    terminate_on_end: bool,
    is_attached: bool,
    breakpoint_sites: StoppointCollection<BreakpointSite>,
    /// Stop observed while stepping over a breakpoint inside `resume`
    pending_stop: Option<StopReason>,
    /// Debug-register slot that caused the last stop
    triggered_slot: Option<usize>,
}

impl Process
{
    /// A process that has not yet reported its first stop.
    fn new(pid: Pid, terminate_on_end: bool, is_attached: bool) -> Self
    {
        Self {
            tracee: Tracee::new(pid),
            state: ProcessState::Running,
            terminate_on_end,
            is_attached,
            breakpoint_sites: StoppointCollection::new(),
            pending_stop: None,
            triggered_slot: None,
        }
    }

    /// Launch `path` with no arguments.
    ///
    /// With `debug` set the process is traced and this returns once it sits
    /// in its initial trace-stop. `stdout_replacement` becomes the child's
    /// standard output.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::SpawnFailed`] if the child could not be set up or
    /// `execvp` failed; [`DebuggerError::SystemCall`] for failures in the
    /// parent.
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// use trapline_core::types::ProcessState;
    /// use trapline_core::Process;
    ///
    /// let mut process = Process::launch("/bin/true", true, None)?;
    /// process.resume()?;
    /// let reason = process.wait_on_signal()?;
    /// assert_eq!(reason.reason, ProcessState::Exited);
    /// # Ok::<(), trapline_core::DebuggerError>(())
    /// ```
    pub fn launch(path: impl AsRef<Path>, debug: bool, stdout_replacement: Option<OwnedFd>) -> Result<Self>
    {
        let options = LaunchOptions {
            debug,
            stdout: stdout_replacement,
            ..LaunchOptions::default()
        };
        Self::launch_with(path, options)
    }

    /// Launch `path` with explicit [`LaunchOptions`].
    ///
    /// ## Errors
    ///
    /// See [`launch`](Self::launch).
    pub fn launch_with(path: impl AsRef<Path>, options: LaunchOptions) -> Result<Self>
    {
        let debug = options.debug;
        let pid = launch::spawn(path.as_ref(), options)?;

        let mut process = Self::new(pid, true, debug);
        if debug {
            process.wait_on_signal()?;
        }
        Ok(process)
    }

    /// Attach to a running process and wait for it to stop.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::AttachFailed`] if the pid does not exist or the
    /// kernel refuses the attach.
    pub fn attach(pid: ProcessId) -> Result<Self>
    {
        let raw = i32::try_from(pid.0)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or(DebuggerError::AttachFailed {
                pid: pid.0,
                errno: Errno::ESRCH as i32,
            })?;
        let target = Pid::from_raw(raw);

        ptrace::attach(target).map_err(|errno| DebuggerError::AttachFailed {
            pid: pid.0,
            errno: errno as i32,
        })?;
        debug!("Attached to PID {}", pid);

        let mut process = Self::new(target, false, true);
        process.wait_on_signal()?;
        Ok(process)
    }

    /// The traced process id.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn pid(&self) -> ProcessId
    {
        ProcessId(self.tracee.pid.as_raw() as u32)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessState
    {
        self.state
    }

    /// `true` while the process is traced.
    #[must_use]
    pub fn is_attached(&self) -> bool
    {
        self.is_attached
    }

    fn ensure_attached(&self) -> Result<()>
    {
        if self.is_attached {
            Ok(())
        } else {
            Err(DebuggerError::NotAttached)
        }
    }

    fn ensure_alive(&self) -> Result<()>
    {
        self.ensure_attached()?;
        if self.state.is_finished() {
            return Err(DebuggerError::ProcessNotRunning);
        }
        Ok(())
    }

    fn ensure_stopped(&self) -> Result<()>
    {
        self.ensure_alive()?;
        match self.state {
            ProcessState::Stopped => Ok(()),
            _ => Err(DebuggerError::NotStopped),
        }
    }

    /// Continue execution.
    ///
    /// If the PC sits on an enabled software breakpoint, the original
    /// instruction is single-stepped with the trap removed and the trap is
    /// re-armed before continuing. Should that step end the process (or stop
    /// it for another reason), the process is not continued and the next
    /// [`wait_on_signal`](Self::wait_on_signal) reports that stop. The state
    /// is [`Running`](ProcessState::Running) either way.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NotStopped`] unless stopped,
    /// [`DebuggerError::ProcessNotRunning`] after exit.
    pub fn resume(&mut self) -> Result<()>
    {
        self.ensure_stopped()?;

        let pc = self.get_pc()?;
        if let Some(id) = self.breakpoint_sites.trap_at(pc) {
            trace!("Stepping over breakpoint {} at {}", id, pc);
            self.breakpoint_sites.get_by_id_mut(id)?.disable(&mut self.tracee)?;
            ptrace::step(self.tracee.pid, None).map_err(syscall_error("PTRACE_SINGLESTEP"))?;
            let status = waitpid(self.tracee.pid, None).map_err(syscall_error("waitpid"))?;
            let reason = self.handle_wait_status(status)?;

            if reason.reason == ProcessState::Stopped {
                self.breakpoint_sites.get_by_id_mut(id)?.enable(&mut self.tracee)?;
            }
            if !reason.is_trap() {
                // Reported by the next wait_on_signal; until then the process counts as running
                self.pending_stop = Some(reason);
                self.state = ProcessState::Running;
                return Ok(());
            }
        }

        ptrace::cont(self.tracee.pid, None).map_err(syscall_error("PTRACE_CONT"))?;
        self.state = ProcessState::Running;
        debug!("Resumed PID {}", self.tracee.pid);
        Ok(())
    }

    /// Execute exactly one instruction and wait for the resulting stop.
    ///
    /// ## Errors
    ///
    /// As for [`resume`](Self::resume).
    pub fn step_instruction(&mut self) -> Result<StopReason>
    {
        self.ensure_stopped()?;

        let pc = self.get_pc()?;
        let resident = self.breakpoint_sites.trap_at(pc);
        if let Some(id) = resident {
            self.breakpoint_sites.get_by_id_mut(id)?.disable(&mut self.tracee)?;
        }

        if let Err(error) = ptrace::step(self.tracee.pid, None).map_err(syscall_error("PTRACE_SINGLESTEP")) {
            if let Some(id) = resident {
                self.breakpoint_sites.get_by_id_mut(id)?.enable(&mut self.tracee)?;
            }
            return Err(error);
        }
        self.state = ProcessState::Running;

        let reason = self.wait_on_signal()?;
        if let (Some(id), ProcessState::Stopped) = (resident, self.state) {
            self.breakpoint_sites.get_by_id_mut(id)?.enable(&mut self.tracee)?;
        }
        trace!("Stepped PID {} to {}", self.tracee.pid, self.get_pc()?);
        Ok(reason)
    }

    /// Block until the process changes state and report why.
    ///
    /// On a stop the register snapshot is refreshed. A stop caused by a
    /// software breakpoint is reported with the PC on the breakpoint address.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::ProcessNotRunning`] after exit,
    /// [`DebuggerError::AlreadyStopped`] if the process is stopped and nothing
    /// is pending (waiting would block forever),
    /// [`DebuggerError::SystemCall`] if `waitpid` fails.
    pub fn wait_on_signal(&mut self) -> Result<StopReason>
    {
        if let Some(reason) = self.pending_stop.take() {
            self.state = reason.reason;
            debug!("PID {} {} (pending)", self.tracee.pid, reason);
            return Ok(reason);
        }
        match self.state {
            ProcessState::Exited | ProcessState::Terminated => return Err(DebuggerError::ProcessNotRunning),
            ProcessState::Stopped => return Err(DebuggerError::AlreadyStopped),
            ProcessState::Running => {}
        }

        let status = waitpid(self.tracee.pid, None).map_err(syscall_error("waitpid"))?;
        let reason = self.handle_wait_status(status)?;
        debug!("PID {} {}", self.tracee.pid, reason);
        Ok(reason)
    }

    fn handle_wait_status(&mut self, status: WaitStatus) -> Result<StopReason>
    {
        let reason = StopReason::try_from(status)?;
        self.state = reason.reason;
        self.triggered_slot = None;

        if self.is_attached && reason.reason == ProcessState::Stopped {
            self.tracee.read_all_registers()?;

            if reason.is_trap() {
                self.attribute_trap()?;
            }
        }
        Ok(reason)
    }

    /// Rewind past an executed `int3` and count hits for the responsible site.
    fn attribute_trap(&mut self) -> Result<()>
    {
        let instruction_start = self.get_pc()? - 1;
        if let Some(id) = self.breakpoint_sites.trap_at(instruction_start) {
            self.set_pc(instruction_start)?;
            self.breakpoint_sites.get_by_id_mut(id)?.record_hit();
            return Ok(());
        }

        if let Some(slot) = self.tracee.triggered_hardware_slot()? {
            self.triggered_slot = Some(slot);
            let hit = self
                .breakpoint_sites
                .iter_mut()
                .find(|site| site.is_enabled() && site.hardware_slot() == Some(slot));
            if let Some(site) = hit {
                site.record_hit();
            }
            // DR6 is sticky; clear it so the next stop is attributed afresh
            self.tracee.write_register_by_id(RegisterId::Dr6, RegisterValue::U64(0))?;
        }
        Ok(())
    }

    /// Remove all breakpoints and stop tracing, leaving the process running.
    ///
    /// A launched process is no longer killed when this object is dropped.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NotAttached`] if not traced, or the failing system call.
    pub fn detach(&mut self) -> Result<()>
    {
        self.ensure_attached()?;

        if let Some(reason) = self.pending_stop.take() {
            self.state = reason.reason;
        }

        if !self.state.is_finished() {
            let pid = self.tracee.pid;
            if self.state == ProcessState::Running {
                kill(pid, Signal::SIGSTOP).map_err(syscall_error("kill"))?;
                waitpid(pid, None).map_err(syscall_error("waitpid"))?;
                self.tracee.read_all_registers()?;
                self.state = ProcessState::Stopped;
            }

            for site in self.breakpoint_sites.iter_mut() {
                site.disable(&mut self.tracee)?;
            }
            ptrace::detach(pid, None).map_err(syscall_error("PTRACE_DETACH"))?;
            kill(pid, Signal::SIGCONT).map_err(syscall_error("kill"))?;
            self.state = ProcessState::Running;
            debug!("Detached from PID {}", pid);
        }

        self.is_attached = false;
        self.terminate_on_end = false;
        Ok(())
    }

    /// The register snapshot taken at the last stop.
    #[must_use]
    pub fn registers(&self) -> &Registers
    {
        &self.tracee.registers
    }

    /// Write a register and flush its register set to the process.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::SizeMismatch`] if the value width is wrong,
    /// [`DebuggerError::NotStopped`] unless stopped.
    pub fn write_register(&mut self, info: &RegisterInfo, value: RegisterValue) -> Result<()>
    {
        self.ensure_stopped()?;
        self.tracee.write_register(info, value)
    }

    /// Write a register by id.
    ///
    /// ## Errors
    ///
    /// See [`write_register`](Self::write_register).
    pub fn write_register_by_id(&mut self, id: RegisterId, value: RegisterValue) -> Result<()>
    {
        self.write_register(id.info(), value)
    }

    /// The program counter.
    ///
    /// ## Errors
    ///
    /// Only if the snapshot is malformed.
    pub fn get_pc(&self) -> Result<VirtualAddress>
    {
        self.tracee
            .registers
            .read_by_id_as::<u64>(RegisterId::Rip)
            .map(VirtualAddress::new)
    }

    /// Move the program counter.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NotStopped`] unless stopped.
    pub fn set_pc(&mut self, address: VirtualAddress) -> Result<()>
    {
        self.write_register_by_id(RegisterId::Rip, RegisterValue::U64(address.value()))
    }

    /// Read memory with every breakpoint trap replaced by the original byte.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::MemoryAccess`] if any byte of the range is unreadable.
    pub fn read_memory(&self, address: VirtualAddress, amount: usize) -> Result<Vec<u8>>
    {
        let mut bytes = self.read_memory_without_traps(address, amount)?;
        self.breakpoint_sites.mask_traps(address, &mut bytes);
        Ok(bytes)
    }

    /// Read memory exactly as it is, trap bytes included.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::MemoryAccess`] if any byte of the range is unreadable.
    pub fn read_memory_without_traps(&self, address: VirtualAddress, amount: usize) -> Result<Vec<u8>>
    {
        self.ensure_alive()?;
        self.tracee.read_memory_without_traps(address, amount)
    }

    /// Read a little-endian value from memory, traps masked.
    ///
    /// ## Errors
    ///
    /// As for [`read_memory`](Self::read_memory).
    pub fn read_memory_as<T: FromMemoryBytes>(&self, address: VirtualAddress) -> Result<T>
    {
        let bytes = self.read_memory(address, T::SIZE)?;
        T::from_memory_bytes(&bytes).ok_or_else(|| DebuggerError::MemoryAccess {
            address,
            length: T::SIZE,
            reason: format!("read returned {} bytes", bytes.len()),
        })
    }

    /// Write memory. Breakpoints inside the range stay installed and will
    /// restore the written bytes when disabled.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::MemoryAccess`] if the range is not writable,
    /// [`DebuggerError::NotStopped`] unless stopped.
    pub fn write_memory(&mut self, address: VirtualAddress, data: &[u8]) -> Result<()>
    {
        self.ensure_stopped()?;

        let mut effective = data.to_vec();
        let adopted = self.breakpoint_sites.preserve_traps(address, &mut effective);
        self.tracee.write_memory_raw(address, &effective)?;
        self.breakpoint_sites.adopt_original_bytes(&adopted);
        Ok(())
    }

    /// Register a new, disabled breakpoint site.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::DuplicateAddress`] if a site already exists there.
    pub fn create_breakpoint_site(
        &mut self,
        address: VirtualAddress,
        hardware: bool,
        internal: bool,
    ) -> Result<&BreakpointSite>
    {
        let site = self
            .breakpoint_sites
            .insert_with(address, |id| BreakpointSite::new(id, address, hardware, internal))?;
        debug!("Created breakpoint site {} at {}", site.id(), address);
        Ok(site)
    }

    /// All breakpoint sites.
    #[must_use]
    pub fn breakpoint_sites(&self) -> &StoppointCollection<BreakpointSite>
    {
        &self.breakpoint_sites
    }

    /// Install a breakpoint site. Idempotent.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::BreakpointIdNotFound`], [`DebuggerError::NoFreeSlot`],
    /// or [`DebuggerError::NotStopped`].
    pub fn enable_breakpoint_site(&mut self, id: StoppointId) -> Result<()>
    {
        self.ensure_stopped()?;
        self.breakpoint_sites.get_by_id_mut(id)?.enable(&mut self.tracee)
    }

    /// Remove a breakpoint site from the target but keep it registered.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::BreakpointIdNotFound`] or [`DebuggerError::NotStopped`].
    pub fn disable_breakpoint_site(&mut self, id: StoppointId) -> Result<()>
    {
        self.ensure_stopped()?;
        self.breakpoint_sites.get_by_id_mut(id)?.disable(&mut self.tracee)
    }

    /// Disable and forget a breakpoint site. Its id is never issued again.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::BreakpointIdNotFound`] or [`DebuggerError::NotStopped`].
    pub fn remove_breakpoint_site(&mut self, id: StoppointId) -> Result<()>
    {
        self.ensure_stopped()?;
        self.breakpoint_sites.remove_by_id(id, &mut self.tracee)
    }

    /// Claim a debug-register slot for an execute breakpoint.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NoFreeSlot`] when all four slots are in use.
    pub fn set_hardware_breakpoint(&mut self, id: StoppointId, address: VirtualAddress) -> Result<usize>
    {
        self.ensure_stopped()?;
        self.tracee.set_hardware_breakpoint(id, address)
    }

    /// Claim a debug-register slot for any mode and size.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NoFreeSlot`] when all slots are in use,
    /// [`DebuggerError::InvalidArgument`] for unsupported size or alignment.
    pub fn set_hardware_stoppoint(&mut self, address: VirtualAddress, mode: StoppointMode, size: usize) -> Result<usize>
    {
        self.ensure_stopped()?;
        self.tracee.set_hardware_stoppoint(address, mode, size)
    }

    /// Watch `size` bytes at `address` for writes or accesses.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::InvalidArgument`] for [`StoppointMode::Execute`],
    /// otherwise as for [`set_hardware_stoppoint`](Self::set_hardware_stoppoint).
    pub fn set_watchpoint(&mut self, address: VirtualAddress, mode: StoppointMode, size: usize) -> Result<usize>
    {
        if mode == StoppointMode::Execute {
            return Err(DebuggerError::InvalidArgument(
                "watchpoints trigger on data access; use a hardware breakpoint for execution".to_string(),
            ));
        }
        self.set_hardware_stoppoint(address, mode, size)
    }

    /// Release a debug-register slot.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NotStopped`] unless stopped.
    pub fn clear_hardware_stoppoint(&mut self, slot: usize) -> Result<()>
    {
        self.ensure_stopped()?;
        self.tracee.clear_hardware_stoppoint(slot)
    }

    /// The debug-register slot that caused the last stop, if any.
    ///
    /// Recorded from DR6 when the stop is handled; DR6 itself is cleared at
    /// that point.
    #[must_use]
    pub fn triggered_hardware_slot(&self) -> Option<usize>
    {
        self.triggered_slot
    }

    /// The process's auxiliary vector (`/proc/<pid>/auxv`), keyed by `AT_*` type.
    ///
    /// `AT_ENTRY` (9) gives the runtime entry point, which together with the
    /// ELF header's entry yields the load bias of a position-independent
    /// executable.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::Io`] if the file cannot be read.
    pub fn auxv(&self) -> Result<HashMap<u64, u64>>
    {
        let raw = std::fs::read(format!("/proc/{}/auxv", self.tracee.pid))?;
        let mut entries = HashMap::new();
        for pair in raw.chunks_exact(16) {
            let mut key = [0u8; 8];
            let mut value = [0u8; 8];
            key.copy_from_slice(&pair[..8]);
            value.copy_from_slice(&pair[8..]);
            let key = u64::from_le_bytes(key);
            if key == AT_NULL {
                break;
            }
            entries.insert(key, u64::from_le_bytes(value));
        }
        Ok(entries)
    }
}

impl Drop for Process
{
    fn drop(&mut self)
    {
        let reaped = self.pending_stop.is_some_and(|reason| reason.reason.is_finished());
        if self.state.is_finished() || reaped {
            return;
        }
        let pid = self.tracee.pid;

        if self.terminate_on_end {
            if let Err(errno) = kill(pid, Signal::SIGKILL) {
                warn!("Failed to kill PID {}: {}", pid, errno);
                return;
            }
            if let Err(errno) = waitpid(pid, None) {
                warn!("Failed to reap PID {}: {}", pid, errno);
            }
            trace!("Killed PID {}", pid);
        } else if self.is_attached {
            if let Err(error) = self.detach() {
                warn!("Failed to detach from PID {}: {}", pid, error);
            }
        }
    }
}
