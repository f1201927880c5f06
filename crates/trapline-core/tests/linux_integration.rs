//! Integration tests against real traced processes
//!
//! These launch small system binaries under ptrace and need a kernel that
//! allows tracing child processes.

#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use std::fs::File;
use std::io::Read;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use trapline_core::breakpoints::{Stoppoint, StoppointMode, INT3};
use trapline_core::error::DebuggerError;
use trapline_core::registers::{RegisterId, RegisterValue};
use trapline_core::types::{ProcessId, ProcessState, VirtualAddress};
use trapline_core::{LaunchOptions, Process};

const AT_ENTRY: u64 = 9;
const SIGTRAP: u8 = 5;
const SIGUSR1: u8 = 10;

fn launch_true() -> Process
{
    Process::launch("/bin/true", true, None).unwrap()
}

fn entry_point(process: &Process) -> VirtualAddress
{
    VirtualAddress::new(process.auxv().unwrap()[&AT_ENTRY])
}

fn send_signal(process: &Process, signal: Signal)
{
    kill(Pid::from_raw(process.pid().0 as i32), signal).unwrap();
}

#[test]
fn test_launch_stops_at_exec()
{
    let process = launch_true();
    assert_eq!(process.state(), ProcessState::Stopped);
    assert!(process.is_attached());
    assert!(process.pid().0 > 0);
}

#[test]
fn test_launch_and_run_to_exit()
{
    let mut process = launch_true();
    process.resume().unwrap();
    assert_eq!(process.state(), ProcessState::Running);

    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);
    assert_eq!(reason.info, 0);
    assert_eq!(process.state(), ProcessState::Exited);
}

#[test]
fn test_launch_reports_exit_status()
{
    let mut process = Process::launch("/bin/false", true, None).unwrap();
    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);
    assert_eq!(reason.info, 1);
}

#[test]
fn test_launch_missing_program()
{
    let error = Process::launch("/nonexistent/trapline-test-program", true, None).unwrap_err();
    assert!(matches!(error, DebuggerError::SpawnFailed(_)));
}

#[test]
fn test_attach_invalid_pid()
{
    let error = Process::attach(ProcessId(0)).unwrap_err();
    assert!(matches!(error, DebuggerError::AttachFailed { pid: 0, .. }));

    let error = Process::attach(ProcessId(u32::MAX)).unwrap_err();
    assert!(matches!(error, DebuggerError::AttachFailed { .. }));
}

#[test]
fn test_attach_to_running_child()
{
    let options = LaunchOptions {
        debug: false,
        ..LaunchOptions::default()
    }
    .with_args(["5"]);
    let mut untraced = Process::launch_with("/bin/sleep", options).unwrap();
    assert!(!untraced.is_attached());
    assert!(matches!(untraced.resume(), Err(DebuggerError::NotAttached)));

    let mut traced = Process::attach(untraced.pid()).unwrap();
    assert_eq!(traced.state(), ProcessState::Stopped);
    assert!(traced.is_attached());

    traced.detach().unwrap();
    assert!(!traced.is_attached());
    assert_eq!(traced.state(), ProcessState::Running);
}

#[test]
fn test_stdout_redirection()
{
    let (reader, writer) = nix::unistd::pipe().unwrap();
    let options = LaunchOptions::default().with_args(["trapline"]).with_stdout(writer);
    let mut process = Process::launch_with("/bin/echo", options).unwrap();

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);

    let mut output = String::new();
    File::from(reader).read_to_string(&mut output).unwrap();
    assert_eq!(output, "trapline\n");
}

#[test]
fn test_operations_after_exit()
{
    let mut process = launch_true();
    process.resume().unwrap();
    process.wait_on_signal().unwrap();

    assert!(matches!(process.resume(), Err(DebuggerError::ProcessNotRunning)));
    assert!(matches!(process.wait_on_signal(), Err(DebuggerError::ProcessNotRunning)));
    assert!(matches!(process.step_instruction(), Err(DebuggerError::ProcessNotRunning)));
    assert!(matches!(
        process.read_memory(VirtualAddress::new(0x1000), 1),
        Err(DebuggerError::ProcessNotRunning)
    ));
}

#[test]
fn test_resume_while_running_fails()
{
    let mut process = Process::launch("/bin/sleep", true, None).unwrap();
    process.resume().unwrap();
    // `sleep` without arguments exits with an error; until it is reaped the
    // process counts as running
    assert!(matches!(process.resume(), Err(DebuggerError::NotStopped)));
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);
}

#[test]
fn test_wait_while_stopped_is_an_error()
{
    let mut process = launch_true();
    assert!(matches!(process.wait_on_signal(), Err(DebuggerError::AlreadyStopped)));
    assert_eq!(process.state(), ProcessState::Stopped);

    process.resume().unwrap();
    assert_eq!(process.wait_on_signal().unwrap().reason, ProcessState::Exited);
}

#[test]
fn test_register_write_and_read_back()
{
    let mut process = launch_true();
    process
        .write_register_by_id(RegisterId::Rax, RegisterValue::U64(0x1234_5678_9abc_def0))
        .unwrap();
    assert_eq!(
        process.registers().read_by_id_as::<u64>(RegisterId::Rax).unwrap(),
        0x1234_5678_9abc_def0
    );
    assert_eq!(process.registers().read_by_id_as::<u8>(RegisterId::Al).unwrap(), 0xf0);

    process
        .write_register_by_id(RegisterId::Xmm0, RegisterValue::Byte128([0x42; 16]))
        .unwrap();
    assert_eq!(process.registers().read_by_id_as::<[u8; 16]>(RegisterId::Xmm0).unwrap(), [0x42; 16]);

    let error = process
        .write_register_by_id(RegisterId::Rax, RegisterValue::U32(1))
        .unwrap_err();
    assert!(matches!(error, DebuggerError::SizeMismatch { .. }));
}

#[test]
fn test_single_step_moves_pc()
{
    let mut process = launch_true();
    let before = process.get_pc().unwrap();

    let reason = process.step_instruction().unwrap();
    assert_eq!(reason.reason, ProcessState::Stopped);
    assert_eq!(reason.info, SIGTRAP);
    assert_ne!(process.get_pc().unwrap(), before);
}

#[test]
fn test_memory_round_trip()
{
    let mut process = launch_true();
    let pc = process.get_pc().unwrap();
    let original = process.read_memory(pc, 8).unwrap();
    assert_eq!(original.len(), 8);

    process.write_memory(pc, &[0x90, 0x90]).unwrap();
    assert_eq!(process.read_memory(pc, 2).unwrap(), vec![0x90, 0x90]);

    process.write_memory(pc, &original).unwrap();
    assert_eq!(process.read_memory(pc, 8).unwrap(), original);
    assert_eq!(
        process.read_memory_as::<u64>(pc).unwrap(),
        u64::from_le_bytes(original.try_into().unwrap())
    );
}

#[test]
fn test_unmapped_memory_is_an_error()
{
    let process = launch_true();
    let error = process.read_memory(VirtualAddress::new(8), 4).unwrap_err();
    assert!(matches!(error, DebuggerError::MemoryAccess { .. }));
}

#[test]
fn test_breakpoint_is_invisible_to_reads()
{
    let mut process = launch_true();
    let pc = process.get_pc().unwrap();
    let original = process.read_memory(pc, 1).unwrap()[0];

    let id = process.create_breakpoint_site(pc, false, false).unwrap().id();
    process.enable_breakpoint_site(id).unwrap();

    assert_eq!(process.read_memory_without_traps(pc, 1).unwrap(), vec![INT3]);
    assert_eq!(process.read_memory(pc, 1).unwrap(), vec![original]);

    process.disable_breakpoint_site(id).unwrap();
    assert_eq!(process.read_memory_without_traps(pc, 1).unwrap(), vec![original]);
}

#[test]
fn test_write_over_breakpoint_keeps_trap()
{
    let mut process = launch_true();
    let pc = process.get_pc().unwrap();
    let original = process.read_memory(pc, 4).unwrap();

    let id = process.create_breakpoint_site(pc + 1, false, false).unwrap().id();
    process.enable_breakpoint_site(id).unwrap();

    process.write_memory(pc, &[0x90, 0x91, 0x92, 0x93]).unwrap();
    assert_eq!(process.read_memory(pc, 4).unwrap(), vec![0x90, 0x91, 0x92, 0x93]);
    assert_eq!(process.read_memory_without_traps(pc + 1, 1).unwrap(), vec![INT3]);

    // The written byte, not the program's, comes back on disable
    process.disable_breakpoint_site(id).unwrap();
    assert_eq!(process.read_memory_without_traps(pc + 1, 1).unwrap(), vec![0x91]);

    process.write_memory(pc, &original).unwrap();
}

#[test]
fn test_duplicate_site_rejected()
{
    let mut process = launch_true();
    let pc = process.get_pc().unwrap();
    process.create_breakpoint_site(pc, false, false).unwrap();

    let error = process.create_breakpoint_site(pc, true, false).unwrap_err();
    assert!(matches!(error, DebuggerError::DuplicateAddress(_)));
    assert_eq!(process.breakpoint_sites().len(), 1);
}

#[test]
fn test_breakpoint_at_entry_is_hit()
{
    let mut process = launch_true();
    let entry = entry_point(&process);

    let id = process.create_breakpoint_site(entry, false, false).unwrap().id();
    process.enable_breakpoint_site(id).unwrap();

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Stopped);
    assert_eq!(reason.info, SIGTRAP);
    assert_eq!(process.get_pc().unwrap(), entry);

    let site = process.breakpoint_sites().get_by_id(id).unwrap();
    assert_eq!(site.hit_count(), 1);
    assert!(site.is_enabled());

    // Continuing steps over the trap and runs to completion
    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);
    assert_eq!(reason.info, 0);
}

#[test]
fn test_step_over_breakpoint_keeps_it_armed()
{
    let mut process = launch_true();
    let entry = entry_point(&process);
    let id = process.create_breakpoint_site(entry, false, false).unwrap().id();
    process.enable_breakpoint_site(id).unwrap();
    process.resume().unwrap();
    process.wait_on_signal().unwrap();

    process.step_instruction().unwrap();
    assert_ne!(process.get_pc().unwrap(), entry);
    assert_eq!(process.read_memory_without_traps(entry, 1).unwrap(), vec![INT3]);
}

#[test]
fn test_hardware_breakpoint_at_entry_is_hit()
{
    let mut process = launch_true();
    let entry = entry_point(&process);

    let id = process.create_breakpoint_site(entry, true, false).unwrap().id();
    process.enable_breakpoint_site(id).unwrap();
    // Hardware sites leave memory untouched
    assert_ne!(process.read_memory_without_traps(entry, 1).unwrap(), vec![INT3]);

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.info, SIGTRAP);
    assert_eq!(process.get_pc().unwrap(), entry);
    assert_eq!(process.breakpoint_sites().get_by_id(id).unwrap().hit_count(), 1);

    process.remove_breakpoint_site(id).unwrap();
    assert!(process.breakpoint_sites().is_empty());
    process.resume().unwrap();
    assert_eq!(process.wait_on_signal().unwrap().reason, ProcessState::Exited);
}

#[test]
fn test_signal_during_breakpoint_step_is_reported()
{
    let mut process = launch_true();
    let entry = entry_point(&process);
    let id = process.create_breakpoint_site(entry, false, false).unwrap().id();
    process.enable_breakpoint_site(id).unwrap();
    process.resume().unwrap();
    process.wait_on_signal().unwrap();

    // The step over the breakpoint stops with this signal instead of a trap
    send_signal(&process, Signal::SIGUSR1);
    process.resume().unwrap();
    assert_eq!(process.state(), ProcessState::Running);
    assert!(matches!(process.resume(), Err(DebuggerError::NotStopped)));

    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Stopped);
    assert_eq!(reason.info, SIGUSR1);
    assert_eq!(process.state(), ProcessState::Stopped);
    assert_eq!(process.read_memory_without_traps(entry, 1).unwrap(), vec![INT3]);

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);
    assert_eq!(reason.info, 0);
}

#[test]
fn test_continue_past_enabled_hardware_breakpoint()
{
    let mut process = launch_true();
    let entry = entry_point(&process);
    let id = process.create_breakpoint_site(entry, true, false).unwrap().id();
    process.enable_breakpoint_site(id).unwrap();
    let slot = process.breakpoint_sites().get_by_id(id).unwrap().hardware_slot();

    process.resume().unwrap();
    process.wait_on_signal().unwrap();
    assert_eq!(process.get_pc().unwrap(), entry);
    assert_eq!(process.triggered_hardware_slot(), slot);

    // The site stays enabled; continuing must not re-trigger it
    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);
    assert_eq!(reason.info, 0);
    assert_eq!(process.breakpoint_sites().get_by_id(id).unwrap().hit_count(), 1);
}

#[test]
fn test_hardware_stop_reports_triggered_slot()
{
    let mut process = launch_true();
    assert_eq!(process.triggered_hardware_slot(), None);

    let entry = entry_point(&process);
    let slot = process
        .set_hardware_stoppoint(entry, StoppointMode::Execute, 1)
        .unwrap();
    assert_eq!(slot, 0);

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.info, SIGTRAP);
    assert_eq!(process.get_pc().unwrap(), entry);
    assert_eq!(process.triggered_hardware_slot(), Some(0));
    // DR6 is cleared once the stop has been attributed
    assert_eq!(process.registers().read_by_id_as::<u64>(RegisterId::Dr6).unwrap() & 0xf, 0);

    process.clear_hardware_stoppoint(slot).unwrap();
    process.step_instruction().unwrap();
    assert_eq!(process.triggered_hardware_slot(), None);
}

#[test]
fn test_hardware_slots_run_out()
{
    let mut process = launch_true();
    let entry = entry_point(&process);

    let slots: Vec<_> = (0..4)
        .map(|offset| {
            process
                .set_hardware_stoppoint(entry + offset, StoppointMode::Execute, 1)
                .unwrap()
        })
        .collect();
    assert_eq!(slots, vec![0, 1, 2, 3]);

    let error = process
        .set_hardware_stoppoint(entry + 4, StoppointMode::Execute, 1)
        .unwrap_err();
    assert!(matches!(error, DebuggerError::NoFreeSlot { .. }));

    process.clear_hardware_stoppoint(2).unwrap();
    assert_eq!(process.set_watchpoint(entry.align_down(8), StoppointMode::Write, 8).unwrap(), 2);
}

#[test]
fn test_watchpoint_rejects_execute_mode()
{
    let mut process = launch_true();
    let entry = entry_point(&process);
    let error = process.set_watchpoint(entry, StoppointMode::Execute, 1).unwrap_err();
    assert!(matches!(error, DebuggerError::InvalidArgument(_)));

    let error = process
        .set_watchpoint(entry.align_down(8) + 1, StoppointMode::ReadWrite, 4)
        .unwrap_err();
    assert!(matches!(error, DebuggerError::InvalidArgument(_)));
}

#[test]
fn test_auxv_has_entry_point()
{
    let process = launch_true();
    let auxv = process.auxv().unwrap();
    assert!(auxv.contains_key(&AT_ENTRY));
    assert_ne!(auxv[&AT_ENTRY], 0);
}
