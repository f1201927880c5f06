//! Register and memory access for one traced pid.
//!
//! [`Tracee`] is the half of a [`Process`](super::Process) that breakpoint
//! sites need: it implements [`StoppointOperations`], so the process can lend
//! it to a site while the breakpoint collection is borrowed separately.

use std::io::IoSliceMut;

use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::unistd::Pid;
use tracing::{debug, trace};

use super::debug_registers;
use super::ptrace::{self, RegisterSet};
use crate::breakpoints::{StoppointId, StoppointMode, StoppointOperations};
use crate::error::{DebuggerError, Result};
use crate::registers::{
    register_info_by_id, RegisterClass, RegisterId, RegisterInfo, RegisterValue, Registers, FPR_RANGE, GPR_RANGE,
};
use crate::types::VirtualAddress;

const PAGE_SIZE: u64 = 0x1000;
const WORD_SIZE: usize = 8;

#[derive(Debug)]
pub(crate) struct Tracee
{
    pub(crate) pid: Pid,
    pub(crate) registers: Registers,
}

impl Tracee
{
    pub(crate) fn new(pid: Pid) -> Self
    {
        Self {
            pid,
            registers: Registers::new(),
        }
    }

    /// Refresh the whole register snapshot from the kernel.
    pub(crate) fn read_all_registers(&mut self) -> Result<()>
    {
        ptrace::read_register_set(self.pid, RegisterSet::General, self.registers.bytes_mut(GPR_RANGE)?)?;
        ptrace::read_register_set(self.pid, RegisterSet::FloatingPoint, self.registers.bytes_mut(FPR_RANGE)?)?;

        for index in 0..8 {
            if let Some(id) = RegisterId::debug(index) {
                let info = register_info_by_id(id);
                let value = ptrace::peek_user(self.pid, info.offset)?;
                self.registers.write(info, RegisterValue::U64(value))?;
            }
        }
        trace!("Refreshed registers for PID {}", self.pid);
        Ok(())
    }

    /// Update the snapshot and push the containing register set to the kernel.
    pub(crate) fn write_register(&mut self, info: &RegisterInfo, value: RegisterValue) -> Result<()>
    {
        self.registers.write(info, value)?;

        match info.class {
            RegisterClass::GeneralPurpose => {
                ptrace::write_register_set(self.pid, RegisterSet::General, self.registers.bytes(GPR_RANGE)?)
            }
            RegisterClass::FloatingPoint => {
                ptrace::write_register_set(self.pid, RegisterSet::FloatingPoint, self.registers.bytes(FPR_RANGE)?)
            }
            RegisterClass::Debug => {
                // POKEUSER transfers whole words at word-aligned offsets
                let offset = info.offset & !(WORD_SIZE - 1);
                let word = self.registers.bytes(offset..offset + WORD_SIZE)?;
                let mut raw = [0u8; WORD_SIZE];
                raw.copy_from_slice(word);
                ptrace::poke_user(self.pid, offset, u64::from_le_bytes(raw))
            }
        }
    }

    pub(crate) fn write_register_by_id(&mut self, id: RegisterId, value: RegisterValue) -> Result<()>
    {
        self.write_register(register_info_by_id(id), value)
    }

    /// Program a free debug-register slot and return its index.
    pub(crate) fn set_hardware_stoppoint(
        &mut self,
        address: VirtualAddress,
        mode: StoppointMode,
        size: usize,
    ) -> Result<usize>
    {
        debug_registers::validate(address, mode, size)?;

        let control = self.registers.read_by_id_as::<u64>(RegisterId::Dr7)?;
        let slot = debug_registers::find_free_slot(control)?;
        let updated = debug_registers::enable_slot(control, slot, mode, size)?;
        let address_register = RegisterId::debug(slot).ok_or(DebuggerError::NoFreeSlot {
            slots: crate::breakpoints::HARDWARE_SLOTS,
        })?;

        self.write_register_by_id(address_register, RegisterValue::U64(address.value()))?;
        self.write_register_by_id(RegisterId::Dr7, RegisterValue::U64(updated))?;
        debug!("Hardware stop point at {} ({:?}, {} bytes) uses slot {}", address, mode, size, slot);
        Ok(slot)
    }

    /// Slot reported by DR6 for the most recent debug exception.
    pub(crate) fn triggered_hardware_slot(&self) -> Result<Option<usize>>
    {
        let status = self.registers.read_by_id_as::<u64>(RegisterId::Dr6)?;
        Ok(debug_registers::triggered_slot(status))
    }
}

fn memory_error(address: VirtualAddress, length: usize, reason: String) -> DebuggerError
{
    DebuggerError::MemoryAccess { address, length, reason }
}

impl StoppointOperations for Tracee
{
    fn read_memory_without_traps(&self, address: VirtualAddress, amount: usize) -> Result<Vec<u8>>
    {
        let mut buffer = vec![0u8; amount];
        if amount == 0 {
            return Ok(buffer);
        }

        // One remote iovec per page so a fault only truncates the tail
        let mut remote = Vec::new();
        let mut cursor = address.value();
        let mut remaining = amount as u64;
        while remaining > 0 {
            let to_page_end = PAGE_SIZE - (cursor % PAGE_SIZE);
            let chunk = remaining.min(to_page_end);
            remote.push(RemoteIoVec {
                base: usize::try_from(cursor).map_err(|_| memory_error(address, amount, "address overflow".into()))?,
                len: usize::try_from(chunk).map_err(|_| memory_error(address, amount, "length overflow".into()))?,
            });
            remaining -= chunk;
            cursor = cursor.wrapping_add(chunk);
        }

        let read = process_vm_readv(self.pid, &mut [IoSliceMut::new(&mut buffer)], &remote)
            .map_err(|errno| memory_error(address, amount, errno.desc().to_string()))?;
        if read < amount {
            return Err(memory_error(address, amount, format!("only {read} bytes readable")));
        }
        Ok(buffer)
    }

    fn write_memory_raw(&mut self, address: VirtualAddress, data: &[u8]) -> Result<()>
    {
        let mut written = 0;
        while written < data.len() {
            let target = address + written as u64;
            let remaining = &data[written..];

            let mut word = [0u8; WORD_SIZE];
            if remaining.len() >= WORD_SIZE {
                word.copy_from_slice(&remaining[..WORD_SIZE]);
            } else {
                // Merge the tail with the bytes that follow it in the target
                let existing = self.read_memory_without_traps(target, WORD_SIZE)?;
                word.copy_from_slice(&existing);
                word[..remaining.len()].copy_from_slice(remaining);
            }

            ptrace::poke_data(self.pid, target, u64::from_le_bytes(word)).map_err(|error| match error {
                DebuggerError::SystemCall { errno, .. } => memory_error(
                    target,
                    data.len() - written,
                    std::io::Error::from_raw_os_error(errno).to_string(),
                ),
                other => other,
            })?;
            written += WORD_SIZE;
        }
        trace!("Wrote {} bytes at {} in PID {}", data.len(), address, self.pid);
        Ok(())
    }

    fn set_hardware_breakpoint(&mut self, id: StoppointId, address: VirtualAddress) -> Result<usize>
    {
        trace!("Allocating hardware slot for breakpoint {}", id);
        self.set_hardware_stoppoint(address, StoppointMode::Execute, 1)
    }

    fn clear_hardware_stoppoint(&mut self, slot: usize) -> Result<()>
    {
        let control = self.registers.read_by_id_as::<u64>(RegisterId::Dr7)?;
        let address_register = RegisterId::debug(slot)
            .filter(|_| slot < crate::breakpoints::HARDWARE_SLOTS)
            .ok_or_else(|| DebuggerError::InvalidArgument(format!("no hardware slot {slot}")))?;

        self.write_register_by_id(RegisterId::Dr7, RegisterValue::U64(debug_registers::clear_slot(control, slot)))?;
        self.write_register_by_id(address_register, RegisterValue::U64(0))?;
        debug!("Released hardware slot {}", slot);
        Ok(())
    }
}
