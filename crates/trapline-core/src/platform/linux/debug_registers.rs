//! # x86-64 Debug Register Encoding
//!
//! Functions to allocate and encode hardware stop points in DR7.
//!
//! DR0-DR3 hold the addresses; DR7 controls them:
//!
//! | Bits            | Meaning for slot `n`                         |
//! |-----------------|----------------------------------------------|
//! | `2n`, `2n + 1`  | local / global enable                        |
//! | `16 + 4n` (2)   | R/W: `00` execute, `01` write, `11` read/write |
//! | `18 + 4n` (2)   | LEN: `00` 1, `01` 2, `11` 4, `10` 8 bytes    |
//!
//! DR6 reports which slot fired in its low four bits.
//!
//! Everything here is a pure function of the register values, so the
//! slot bookkeeping is testable without a tracee.

use crate::breakpoints::{StoppointMode, HARDWARE_SLOTS};
use crate::error::{DebuggerError, Result};
use crate::types::VirtualAddress;

/// Index of the first slot whose enable bits are clear in `control` (DR7).
///
/// ## Errors
///
/// [`DebuggerError::NoFreeSlot`] when all four slots are enabled.
pub fn find_free_slot(control: u64) -> Result<usize>
{
    (0..HARDWARE_SLOTS)
        .find(|slot| (control >> (slot * 2)) & 0b11 == 0)
        .ok_or(DebuggerError::NoFreeSlot {
            slots: HARDWARE_SLOTS,
        })
}

/// R/W field value for `mode`.
#[must_use]
pub const fn mode_bits(mode: StoppointMode) -> u64
{
    match mode {
        StoppointMode::Execute => 0b00,
        StoppointMode::Write => 0b01,
        StoppointMode::ReadWrite => 0b11,
    }
}

/// LEN field value for a watched range of `size` bytes.
///
/// ## Errors
///
/// [`DebuggerError::InvalidArgument`] unless `size` is 1, 2, 4 or 8.
pub fn size_bits(size: usize) -> Result<u64>
{
    match size {
        1 => Ok(0b00),
        2 => Ok(0b01),
        4 => Ok(0b11),
        8 => Ok(0b10),
        _ => Err(DebuggerError::InvalidArgument(format!(
            "hardware stop point size must be 1, 2, 4 or 8 bytes, not {size}"
        ))),
    }
}

/// Check that the CPU can watch `size` bytes at `address` in `mode`.
///
/// ## Errors
///
/// [`DebuggerError::InvalidArgument`] for execute stop points wider than one
/// byte, unsupported sizes, or addresses not aligned to `size`.
pub fn validate(address: VirtualAddress, mode: StoppointMode, size: usize) -> Result<()>
{
    size_bits(size)?;
    if mode == StoppointMode::Execute && size != 1 {
        return Err(DebuggerError::InvalidArgument(format!(
            "execute stop points must be 1 byte wide, not {size}"
        )));
    }
    if !address.is_aligned(size as u64) {
        return Err(DebuggerError::InvalidArgument(format!(
            "address {address} is not aligned to {size} bytes"
        )));
    }
    Ok(())
}

/// Mask of every DR7 bit that belongs to `slot`.
#[must_use]
pub const fn slot_mask(slot: usize) -> u64
{
    (0b11 << (slot * 2)) | (0b1111 << (slot * 4 + 16))
}

/// `control` with `slot` enabled for `mode` over `size` bytes.
///
/// ## Errors
///
/// [`DebuggerError::InvalidArgument`] for a slot outside `0..4` or an
/// unsupported size.
pub fn enable_slot(control: u64, slot: usize, mode: StoppointMode, size: usize) -> Result<u64>
{
    if slot >= HARDWARE_SLOTS {
        return Err(DebuggerError::InvalidArgument(format!("no hardware slot {slot}")));
    }

    let enable = 1 << (slot * 2);
    let mode = mode_bits(mode) << (slot * 4 + 16);
    let size = size_bits(size)? << (slot * 4 + 18);
    Ok((control & !slot_mask(slot)) | enable | mode | size)
}

/// `control` with every bit of `slot` cleared.
#[must_use]
pub const fn clear_slot(control: u64, slot: usize) -> u64
{
    control & !slot_mask(slot)
}

/// The slot DR6 reports as triggered, if any.
#[must_use]
pub fn triggered_slot(status: u64) -> Option<usize>
{
    (0..HARDWARE_SLOTS).find(|slot| status & (1 << slot) != 0)
}
