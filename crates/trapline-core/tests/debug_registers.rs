//! Tests for DR7 slot allocation and encoding

#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use trapline_core::breakpoints::StoppointMode;
use trapline_core::error::DebuggerError;
use trapline_core::platform::linux::debug_registers::{
    clear_slot, enable_slot, find_free_slot, mode_bits, size_bits, slot_mask, triggered_slot, validate,
};
use trapline_core::types::VirtualAddress;

#[test]
fn test_find_free_slot_in_order()
{
    assert_eq!(find_free_slot(0).unwrap(), 0);
    assert_eq!(find_free_slot(0b01).unwrap(), 1);
    // A global enable bit also marks the slot as taken
    assert_eq!(find_free_slot(0b10).unwrap(), 1);
    assert_eq!(find_free_slot(0b0101).unwrap(), 2);
    assert_eq!(find_free_slot(0b01_0001).unwrap(), 1);
}

#[test]
fn test_find_free_slot_exhausted()
{
    let error = find_free_slot(0b0101_0101).unwrap_err();
    assert!(matches!(error, DebuggerError::NoFreeSlot { slots: 4 }));
}

#[test]
fn test_field_encodings()
{
    assert_eq!(mode_bits(StoppointMode::Execute), 0b00);
    assert_eq!(mode_bits(StoppointMode::Write), 0b01);
    assert_eq!(mode_bits(StoppointMode::ReadWrite), 0b11);

    assert_eq!(size_bits(1).unwrap(), 0b00);
    assert_eq!(size_bits(2).unwrap(), 0b01);
    assert_eq!(size_bits(4).unwrap(), 0b11);
    assert_eq!(size_bits(8).unwrap(), 0b10);
    assert!(matches!(size_bits(3), Err(DebuggerError::InvalidArgument(_))));
    assert!(size_bits(16).is_err());
}

#[test]
fn test_slot_mask()
{
    assert_eq!(slot_mask(0), 0x000f_0003);
    assert_eq!(slot_mask(1), 0x00f0_000c);
    assert_eq!(slot_mask(3), 0xf000_00c0);
}

#[test]
fn test_enable_execute_slot()
{
    let control = enable_slot(0, 0, StoppointMode::Execute, 1).unwrap();
    assert_eq!(control, 0b01);
}

#[test]
fn test_enable_write_watchpoint()
{
    // Slot 2, write, 8 bytes: enable bit 4, R/W bits 24-25 = 01, LEN bits 26-27 = 10
    let control = enable_slot(0, 2, StoppointMode::Write, 8).unwrap();
    assert_eq!(control, (1 << 4) | (0b01 << 24) | (0b10 << 26));
}

#[test]
fn test_enable_preserves_other_slots()
{
    let first = enable_slot(0, 0, StoppointMode::ReadWrite, 4).unwrap();
    let both = enable_slot(first, 1, StoppointMode::Execute, 1).unwrap();
    assert_eq!(both & slot_mask(0), first);
    assert_eq!(find_free_slot(both).unwrap(), 2);
}

#[test]
fn test_enable_overwrites_stale_slot_bits()
{
    let stale = enable_slot(0, 1, StoppointMode::ReadWrite, 8).unwrap();
    let control = enable_slot(clear_slot(stale, 1) | (0b11 << 20), 1, StoppointMode::Execute, 1).unwrap();
    assert_eq!(control, 1 << 2);
}

#[test]
fn test_enable_rejects_bad_slot()
{
    assert!(matches!(
        enable_slot(0, 4, StoppointMode::Execute, 1),
        Err(DebuggerError::InvalidArgument(_))
    ));
}

#[test]
fn test_clear_slot()
{
    let control = enable_slot(0, 0, StoppointMode::Write, 2).unwrap();
    let control = enable_slot(control, 3, StoppointMode::Execute, 1).unwrap();
    let cleared = clear_slot(control, 0);

    assert_eq!(cleared & slot_mask(0), 0);
    assert_eq!(cleared, enable_slot(0, 3, StoppointMode::Execute, 1).unwrap());
    assert_eq!(find_free_slot(cleared).unwrap(), 0);
}

#[test]
fn test_triggered_slot()
{
    assert_eq!(triggered_slot(0), None);
    assert_eq!(triggered_slot(0b0100), Some(2));
    // Bits above the four slot bits (BS, BD, ...) do not name a slot
    assert_eq!(triggered_slot(0xffff_0ff0), None);
    assert_eq!(triggered_slot(0xffff_0ff1), Some(0));
}

#[test]
fn test_validate()
{
    let aligned = VirtualAddress::new(0x1000);
    assert!(validate(aligned, StoppointMode::Execute, 1).is_ok());
    assert!(validate(aligned, StoppointMode::Write, 8).is_ok());
    assert!(validate(aligned + 2, StoppointMode::ReadWrite, 2).is_ok());

    assert!(matches!(
        validate(aligned, StoppointMode::Execute, 4),
        Err(DebuggerError::InvalidArgument(_))
    ));
    assert!(validate(aligned + 2, StoppointMode::Write, 4).is_err());
    assert!(validate(aligned, StoppointMode::Write, 3).is_err());
}
