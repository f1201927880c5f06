//! Tests for platform-agnostic types

use trapline_core::types::{FromMemoryBytes, ProcessId, ProcessState, StopReason, VirtualAddress};

#[test]
fn test_process_id_from_u32()
{
    let pid = ProcessId::from(12345);
    assert_eq!(pid.0, 12345);
    let value: u32 = pid.into();
    assert_eq!(value, 12345);
    assert_eq!(pid.to_string(), "12345");
}

#[test]
fn test_address_arithmetic()
{
    let address = VirtualAddress::new(0x1000);
    assert_eq!(address + 0x10, VirtualAddress::new(0x1010));
    assert_eq!(address - 1, VirtualAddress::new(0xfff));

    let mut cursor = address;
    cursor += 8;
    cursor -= 2;
    assert_eq!(cursor.value(), 0x1006);
}

#[test]
fn test_address_arithmetic_wraps()
{
    assert_eq!(VirtualAddress::new(u64::MAX) + 1, VirtualAddress::ZERO);
    assert_eq!(VirtualAddress::ZERO - 1, VirtualAddress::new(u64::MAX));
    assert_eq!(VirtualAddress::new(u64::MAX).checked_add(1), None);
    assert_eq!(VirtualAddress::ZERO.checked_sub(1), None);
    assert_eq!(VirtualAddress::new(4).checked_sub(4), Some(VirtualAddress::ZERO));
}

#[test]
fn test_address_ordering()
{
    let low = VirtualAddress::new(0x400000);
    let high = VirtualAddress::new(0x400001);
    assert!(low < high);
    assert!(high >= low);
    assert_eq!(low.max(high), high);
}

#[test]
fn test_address_alignment()
{
    let address = VirtualAddress::new(0x401237);
    assert_eq!(address.align_down(8), VirtualAddress::new(0x401230));
    assert!(!address.is_aligned(2));
    assert!(VirtualAddress::new(0x401230).is_aligned(8));
    assert!(address.is_aligned(1));
}

#[test]
fn test_address_alignment_zero_is_identity()
{
    let address = VirtualAddress::new(0x401237);
    assert_eq!(address.align_down(0), address);
    assert_eq!(address.align_down(1), address);
    assert!(address.is_aligned(0));
}

#[test]
fn test_address_formatting()
{
    let address = VirtualAddress::new(0x401000);
    assert_eq!(address.to_string(), "0x0000000000401000");
    assert_eq!(format!("{address:x}"), "401000");
    assert_eq!(format!("{address:#x}"), "0x401000");
    assert_eq!(u64::from(address), 0x401000);
}

#[test]
fn test_process_state_is_finished()
{
    assert!(ProcessState::Exited.is_finished());
    assert!(ProcessState::Terminated.is_finished());
    assert!(!ProcessState::Stopped.is_finished());
    assert!(!ProcessState::Running.is_finished());
}

#[test]
fn test_stop_reason_constructors()
{
    let exited = StopReason::exited(3);
    assert_eq!(exited.reason, ProcessState::Exited);
    assert_eq!(exited.info, 3);

    let killed = StopReason::terminated(9);
    assert_eq!(killed.reason, ProcessState::Terminated);
    assert_eq!(killed.info, 9);

    let stopped = StopReason::stopped(19);
    assert_eq!(stopped.reason, ProcessState::Stopped);
    assert_eq!(stopped.info, 19);
}

#[test]
fn test_stop_reason_is_trap()
{
    assert!(StopReason::stopped(5).is_trap());
    assert!(!StopReason::stopped(11).is_trap());
    // An exit status of 5 is not a SIGTRAP
    assert!(!StopReason::exited(5).is_trap());
    assert!(!StopReason::terminated(5).is_trap());
}

#[test]
fn test_stop_reason_display()
{
    assert_eq!(StopReason::exited(0).to_string(), "exited with status 0");
    assert_eq!(StopReason::terminated(9).to_string(), "terminated with signal 9");
    assert_eq!(StopReason::stopped(5).to_string(), "stopped with signal 5");
}

#[test]
fn test_from_memory_bytes()
{
    let bytes = [0x78, 0x56, 0x34, 0x12, 0xef, 0xcd, 0xab, 0x90];
    assert_eq!(u32::from_memory_bytes(&bytes[..4]), Some(0x1234_5678));
    assert_eq!(u64::from_memory_bytes(&bytes), Some(0x90ab_cdef_1234_5678));
    assert_eq!(u8::from_memory_bytes(&bytes[..1]), Some(0x78));
    assert_eq!(<[u8; 2]>::from_memory_bytes(&bytes[..2]), Some([0x78, 0x56]));
    assert_eq!(f64::from_memory_bytes(&1.5f64.to_le_bytes()), Some(1.5));
}

#[test]
fn test_from_memory_bytes_wrong_length()
{
    assert_eq!(u32::from_memory_bytes(&[1, 2, 3]), None);
    assert_eq!(u16::from_memory_bytes(&[1, 2, 3]), None);
    assert_eq!(<u64 as FromMemoryBytes>::SIZE, 8);
}
