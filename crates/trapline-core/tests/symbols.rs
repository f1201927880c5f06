//! Tests for ELF symbol resolution

use trapline_core::error::DebuggerError;
use trapline_core::symbols::{ElfImage, SymbolLocation, SymbolResolver};
use trapline_core::types::VirtualAddress;

#[cfg(target_os = "linux")]
fn own_image() -> ElfImage
{
    ElfImage::open("/proc/self/exe").unwrap()
}

#[test]
#[cfg(target_os = "linux")]
fn test_resolves_text_section()
{
    let image = own_image();
    let text = image.resolve(".text").unwrap();
    assert!(text.size > 0);
    assert!(image.entry() >= text.address);
    assert!(text.contains(image.entry()));
    assert!(!image.section_contents(".text").unwrap().is_empty());
}

#[test]
#[cfg(target_os = "linux")]
fn test_resolves_main_and_maps_back()
{
    let image = own_image();
    let main = image.resolve("main").unwrap();
    assert_ne!(main.address, VirtualAddress::ZERO);

    let (name, offset) = image.symbol_containing(main.address + 1).unwrap();
    assert_eq!(offset, 1);
    assert_eq!(image.resolve(&name).unwrap().address, main.address);
}

#[test]
#[cfg(target_os = "linux")]
fn test_unknown_names_do_not_resolve()
{
    let image = own_image();
    assert_eq!(image.resolve("no_such_symbol_anywhere"), None);
    assert_eq!(image.section_contents(".no_such_section"), None);
}

#[test]
#[cfg(target_os = "linux")]
fn test_load_bias()
{
    let image = own_image();
    let entry = image.entry();
    assert_eq!(image.load_bias(entry), 0);
    assert_eq!(image.load_bias(entry + 0x5555_0000), 0x5555_0000);
    assert_eq!(image.path().unwrap().to_str(), Some("/proc/self/exe"));
}

#[test]
fn test_parse_rejects_non_elf()
{
    let error = ElfImage::parse(b"definitely not an object file".to_vec()).unwrap_err();
    assert!(matches!(error, DebuggerError::MalformedInput(_)));

    let error = ElfImage::parse(Vec::new()).unwrap_err();
    assert!(matches!(error, DebuggerError::MalformedInput(_)));
}

#[test]
fn test_parse_rejects_truncated_header()
{
    let error = ElfImage::parse(b"\x7fELF\x02\x01\x01".to_vec()).unwrap_err();
    assert!(matches!(error, DebuggerError::MalformedInput(_)));
}

#[test]
fn test_open_missing_file()
{
    let error = ElfImage::open("/nonexistent/trapline/image").unwrap_err();
    assert!(matches!(error, DebuggerError::Io(_)));
}

#[test]
fn test_symbol_location_contains()
{
    let location = SymbolLocation {
        address: VirtualAddress::new(0x1000),
        size: 0x20,
    };
    assert!(location.contains(VirtualAddress::new(0x1000)));
    assert!(location.contains(VirtualAddress::new(0x101f)));
    assert!(!location.contains(VirtualAddress::new(0x1020)));
    assert!(!location.contains(VirtualAddress::new(0xfff)));
    assert_eq!(location.to_string(), "0x0000000000001000 (32 bytes)");

    let empty = SymbolLocation {
        address: VirtualAddress::new(0x1000),
        size: 0,
    };
    assert!(!empty.contains(VirtualAddress::new(0x1000)));
}
