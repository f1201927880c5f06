//! # Symbols
//!
//! Turning names into addresses.
//!
//! The process-control core never parses binaries itself. Callers that want to
//! plant a breakpoint on `main` or `.text` ask a [`SymbolResolver`] for the
//! file address and then add the load bias themselves. [`ElfImage`] is the
//! resolver for ELF executables and shared objects.
//!
//! ## Load bias
//!
//! Addresses returned here are file (link-time) addresses. For a
//! position-independent executable add the difference between the runtime
//! entry point (`AT_ENTRY` from [`Process::auxv`](crate::Process::auxv)) and
//! [`ElfImage::entry`].

mod elf;

use std::fmt;

pub use elf::ElfImage;

use crate::types::VirtualAddress;

/// Where a section or symbol lives in the file's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolLocation
{
    /// Link-time address
    pub address: VirtualAddress,
    /// Size in bytes (0 when the binary does not record one)
    pub size: u64,
}

impl SymbolLocation
{
    /// `true` if `address` falls inside `[address, address + size)`.
    #[must_use]
    pub fn contains(&self, address: VirtualAddress) -> bool
    {
        self.address <= address && address.value() < self.address.value().saturating_add(self.size)
    }
}

impl fmt::Display for SymbolLocation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} ({} bytes)", self.address, self.size)
    }
}

/// Resolves section and symbol names to file addresses.
pub trait SymbolResolver
{
    /// Look up `name` as a section first, then as a defined symbol.
    fn resolve(&self, name: &str) -> Option<SymbolLocation>;
}
