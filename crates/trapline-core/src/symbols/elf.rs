//! ELF images backed by an owned byte buffer.

use std::fs;
use std::path::{Path, PathBuf};

use object::{BinaryFormat, Object, ObjectSection, ObjectSymbol, SymbolKind};
use rustc_demangle::try_demangle;
use tracing::debug;

use super::{SymbolLocation, SymbolResolver};
use crate::error::{DebuggerError, Result};
use crate::types::VirtualAddress;

/// An ELF file held in memory.
///
/// All header, section and symbol access goes through `object`, which checks
/// every offset against the buffer length before slicing. The file is parsed
/// once on construction to reject non-ELF input and re-parsed (header only)
/// on each lookup.
#[derive(Clone)]
pub struct ElfImage
{
    path: Option<PathBuf>,
    data: Vec<u8>,
    entry: u64,
}

impl ElfImage
{
    /// Read and validate the ELF file at `path`.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::Io`] if the file cannot be read,
    /// [`DebuggerError::MalformedInput`] if it is not an ELF image.
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref();
        let mut image = Self::parse(fs::read(path)?)?;
        image.path = Some(path.to_path_buf());
        debug!("Loaded ELF image {} (entry {:#x})", path.display(), image.entry);
        Ok(image)
    }

    /// Validate an in-memory ELF image.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::MalformedInput`] if `data` is not an ELF image.
    pub fn parse(data: Vec<u8>) -> Result<Self>
    {
        let entry = {
            let file = object::File::parse(data.as_slice())
                .map_err(|err| DebuggerError::MalformedInput(format!("failed to parse object file: {err}")))?;
            if file.format() != BinaryFormat::Elf {
                return Err(DebuggerError::MalformedInput(format!(
                    "expected an ELF image, found {:?}",
                    file.format()
                )));
            }
            file.entry()
        };

        Ok(Self { path: None, data, entry })
    }

    fn file(&self) -> Option<object::File<'_>>
    {
        object::File::parse(self.data.as_slice()).ok()
    }

    /// Path the image was loaded from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    /// `e_entry` from the ELF header.
    #[must_use]
    pub fn entry(&self) -> VirtualAddress
    {
        VirtualAddress::new(self.entry)
    }

    /// Offset between runtime and link-time addresses, given the runtime
    /// entry point (`AT_ENTRY`).
    #[must_use]
    pub fn load_bias(&self, runtime_entry: VirtualAddress) -> u64
    {
        runtime_entry.value().wrapping_sub(self.entry)
    }

    /// Raw bytes of a section. Sections without file contents yield an empty
    /// slice.
    #[must_use]
    pub fn section_contents(&self, name: &str) -> Option<&[u8]>
    {
        self.file()?.section_by_name(name)?.data().ok()
    }

    /// The function symbol covering a file address, demangled, with the
    /// offset of `address` into it.
    #[must_use]
    pub fn symbol_containing(&self, address: VirtualAddress) -> Option<(String, u64)>
    {
        let file = self.file()?;
        let symbol = file
            .symbols()
            .chain(file.dynamic_symbols())
            .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.is_definition())
            .find(|symbol| {
                let location = SymbolLocation {
                    address: VirtualAddress::new(symbol.address()),
                    size: symbol.size(),
                };
                location.contains(address)
            })?;

        let raw = symbol.name().ok()?;
        let name = try_demangle(raw).map_or_else(|_| raw.to_string(), |demangled| format!("{demangled:#}"));
        Some((name, address.value() - symbol.address()))
    }
}

impl SymbolResolver for ElfImage
{
    fn resolve(&self, name: &str) -> Option<SymbolLocation>
    {
        let file = self.file()?;

        if let Some(section) = file.section_by_name(name) {
            return Some(SymbolLocation {
                address: VirtualAddress::new(section.address()),
                size: section.size(),
            });
        }

        file.symbols()
            .chain(file.dynamic_symbols())
            .find(|symbol| symbol.is_definition() && symbol.name().is_ok_and(|symbol_name| symbol_name == name))
            .map(|symbol| SymbolLocation {
                address: VirtualAddress::new(symbol.address()),
                size: symbol.size(),
            })
    }
}

impl std::fmt::Debug for ElfImage
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ElfImage")
            .field("path", &self.path)
            .field("size", &self.data.len())
            .field("entry", &format_args!("{:#x}", self.entry))
            .finish()
    }
}
