//! Breakpoint sites.
//!
//! A site is one concrete trap in the target: either an `int3` byte patched
//! over the instruction at its address (software) or a debug-register slot
//! configured to fire on instruction fetch (hardware).

use tracing::{debug, trace};

use super::{Stoppoint, StoppointCollection, StoppointId, StoppointOperations, INT3};
use crate::error::{DebuggerError, Result};
use crate::types::VirtualAddress;

/// A single installed (or installable) breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSite
{
    id: StoppointId,
    address: VirtualAddress,
    enabled: bool,
    hardware: bool,
    internal: bool,
    saved_data: Option<u8>,
    hardware_slot: Option<usize>,
    hit_count: u64,
}

impl BreakpointSite
{
    /// A disabled site. Sites are normally created through
    /// [`Process::create_breakpoint_site`](crate::Process::create_breakpoint_site),
    /// which issues the id.
    #[must_use]
    pub fn new(id: StoppointId, address: VirtualAddress, hardware: bool, internal: bool) -> Self
    {
        Self {
            id,
            address,
            enabled: false,
            hardware,
            internal,
            saved_data: None,
            hardware_slot: None,
            hit_count: 0,
        }
    }

    /// `true` for debug-register sites.
    #[must_use]
    pub const fn is_hardware(&self) -> bool
    {
        self.hardware
    }

    /// The original byte the trap replaced, while a software site is enabled.
    #[must_use]
    pub const fn saved_data(&self) -> Option<u8>
    {
        self.saved_data
    }

    /// The debug-register slot held while a hardware site is enabled.
    #[must_use]
    pub const fn hardware_slot(&self) -> Option<usize>
    {
        self.hardware_slot
    }

    /// How many stops this site has caused.
    #[must_use]
    pub const fn hit_count(&self) -> u64
    {
        self.hit_count
    }

    /// `true` if this is an enabled software site, i.e. an `int3` sits at its
    /// address in target memory.
    #[must_use]
    pub const fn has_trap_installed(&self) -> bool
    {
        self.enabled && !self.hardware && self.saved_data.is_some()
    }

    pub(crate) fn record_hit(&mut self)
    {
        self.hit_count = self.hit_count.saturating_add(1);
    }

    pub(crate) fn set_saved_data(&mut self, byte: u8)
    {
        self.saved_data = Some(byte);
    }
}

impl Stoppoint for BreakpointSite
{
    fn id(&self) -> StoppointId
    {
        self.id
    }

    fn address(&self) -> VirtualAddress
    {
        self.address
    }

    fn is_enabled(&self) -> bool
    {
        self.enabled
    }

    fn is_internal(&self) -> bool
    {
        self.internal
    }

    fn enable<Ops: StoppointOperations + ?Sized>(&mut self, ops: &mut Ops) -> Result<()>
    {
        if self.enabled {
            return Ok(());
        }

        if self.hardware {
            let slot = ops.set_hardware_breakpoint(self.id, self.address)?;
            debug!("Breakpoint {} at {} uses hardware slot {}", self.id, self.address, slot);
            self.hardware_slot = Some(slot);
        } else {
            let original = ops.read_memory_without_traps(self.address, 1)?;
            let byte = *original.first().ok_or_else(|| DebuggerError::MemoryAccess {
                address: self.address,
                length: 1,
                reason: "empty read".to_string(),
            })?;
            ops.write_memory_raw(self.address, &[INT3])?;
            trace!("Installed int3 for breakpoint {} at {} (original {:#04x})", self.id, self.address, byte);
            self.saved_data = Some(byte);
        }

        self.enabled = true;
        Ok(())
    }

    fn disable<Ops: StoppointOperations + ?Sized>(&mut self, ops: &mut Ops) -> Result<()>
    {
        if !self.enabled {
            return Ok(());
        }

        if self.hardware {
            if let Some(slot) = self.hardware_slot {
                ops.clear_hardware_stoppoint(slot)?;
                debug!("Breakpoint {} released hardware slot {}", self.id, slot);
                self.hardware_slot = None;
            }
        } else if let Some(byte) = self.saved_data {
            ops.write_memory_raw(self.address, &[byte])?;
            trace!("Restored {:#04x} at {} for breakpoint {}", byte, self.address, self.id);
            self.saved_data = None;
        }

        self.enabled = false;
        Ok(())
    }
}

impl StoppointCollection<BreakpointSite>
{
    /// The enabled software site at `address`, if any.
    #[must_use]
    pub fn trap_at(&self, address: VirtualAddress) -> Option<StoppointId>
    {
        self.iter()
            .find(|site| site.address() == address && site.has_trap_installed())
            .map(Stoppoint::id)
    }

    /// Replace every `int3` this collection planted in `bytes` (read from
    /// `address`) with the original byte it covers.
    pub fn mask_traps(&self, address: VirtualAddress, bytes: &mut [u8])
    {
        let end = address + bytes.len() as u64;
        let installed = self
            .iter()
            .filter(|site| site.has_trap_installed() && site.in_range(address, end));
        for site in installed {
            let offset = usize::try_from(site.address().value() - address.value()).unwrap_or(usize::MAX);
            if let (Some(byte), Some(original)) = (bytes.get_mut(offset), site.saved_data) {
                *byte = original;
            }
        }
    }

    /// Prepare `data` for a verbatim write at `address` without losing traps.
    ///
    /// Every enabled software site inside the range keeps its trap: the
    /// caller's byte at that position is swapped for `int3` in `data` and
    /// returned as the site's new original, to be recorded with
    /// [`adopt_original_bytes`](Self::adopt_original_bytes) once the write
    /// succeeded. Disabling the site later restores what the caller wrote.
    #[must_use]
    pub fn preserve_traps(&self, address: VirtualAddress, data: &mut [u8]) -> Vec<(StoppointId, u8)>
    {
        let end = address + data.len() as u64;
        let mut adopted = Vec::new();
        let installed = self
            .iter()
            .filter(|site| site.has_trap_installed() && site.in_range(address, end));
        for site in installed {
            let offset = usize::try_from(site.address().value() - address.value()).unwrap_or(usize::MAX);
            if let Some(byte) = data.get_mut(offset) {
                adopted.push((site.id(), *byte));
                *byte = INT3;
            }
        }
        adopted
    }

    /// Record new original bytes computed by [`preserve_traps`](Self::preserve_traps).
    pub fn adopt_original_bytes(&mut self, adopted: &[(StoppointId, u8)])
    {
        for (id, byte) in adopted {
            if let Ok(site) = self.get_by_id_mut(*id) {
                site.set_saved_data(*byte);
            }
        }
    }
}
