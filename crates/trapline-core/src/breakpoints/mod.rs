//! Breakpoint and watchpoint bookkeeping.
//!
//! This module keeps the lifecycle of installed stop points (ids, addresses,
//! enabled state) separate from the mechanics of installing them. A stop point
//! never stores a reference to the process it is installed in: every operation
//! that touches the target takes a [`StoppointOperations`] implementation as an
//! explicit argument. The process owns a [`StoppointCollection`] and lends
//! itself (or rather its tracee handle) to the sites it holds.
//!
//! ## Ids
//!
//! Ids are issued by the collection from a counter that only ever grows, so
//! an id is never reused, not even after the stop point it named was removed.

pub mod site;

use std::collections::BTreeMap;
use std::fmt;

pub use site::BreakpointSite;

use crate::error::{DebuggerError, Result};
use crate::types::VirtualAddress;

/// The x86 `int3` instruction used for software breakpoints
pub const INT3: u8 = 0xcc;

/// Number of address slots in the x86-64 debug registers (DR0-DR3)
pub const HARDWARE_SLOTS: usize = 4;

/// Unique identifier for a stop point managed by the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoppointId(u64);

impl StoppointId
{
    /// Create a new identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for StoppointId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// What a hardware stop point triggers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoppointMode
{
    /// Instruction fetch at the address
    Execute,
    /// Data write
    Write,
    /// Data read or write
    ReadWrite,
}

/// Target-side primitives stop points need to install and remove themselves.
///
/// Implemented by the tracee handle inside [`Process`](crate::Process); tests
/// substitute an in-memory fake. Memory access through this trait is always
/// raw: it sees (and writes) trap bytes as they are.
pub trait StoppointOperations
{
    /// Read `amount` bytes at `address` exactly as they are in target memory.
    ///
    /// ## Errors
    ///
    /// Fails if the range is not readable in full.
    fn read_memory_without_traps(&self, address: VirtualAddress, amount: usize) -> Result<Vec<u8>>;

    /// Write `data` at `address` verbatim.
    ///
    /// ## Errors
    ///
    /// Fails if the range is not writable.
    fn write_memory_raw(&mut self, address: VirtualAddress, data: &[u8]) -> Result<()>;

    /// Claim a debug-register slot for an execute breakpoint at `address`.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NoFreeSlot`] when every slot is taken.
    fn set_hardware_breakpoint(&mut self, id: StoppointId, address: VirtualAddress) -> Result<usize>;

    /// Release a slot previously returned by
    /// [`set_hardware_breakpoint`](Self::set_hardware_breakpoint).
    ///
    /// ## Errors
    ///
    /// Fails if the debug registers cannot be updated.
    fn clear_hardware_stoppoint(&mut self, slot: usize) -> Result<()>;
}

/// Anything that can live in a [`StoppointCollection`].
pub trait Stoppoint
{
    /// Identifier issued by the owning collection
    fn id(&self) -> StoppointId;

    /// Address the stop point is set at
    fn address(&self) -> VirtualAddress;

    /// Whether the stop point is currently installed
    fn is_enabled(&self) -> bool;

    /// Internal stop points are hidden from user-facing listings.
    fn is_internal(&self) -> bool
    {
        false
    }

    /// `true` if the address lies in `[low, high)`.
    fn in_range(&self, low: VirtualAddress, high: VirtualAddress) -> bool
    {
        low <= self.address() && self.address() < high
    }

    /// Install the stop point. Idempotent.
    ///
    /// ## Errors
    ///
    /// Propagates target access failures and slot exhaustion.
    fn enable<Ops: StoppointOperations + ?Sized>(&mut self, ops: &mut Ops) -> Result<()>;

    /// Remove the stop point from the target. Idempotent.
    ///
    /// ## Errors
    ///
    /// Propagates target access failures.
    fn disable<Ops: StoppointOperations + ?Sized>(&mut self, ops: &mut Ops) -> Result<()>;
}

/// Id-ordered container of stop points with unique addresses.
#[derive(Debug)]
pub struct StoppointCollection<T: Stoppoint>
{
    next_id: u64,
    points: BTreeMap<StoppointId, T>,
}

impl<T: Stoppoint> Default for StoppointCollection<T>
{
    fn default() -> Self
    {
        Self {
            next_id: 0,
            points: BTreeMap::new(),
        }
    }
}

impl<T: Stoppoint> StoppointCollection<T>
{
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Issue a fresh id and insert the stop point `make` builds with it.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::DuplicateAddress`] if a stop point already occupies
    /// `address`; no id is consumed in that case.
    pub fn insert_with(&mut self, address: VirtualAddress, make: impl FnOnce(StoppointId) -> T) -> Result<&mut T>
    {
        if self.contains_address(address) {
            return Err(DebuggerError::DuplicateAddress(address));
        }

        self.next_id += 1;
        let id = StoppointId::from_raw(self.next_id);
        Ok(self.points.entry(id).or_insert(make(id)))
    }

    /// `true` if a stop point with this id exists.
    #[must_use]
    pub fn contains_id(&self, id: StoppointId) -> bool
    {
        self.points.contains_key(&id)
    }

    /// `true` if a stop point is set at this address.
    #[must_use]
    pub fn contains_address(&self, address: VirtualAddress) -> bool
    {
        self.points.values().any(|point| point.address() == address)
    }

    /// `true` if an enabled stop point is set at this address.
    #[must_use]
    pub fn enabled_stoppoint_at_address(&self, address: VirtualAddress) -> bool
    {
        self.points
            .values()
            .any(|point| point.address() == address && point.is_enabled())
    }

    /// Look up a stop point by id.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::BreakpointIdNotFound`] if there is none.
    pub fn get_by_id(&self, id: StoppointId) -> Result<&T>
    {
        self.points.get(&id).ok_or(DebuggerError::BreakpointIdNotFound(id.raw()))
    }

    /// Look up a stop point by id for modification.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::BreakpointIdNotFound`] if there is none.
    pub fn get_by_id_mut(&mut self, id: StoppointId) -> Result<&mut T>
    {
        self.points
            .get_mut(&id)
            .ok_or(DebuggerError::BreakpointIdNotFound(id.raw()))
    }

    /// Look up the stop point at an address.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NoBreakpoint`] if there is none.
    pub fn get_by_address(&self, address: VirtualAddress) -> Result<&T>
    {
        self.points
            .values()
            .find(|point| point.address() == address)
            .ok_or(DebuggerError::NoBreakpoint(address))
    }

    /// Look up the stop point at an address for modification.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NoBreakpoint`] if there is none.
    pub fn get_by_address_mut(&mut self, address: VirtualAddress) -> Result<&mut T>
    {
        self.points
            .values_mut()
            .find(|point| point.address() == address)
            .ok_or(DebuggerError::NoBreakpoint(address))
    }

    /// Disable the stop point, then drop it.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::BreakpointIdNotFound`] for an unknown id, or the
    /// failure from disabling it (the stop point is kept in that case).
    pub fn remove_by_id<Ops: StoppointOperations + ?Sized>(&mut self, id: StoppointId, ops: &mut Ops) -> Result<()>
    {
        self.get_by_id_mut(id)?.disable(ops)?;
        self.points.remove(&id);
        Ok(())
    }

    /// Disable the stop point at `address`, then drop it.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::NoBreakpoint`] if nothing is set there, or the failure
    /// from disabling it.
    pub fn remove_by_address<Ops: StoppointOperations + ?Sized>(
        &mut self,
        address: VirtualAddress,
        ops: &mut Ops,
    ) -> Result<()>
    {
        let id = self.get_by_address(address)?.id();
        self.remove_by_id(id, ops)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &T>
    {
        self.points.values()
    }

    /// Iterate mutably in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T>
    {
        self.points.values_mut()
    }

    /// Call `f` on every stop point in id order.
    pub fn for_each(&self, f: impl FnMut(&T))
    {
        self.points.values().for_each(f);
    }

    /// Stop points that are not internal, in id order.
    pub fn user_visible(&self) -> impl Iterator<Item = &T>
    {
        self.points.values().filter(|point| !point.is_internal())
    }

    /// Stop points whose address lies in `[low, high)`, in id order.
    #[must_use]
    pub fn get_in_region(&self, low: VirtualAddress, high: VirtualAddress) -> Vec<&T>
    {
        self.points.values().filter(|point| point.in_range(low, high)).collect()
    }

    /// Number of stop points.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.points.len()
    }

    /// `true` if there are none.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.points.is_empty()
    }
}
