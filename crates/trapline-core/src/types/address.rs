//! Virtual address type.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Strongly typed address in the traced process's virtual address space
///
/// This wrapper around `u64` keeps addresses from being mixed up with sizes,
/// counts, or register values. There is deliberately no `From<u64>`: building
/// an address from an integer is always spelled [`VirtualAddress::new`].
///
/// Offsets are applied with `+`/`-` against `u64` and wrap on overflow, which
/// matches how the CPU computes addresses. Use [`checked_add`](Self::checked_add)
/// when the range must not wrap.
///
/// ## Example
///
/// ```rust
/// use trapline_core::types::VirtualAddress;
///
/// let addr = VirtualAddress::new(0x1000);
/// let next_addr = addr + 0x100; // Add offset
/// assert_eq!(next_addr.value(), 0x1100);
/// assert!(addr < next_addr);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualAddress(u64);

impl VirtualAddress
{
    /// The null address (0x0)
    pub const ZERO: Self = VirtualAddress(0);

    /// Create a new address from a raw `u64` value
    ///
    /// ```rust
    /// use trapline_core::types::VirtualAddress;
    ///
    /// const LOAD_BASE: VirtualAddress = VirtualAddress::new(0x40_0000);
    /// assert_eq!(LOAD_BASE.value(), 0x40_0000);
    /// ```
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        VirtualAddress(value)
    }

    /// Get the raw `u64` value of this address
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use trapline_core::types::VirtualAddress;
    ///
    /// let addr = VirtualAddress::new(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(VirtualAddress::new(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(VirtualAddress)
    }

    /// Subtract an offset from this address, checking for underflow
    #[must_use]
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(VirtualAddress)
    }

    /// Round down to a multiple of `alignment` (which must be a power of two).
    /// An alignment of 0 is treated as 1.
    #[must_use]
    pub const fn align_down(self, alignment: u64) -> Self
    {
        VirtualAddress(self.0 & !alignment.saturating_sub(1))
    }

    /// `true` if the address is a multiple of `alignment` (a power of two).
    /// Every address is aligned to 0 and 1.
    #[must_use]
    pub const fn is_aligned(self, alignment: u64) -> bool
    {
        self.0 & alignment.saturating_sub(1) == 0
    }
}

impl From<VirtualAddress> for u64
{
    fn from(address: VirtualAddress) -> Self
    {
        address.0
    }
}

impl fmt::Display for VirtualAddress
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for VirtualAddress
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for VirtualAddress
{
    type Output = VirtualAddress;

    fn add(self, rhs: u64) -> Self::Output
    {
        VirtualAddress(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u64> for VirtualAddress
{
    fn add_assign(&mut self, rhs: u64)
    {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl Sub<u64> for VirtualAddress
{
    type Output = VirtualAddress;

    fn sub(self, rhs: u64) -> Self::Output
    {
        VirtualAddress(self.0.wrapping_sub(rhs))
    }
}

impl SubAssign<u64> for VirtualAddress
{
    fn sub_assign(&mut self, rhs: u64)
    {
        self.0 = self.0.wrapping_sub(rhs);
    }
}
