//! # Registers
//!
//! Typed access to the traced process's registers.
//!
//! [`Registers`] owns a byte-for-byte copy of the kernel's `struct user` for
//! the tracee. Reads decode a bounds-checked slice of that buffer using the
//! offset, size and format from the [catalog](catalog); writes encode a
//! [`RegisterValue`] back into it. The buffer is refreshed wholesale at every
//! stop, so reads between stops see a consistent snapshot rather than live
//! values.
//!
//! Writing through [`Registers::write`] only changes the snapshot. Use
//! [`Process::write_register`](crate::Process::write_register) to also flush
//! the change to the tracee.
//!
//! ## Example
//!
//! ```rust
//! use trapline_core::registers::{RegisterId, RegisterValue, Registers};
//!
//! let mut regs = Registers::new();
//! regs.write_by_id(RegisterId::Rax, RegisterValue::U64(0x1234))?;
//! assert_eq!(regs.read_by_id_as::<u64>(RegisterId::Rax)?, 0x1234);
//! assert_eq!(regs.read_by_id_as::<u16>(RegisterId::Ax)?, 0x1234);
//! # Ok::<(), trapline_core::DebuggerError>(())
//! ```

pub mod catalog;
pub mod extended;
pub mod value;

use std::fmt;
use std::mem::{offset_of, size_of};
use std::ops::Range;

pub use catalog::{
    register_info_by_dwarf, register_info_by_id, register_info_by_name, register_infos, RegisterClass,
    RegisterFormat, RegisterId, RegisterInfo,
};
pub use extended::ExtendedFloat;
pub use value::{FromRegisterValue, RegisterValue};

use crate::error::{DebuggerError, Result};

/// Size of `struct user`, the buffer [`Registers`] mirrors
pub const USER_AREA_SIZE: usize = size_of::<libc::user>();

/// Byte range of the general-purpose register set inside `struct user`
pub(crate) const GPR_RANGE: Range<usize> =
    offset_of!(libc::user, regs)..offset_of!(libc::user, regs) + size_of::<libc::user_regs_struct>();

/// Byte range of the x87/SSE register set inside `struct user`
pub(crate) const FPR_RANGE: Range<usize> =
    offset_of!(libc::user, i387)..offset_of!(libc::user, i387) + size_of::<libc::user_fpregs_struct>();

/// Snapshot of one thread's registers
#[derive(Clone, PartialEq, Eq)]
pub struct Registers
{
    data: Vec<u8>,
}

impl Registers
{
    /// An all-zero snapshot.
    #[must_use]
    pub fn new() -> Self
    {
        Self {
            data: vec![0; USER_AREA_SIZE],
        }
    }

    /// Read a register.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::InvalidArgument`] if the entry's range lies outside the
    /// snapshot.
    pub fn read(&self, info: &RegisterInfo) -> Result<RegisterValue>
    {
        RegisterValue::decode(info, self.slice(info)?)
    }

    /// Read a register by id.
    ///
    /// ## Errors
    ///
    /// See [`read`](Self::read).
    pub fn read_by_id(&self, id: RegisterId) -> Result<RegisterValue>
    {
        self.read(register_info_by_id(id))
    }

    /// Read a register and unpack it into `T`.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::SizeMismatch`] if the register's variant is not `T`.
    pub fn read_by_id_as<T: FromRegisterValue>(&self, id: RegisterId) -> Result<T>
    {
        let info = register_info_by_id(id);
        T::from_register_value(self.read(info)?).ok_or(DebuggerError::SizeMismatch {
            register: info.name,
            expected: info.size,
            actual: size_of::<T>(),
        })
    }

    /// Store a value in the snapshot.
    ///
    /// Only the width is checked: a `U64` may be written to a `Double`
    /// register, the bytes are copied as-is.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::SizeMismatch`] if `value.size() != info.size`.
    pub fn write(&mut self, info: &RegisterInfo, value: RegisterValue) -> Result<()>
    {
        if value.size() != info.size {
            return Err(DebuggerError::SizeMismatch {
                register: info.name,
                expected: info.size,
                actual: value.size(),
            });
        }

        let bytes = value.to_le_bytes();
        self.slice_mut(info)?.copy_from_slice(&bytes);
        Ok(())
    }

    /// Store a value by register id.
    ///
    /// ## Errors
    ///
    /// See [`write`](Self::write).
    pub fn write_by_id(&mut self, id: RegisterId, value: RegisterValue) -> Result<()>
    {
        self.write(register_info_by_id(id), value)
    }

    /// The whole `struct user` image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8]
    {
        &self.data
    }

    pub(crate) fn bytes_mut(&mut self, range: Range<usize>) -> Result<&mut [u8]>
    {
        let length = range.len();
        let start = range.start;
        self.data.get_mut(range).ok_or_else(|| out_of_bounds(start, length))
    }

    pub(crate) fn bytes(&self, range: Range<usize>) -> Result<&[u8]>
    {
        let length = range.len();
        let start = range.start;
        self.data.get(range).ok_or_else(|| out_of_bounds(start, length))
    }

    fn slice(&self, info: &RegisterInfo) -> Result<&[u8]>
    {
        self.bytes(info.offset..info.offset + info.size)
    }

    fn slice_mut(&mut self, info: &RegisterInfo) -> Result<&mut [u8]>
    {
        self.bytes_mut(info.offset..info.offset + info.size)
    }
}

fn out_of_bounds(offset: usize, length: usize) -> DebuggerError
{
    DebuggerError::InvalidArgument(format!(
        "register range {offset}..{} exceeds the {USER_AREA_SIZE}-byte user area",
        offset + length
    ))
}

impl Default for Registers
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl fmt::Debug for Registers
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let mut debug = f.debug_struct("Registers");
        for id in [RegisterId::Rip, RegisterId::Rsp, RegisterId::Rbp, RegisterId::Eflags] {
            if let Ok(value) = self.read_by_id(id) {
                debug.field(register_info_by_id(id).name, &format_args!("{value}"));
            }
        }
        debug.finish_non_exhaustive()
    }
}
