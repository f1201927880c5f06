//! Typed register values.

use std::fmt;

use smallvec::SmallVec;

use super::catalog::{RegisterFormat, RegisterInfo};
use super::extended::ExtendedFloat;
use crate::error::{DebuggerError, Result};

/// Value of a single register
///
/// The variant must match the register's `(format, size)` pair; writes check
/// the width and fail with [`DebuggerError::SizeMismatch`] otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue
{
    /// 8-bit integer
    U8(u8),
    /// 16-bit integer
    U16(u16),
    /// 32-bit integer
    U32(u32),
    /// 64-bit integer
    U64(u64),
    /// IEEE-754 double
    F64(f64),
    /// x87 extended precision
    ExtendedDouble(ExtendedFloat),
    /// 8 raw bytes (MMX)
    Byte64([u8; 8]),
    /// 16 raw bytes (XMM)
    Byte128([u8; 16]),
}

impl RegisterValue
{
    /// Width of the value in bytes.
    #[must_use]
    pub const fn size(&self) -> usize
    {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
            Self::U64(_) | Self::F64(_) | Self::Byte64(_) => 8,
            Self::ExtendedDouble(_) | Self::Byte128(_) => 16,
        }
    }

    /// Little-endian bytes as they are stored in the register blob.
    #[must_use]
    pub fn to_le_bytes(&self) -> SmallVec<[u8; 16]>
    {
        match self {
            Self::U8(value) => SmallVec::from_slice(&[*value]),
            Self::U16(value) => SmallVec::from_slice(&value.to_le_bytes()),
            Self::U32(value) => SmallVec::from_slice(&value.to_le_bytes()),
            Self::U64(value) => SmallVec::from_slice(&value.to_le_bytes()),
            Self::F64(value) => SmallVec::from_slice(&value.to_le_bytes()),
            Self::ExtendedDouble(value) => SmallVec::from_slice(&value.to_bytes()),
            Self::Byte64(bytes) => SmallVec::from_slice(bytes),
            Self::Byte128(bytes) => SmallVec::from_slice(bytes),
        }
    }

    /// Decode `bytes` as the register described by `info` expects.
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::SizeMismatch`] if `bytes` is not `info.size` long or the
    /// catalog pairs a format with a width no variant carries.
    pub fn decode(info: &RegisterInfo, bytes: &[u8]) -> Result<Self>
    {
        let mismatch = || DebuggerError::SizeMismatch {
            register: info.name,
            expected: info.size,
            actual: bytes.len(),
        };
        if bytes.len() != info.size {
            return Err(mismatch());
        }

        let value = match (info.format, info.size) {
            (RegisterFormat::UnsignedInteger, 1) => Self::U8(bytes[0]),
            (RegisterFormat::UnsignedInteger, 2) => Self::U16(u16::from_le_bytes(array(bytes).ok_or_else(mismatch)?)),
            (RegisterFormat::UnsignedInteger, 4) => Self::U32(u32::from_le_bytes(array(bytes).ok_or_else(mismatch)?)),
            (RegisterFormat::UnsignedInteger, 8) => Self::U64(u64::from_le_bytes(array(bytes).ok_or_else(mismatch)?)),
            (RegisterFormat::Double, 8) => Self::F64(f64::from_le_bytes(array(bytes).ok_or_else(mismatch)?)),
            (RegisterFormat::ExtendedDouble, 16) => {
                Self::ExtendedDouble(ExtendedFloat::from_bytes(array(bytes).ok_or_else(mismatch)?))
            }
            (RegisterFormat::Vector, 8) => Self::Byte64(array(bytes).ok_or_else(mismatch)?),
            (RegisterFormat::Vector, 16) => Self::Byte128(array(bytes).ok_or_else(mismatch)?),
            _ => return Err(mismatch()),
        };
        Ok(value)
    }

    /// Parse user-supplied text into the variant `info` requires.
    ///
    /// - integers: hexadecimal, `0x` prefix optional (`"0x1234"`, `"ff"`)
    /// - doubles and extended doubles: decimal float syntax (`"3.5"`, `"-1e10"`)
    /// - vectors: exactly `info.size` hex bytes, `"[0x01,0x02,...]"`
    ///
    /// ## Errors
    ///
    /// [`DebuggerError::MalformedInput`] when the text does not parse or does not
    /// fit the register.
    pub fn parse(info: &RegisterInfo, text: &str) -> Result<Self>
    {
        let text = text.trim();
        let malformed = |detail: &str| DebuggerError::MalformedInput(format!("{detail} for {}: {text:?}", info.name));

        match info.format {
            RegisterFormat::UnsignedInteger => {
                let value = parse_hex(text).ok_or_else(|| malformed("invalid hexadecimal integer"))?;
                let narrowed = match info.size {
                    1 => u8::try_from(value).ok().map(Self::U8),
                    2 => u16::try_from(value).ok().map(Self::U16),
                    4 => u32::try_from(value).ok().map(Self::U32),
                    8 => Some(Self::U64(value)),
                    _ => None,
                };
                narrowed.ok_or_else(|| malformed("value out of range"))
            }
            RegisterFormat::Double => text.parse::<f64>().map(Self::F64).map_err(|_| malformed("invalid float")),
            RegisterFormat::ExtendedDouble => text
                .parse::<f64>()
                .map(|value| Self::ExtendedDouble(ExtendedFloat::from_f64(value)))
                .map_err(|_| malformed("invalid float")),
            RegisterFormat::Vector => {
                let bytes = parse_vector(text).ok_or_else(|| malformed("invalid byte vector"))?;
                let value = match (info.size, bytes.len()) {
                    (8, 8) => array(&bytes).map(Self::Byte64),
                    (16, 16) => array(&bytes).map(Self::Byte128),
                    _ => None,
                };
                value.ok_or_else(|| malformed(&format!("expected {} bytes", info.size)))
            }
        }
    }
}

fn array<const N: usize>(bytes: &[u8]) -> Option<[u8; N]>
{
    bytes.try_into().ok()
}

fn parse_hex(text: &str) -> Option<u64>
{
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn parse_vector(text: &str) -> Option<Vec<u8>>
{
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;
    inner
        .split(',')
        .map(|item| parse_hex(item.trim()).and_then(|value| u8::try_from(value).ok()))
        .collect()
}

fn write_bytes(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result
{
    f.write_str("[")?;
    for (index, byte) in bytes.iter().enumerate() {
        if index > 0 {
            f.write_str(",")?;
        }
        write!(f, "{byte:#04x}")?;
    }
    f.write_str("]")
}

impl fmt::Display for RegisterValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::U8(value) => write!(f, "{value:#04x}"),
            Self::U16(value) => write!(f, "{value:#06x}"),
            Self::U32(value) => write!(f, "{value:#010x}"),
            Self::U64(value) => write!(f, "{value:#018x}"),
            Self::F64(value) => write!(f, "{value}"),
            Self::ExtendedDouble(value) => write!(f, "{value}"),
            Self::Byte64(bytes) => write_bytes(f, bytes),
            Self::Byte128(bytes) => write_bytes(f, bytes),
        }
    }
}

/// Types a [`RegisterValue`] can be unpacked into
///
/// Used by [`Registers::read_by_id_as`](super::Registers::read_by_id_as);
/// unpacking only succeeds for the exact matching variant.
pub trait FromRegisterValue: Sized
{
    /// Unpack `value`, or `None` if it holds a different variant.
    fn from_register_value(value: RegisterValue) -> Option<Self>;
}

macro_rules! register_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for RegisterValue
            {
                fn from(value: $ty) -> Self
                {
                    Self::$variant(value)
                }
            }

            impl FromRegisterValue for $ty
            {
                fn from_register_value(value: RegisterValue) -> Option<Self>
                {
                    match value {
                        RegisterValue::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

register_value_conversions! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f64 => F64,
    ExtendedFloat => ExtendedDouble,
    [u8; 8] => Byte64,
    [u8; 16] => Byte128,
}
