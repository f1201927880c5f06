//! x87 80-bit extended precision values.
//!
//! The FPU stack registers (`st0`-`st7`) hold 80-bit floats stored in
//! 16-byte slots of the FXSAVE area:
//!
//! | Bytes   | Contents                                     |
//! |---------|----------------------------------------------|
//! | 0..8    | 64-bit significand with explicit integer bit |
//! | 8..10   | sign (bit 15) and 15-bit biased exponent     |
//! | 10..16  | unused                                       |
//!
//! Rust has no native 80-bit float, so values are converted through `f64`.
//! Normal `f64` values survive a round trip through [`ExtendedFloat`]
//! exactly; extended values with more than 53 significant bits are rounded
//! when converted to `f64`.

use std::fmt;

const EXPONENT_BIAS: i32 = 16383;
const EXPONENT_MASK: u16 = 0x7fff;
const INTEGER_BIT: u64 = 1 << 63;
const F64_EXPONENT_BIAS: i32 = 1023;

/// An x87 extended precision value in its 16-byte register storage form
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtendedFloat
{
    bytes: [u8; 16],
}

impl ExtendedFloat
{
    /// Wrap the raw 16-byte register contents.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self
    {
        Self { bytes }
    }

    /// Build a value from its sign, biased exponent, and significand.
    #[must_use]
    pub fn from_parts(negative: bool, biased_exponent: u16, significand: u64) -> Self
    {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&significand.to_le_bytes());
        let sign_exponent = (biased_exponent & EXPONENT_MASK) | if negative { 0x8000 } else { 0 };
        bytes[8..10].copy_from_slice(&sign_exponent.to_le_bytes());
        Self { bytes }
    }

    /// The raw 16-byte register contents.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 16]
    {
        self.bytes
    }

    /// The 64-bit significand, including the explicit integer bit.
    #[must_use]
    pub fn significand(&self) -> u64
    {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.bytes[..8]);
        u64::from_le_bytes(raw)
    }

    /// The 15-bit biased exponent.
    #[must_use]
    pub fn biased_exponent(&self) -> u16
    {
        self.sign_exponent() & EXPONENT_MASK
    }

    /// `true` if the sign bit is set.
    #[must_use]
    pub fn is_sign_negative(&self) -> bool
    {
        self.sign_exponent() & 0x8000 != 0
    }

    fn sign_exponent(&self) -> u16
    {
        u16::from_le_bytes([self.bytes[8], self.bytes[9]])
    }

    /// Convert to the nearest `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64
    {
        let exponent = self.biased_exponent();
        let significand = self.significand();

        let magnitude = match exponent {
            0 if significand == 0 => 0.0,
            // Denormals use the minimum exponent without an implicit bit
            0 => scale(significand as f64, 1 - EXPONENT_BIAS - 63),
            EXPONENT_MASK if significand << 1 == 0 => f64::INFINITY,
            EXPONENT_MASK => f64::NAN,
            _ => scale(significand as f64, i32::from(exponent) - EXPONENT_BIAS - 63),
        };

        if self.is_sign_negative() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Convert from `f64`. Every `f64` (including subnormals) is representable.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn from_f64(value: f64) -> Self
    {
        let bits = value.to_bits();
        let negative = bits >> 63 != 0;
        let exponent = ((bits >> 52) & 0x7ff) as i32;
        let fraction = bits & ((1 << 52) - 1);

        match exponent {
            0x7ff if fraction == 0 => Self::from_parts(negative, EXPONENT_MASK, INTEGER_BIT),
            0x7ff => Self::from_parts(negative, EXPONENT_MASK, INTEGER_BIT | (1 << 62) | (fraction << 11)),
            0 if fraction == 0 => Self::from_parts(negative, 0, 0),
            0 => {
                // f64 subnormal: fraction * 2^-1074, renormalised so the top bit is set
                let shift = fraction.leading_zeros();
                let unbiased = -1011 - shift as i32;
                Self::from_parts(negative, (unbiased + EXPONENT_BIAS) as u16, fraction << shift)
            }
            _ => {
                let unbiased = exponent - F64_EXPONENT_BIAS;
                Self::from_parts(negative, (unbiased + EXPONENT_BIAS) as u16, INTEGER_BIT | (fraction << 11))
            }
        }
    }
}

/// Multiply `value` by `2^exponent` without overflowing intermediate powers.
fn scale(mut value: f64, mut exponent: i32) -> f64
{
    const STEP: i32 = 1000;

    while exponent > STEP {
        value *= 2f64.powi(STEP);
        exponent -= STEP;
        if value.is_infinite() {
            return value;
        }
    }
    while exponent < -STEP {
        value *= 2f64.powi(-STEP);
        exponent += STEP;
        if value == 0.0 {
            return value;
        }
    }
    value * 2f64.powi(exponent)
}

impl From<f64> for ExtendedFloat
{
    fn from(value: f64) -> Self
    {
        Self::from_f64(value)
    }
}

impl fmt::Debug for ExtendedFloat
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ExtendedFloat")
            .field("negative", &self.is_sign_negative())
            .field("exponent", &format_args!("{:#06x}", self.biased_exponent()))
            .field("significand", &format_args!("{:#018x}", self.significand()))
            .finish()
    }
}

impl fmt::Display for ExtendedFloat
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Display::fmt(&self.to_f64(), f)
    }
}
