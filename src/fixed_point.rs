//! Fixed-point conversion between raw transport words and cooked values.
//!
//! A converter is a pure value object parameterized by the significant bit
//! width, the number of fractional bits and the signedness of a register
//! channel. Conversion routes through `f64`: every value a 32-bit raw word
//! can take, scaled by a power of two, is represented exactly there (short of
//! the extreme fractional-bit settings, where `f64` saturates the same way
//! the reference implementation's `double` does).
//!
//! Scaling coefficients and the representable raw range are precomputed at
//! construction so the per-word conversion stays branch-light.

use crate::error::{Error, Result};
use crate::user_types::UserType;

/// Smallest accepted number of fractional bits.
pub const MIN_FRACTIONAL_BITS: i32 = -1024;
/// Largest accepted number of fractional bits.
pub const MAX_FRACTIONAL_BITS: i32 = 1023;

/// Converts between packed raw words and cooked numeric/textual values.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPointConverter {
    width: u32,
    fractional_bits: i32,
    signed: bool,
    /// 2^-fractional_bits
    to_cooked_factor: f64,
    /// 2^fractional_bits
    to_raw_factor: f64,
    /// Smallest raw value, in the signed interpretation.
    raw_min: i64,
    /// Largest raw value, in the signed interpretation.
    raw_max: i64,
}

impl FixedPointConverter {
    /// Create a converter for `width` significant bits, `fractional_bits`
    /// fractional bits and the given signedness.
    ///
    /// `width` must lie in `[1, 32]` and `fractional_bits` in
    /// `[-1024, 1023]`; anything else is a logic error.
    pub fn new(width: u32, fractional_bits: i32, signed: bool) -> Result<Self> {
        if width == 0 || width > 32 {
            return Err(Error::logic(format!(
                "fixed point width {} is outside [1, 32]",
                width
            )));
        }
        if !(MIN_FRACTIONAL_BITS..=MAX_FRACTIONAL_BITS).contains(&fractional_bits) {
            return Err(Error::logic(format!(
                "fractional bit count {} is outside [{}, {}]",
                fractional_bits, MIN_FRACTIONAL_BITS, MAX_FRACTIONAL_BITS
            )));
        }

        let (raw_min, raw_max) = if signed {
            (-(1i64 << (width - 1)), (1i64 << (width - 1)) - 1)
        } else {
            (0, (1i64 << width) - 1)
        };

        Ok(FixedPointConverter {
            width,
            fractional_bits,
            signed,
            to_cooked_factor: 2f64.powi(-fractional_bits),
            to_raw_factor: 2f64.powi(fractional_bits),
            raw_min,
            raw_max,
        })
    }

    /// The identity converter: 32-bit signed integer, no fractional bits.
    pub fn identity() -> Self {
        FixedPointConverter {
            width: 32,
            fractional_bits: 0,
            signed: true,
            to_cooked_factor: 1.0,
            to_raw_factor: 1.0,
            raw_min: i32::MIN as i64,
            raw_max: i32::MAX as i64,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn fractional_bits(&self) -> i32 {
        self.fractional_bits
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Smallest cooked value the descriptor can hold.
    pub fn min_cooked(&self) -> f64 {
        self.raw_min as f64 * self.to_cooked_factor
    }

    /// Largest cooked value the descriptor can hold.
    pub fn max_cooked(&self) -> f64 {
        self.raw_max as f64 * self.to_cooked_factor
    }

    fn word_mask(&self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Interpret the low `width` bits of `raw` as a (sign-extended) integer.
    fn signed_raw(&self, raw: u32) -> i64 {
        let masked = (raw & self.word_mask()) as i64;
        if self.signed && (masked >> (self.width - 1)) & 1 == 1 {
            masked - (1i64 << self.width)
        } else {
            masked
        }
    }

    /// Cooked value of a raw word, as `f64`.
    pub fn cooked_f64(&self, raw: u32) -> f64 {
        self.signed_raw(raw) as f64 * self.to_cooked_factor
    }

    /// Scale, round (ties away from zero) and clamp a cooked value into the
    /// raw representation, masked to the significant bits.
    ///
    /// Overflow saturates silently at the descriptor's range; only values
    /// with no meaningful representation (NaN) produce a numeric-cast error.
    pub fn raw_from_f64(&self, value: f64) -> Result<u32> {
        if value.is_nan() {
            return Err(Error::numeric_cast(
                "NaN has no fixed point representation",
            ));
        }
        let scaled = value * self.to_raw_factor;
        let rounded = scaled.round();
        let clamped = if rounded >= self.raw_max as f64 {
            self.raw_max
        } else if rounded <= self.raw_min as f64 {
            self.raw_min
        } else {
            rounded as i64
        };
        Ok((clamped as u32) & self.word_mask())
    }

    /// Convert a raw word to the cooked user type.
    pub fn to_cooked<T: UserType>(&self, raw: u32) -> Result<T> {
        T::from_cooked_f64(self.cooked_f64(raw))
    }

    /// Convert a cooked user value to the raw word.
    pub fn to_raw<T: UserType>(&self, value: &T) -> Result<u32> {
        self.raw_from_f64(value.to_f64()?)
    }
}
