//! User-side value types accepted by typed accessors.
//!
//! Every accessor buffer holds values of a type implementing [`UserType`].
//! The trait routes conversions through `f64`, which holds every 32-bit raw
//! word scaled by a power of two exactly. Two conversion directions exist:
//!
//! - *cooked* conversion ([`UserType::from_cooked_f64`]) saturates integers
//!   silently, matching the fixed-point engine's contract;
//! - *checked* conversion ([`UserType::from_f64_checked`]) raises a
//!   numeric-cast error on unrepresentable values, matching the cast
//!   decorator's contract.

use crate::error::{Error, Result};

/// A value type an accessor buffer can hold.
pub trait UserType: Clone + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Name used in diagnostics.
    fn type_name() -> &'static str;

    /// Lossy-for-giant-integers but exact for every 32-bit raw payload.
    /// Fails with a numeric-cast error for unparseable text.
    fn to_f64(&self) -> Result<f64>;

    /// Convert a cooked value, saturating integers and rejecting only values
    /// with no meaningful representation (NaN).
    fn from_cooked_f64(value: f64) -> Result<Self>;

    /// Convert a value, rejecting anything outside the representable range.
    fn from_f64_checked(value: f64) -> Result<Self>;

    /// Reinterpret a raw transport word. Only the raw word type supports
    /// this; it backs the `raw` access mode.
    fn from_raw_bits(_bits: u32) -> Result<Self> {
        Err(Error::logic(format!(
            "raw access mode is not supported for user type {}",
            Self::type_name()
        )))
    }

    /// Inverse of [`UserType::from_raw_bits`].
    fn to_raw_bits(&self) -> Result<u32> {
        Err(Error::logic(format!(
            "raw access mode is not supported for user type {}",
            Self::type_name()
        )))
    }

    /// Build a value from register text (ASCII registers).
    fn from_text(_text: &str) -> Result<Self> {
        Err(Error::logic(format!(
            "text registers are not supported for user type {}",
            Self::type_name()
        )))
    }

    /// Render the value as register text (ASCII registers).
    fn to_text(&self) -> String {
        format!("{:?}", self)
    }
}

macro_rules! impl_user_type_for_int {
    ($($t:ty),*) => {$(
        impl UserType for $t {
            fn type_name() -> &'static str {
                stringify!($t)
            }

            fn to_f64(&self) -> Result<f64> {
                Ok(*self as f64)
            }

            fn from_cooked_f64(value: f64) -> Result<Self> {
                if value.is_nan() {
                    return Err(Error::numeric_cast(format!(
                        "NaN cannot be converted to {}",
                        Self::type_name()
                    )));
                }
                let rounded = value.round();
                if rounded >= <$t>::MAX as f64 {
                    Ok(<$t>::MAX)
                } else if rounded <= <$t>::MIN as f64 {
                    Ok(<$t>::MIN)
                } else {
                    Ok(rounded as $t)
                }
            }

            fn from_f64_checked(value: f64) -> Result<Self> {
                if value.is_nan() {
                    return Err(Error::numeric_cast(format!(
                        "NaN cannot be converted to {}",
                        Self::type_name()
                    )));
                }
                let rounded = value.round();
                // The MAX comparison is conservative for 64-bit types whose
                // MAX is not exactly representable in f64; saturating there
                // would be wrong for a checked conversion anyway.
                if rounded > <$t>::MAX as f64 || rounded < <$t>::MIN as f64 {
                    return Err(Error::numeric_cast(format!(
                        "{} does not fit into {}",
                        value,
                        Self::type_name()
                    )));
                }
                Ok(rounded as $t)
            }
        }
    )*};
}

impl_user_type_for_int!(i8, i16, i64, u8, u16, u32, u64);

// i32 is the raw transport word type and additionally supports bit
// reinterpretation for the raw access mode.
impl UserType for i32 {
    fn type_name() -> &'static str {
        "i32"
    }

    fn to_f64(&self) -> Result<f64> {
        Ok(*self as f64)
    }

    fn from_cooked_f64(value: f64) -> Result<Self> {
        if value.is_nan() {
            return Err(Error::numeric_cast("NaN cannot be converted to i32"));
        }
        let rounded = value.round();
        if rounded >= i32::MAX as f64 {
            Ok(i32::MAX)
        } else if rounded <= i32::MIN as f64 {
            Ok(i32::MIN)
        } else {
            Ok(rounded as i32)
        }
    }

    fn from_f64_checked(value: f64) -> Result<Self> {
        if value.is_nan() {
            return Err(Error::numeric_cast("NaN cannot be converted to i32"));
        }
        let rounded = value.round();
        if rounded > i32::MAX as f64 || rounded < i32::MIN as f64 {
            return Err(Error::numeric_cast(format!("{} does not fit into i32", value)));
        }
        Ok(rounded as i32)
    }

    fn from_raw_bits(bits: u32) -> Result<Self> {
        Ok(bits as i32)
    }

    fn to_raw_bits(&self) -> Result<u32> {
        Ok(*self as u32)
    }
}

impl UserType for f32 {
    fn type_name() -> &'static str {
        "f32"
    }

    fn to_f64(&self) -> Result<f64> {
        Ok(*self as f64)
    }

    fn from_cooked_f64(value: f64) -> Result<Self> {
        Ok(value as f32)
    }

    fn from_f64_checked(value: f64) -> Result<Self> {
        if value.is_finite() && (value as f32).is_infinite() {
            return Err(Error::numeric_cast(format!("{} does not fit into f32", value)));
        }
        Ok(value as f32)
    }
}

impl UserType for f64 {
    fn type_name() -> &'static str {
        "f64"
    }

    fn to_f64(&self) -> Result<f64> {
        Ok(*self)
    }

    fn from_cooked_f64(value: f64) -> Result<Self> {
        Ok(value)
    }

    fn from_f64_checked(value: f64) -> Result<Self> {
        Ok(value)
    }
}

impl UserType for bool {
    fn type_name() -> &'static str {
        "bool"
    }

    fn to_f64(&self) -> Result<f64> {
        Ok(if *self { 1.0 } else { 0.0 })
    }

    fn from_cooked_f64(value: f64) -> Result<Self> {
        if value.is_nan() {
            return Err(Error::numeric_cast("NaN cannot be converted to bool"));
        }
        Ok(value != 0.0)
    }

    fn from_f64_checked(value: f64) -> Result<Self> {
        Self::from_cooked_f64(value)
    }
}

impl UserType for String {
    fn type_name() -> &'static str {
        "String"
    }

    fn to_f64(&self) -> Result<f64> {
        self.trim()
            .parse::<f64>()
            .map_err(|_| Error::numeric_cast(format!("'{}' is not a number", self)))
    }

    fn from_cooked_f64(value: f64) -> Result<Self> {
        Ok(format!("{}", value))
    }

    fn from_f64_checked(value: f64) -> Result<Self> {
        Self::from_cooked_f64(value)
    }

    fn from_text(text: &str) -> Result<Self> {
        Ok(text.to_string())
    }

    fn to_text(&self) -> String {
        self.clone()
    }
}

/// The value type of void accessors. Carries no data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Void;

impl UserType for Void {
    fn type_name() -> &'static str {
        "Void"
    }

    fn to_f64(&self) -> Result<f64> {
        Ok(0.0)
    }

    fn from_cooked_f64(_value: f64) -> Result<Self> {
        Ok(Void)
    }

    fn from_f64_checked(_value: f64) -> Result<Self> {
        Ok(Void)
    }
}

/// Convert between two user types, raising a numeric-cast error for values
/// that the target type cannot represent.
pub fn convert_user_type<T: UserType, S: UserType>(source: &S) -> Result<T> {
    T::from_f64_checked(source.to_f64()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_saturation_is_silent() {
        assert_eq!(i16::from_cooked_f64(1e9).unwrap(), i16::MAX);
        assert_eq!(i16::from_cooked_f64(-1e9).unwrap(), i16::MIN);
        assert_eq!(u8::from_cooked_f64(-5.0).unwrap(), 0);
    }

    #[test]
    fn test_checked_conversion_rejects_overflow() {
        assert!(i16::from_f64_checked(1e9).unwrap_err().is_numeric_cast());
        assert!(u8::from_f64_checked(-1.0).unwrap_err().is_numeric_cast());
        assert_eq!(i16::from_f64_checked(-3.0).unwrap(), -3);
    }

    #[test]
    fn test_rounding_ties_away_from_zero() {
        assert_eq!(i32::from_cooked_f64(2.5).unwrap(), 3);
        assert_eq!(i32::from_cooked_f64(-2.5).unwrap(), -3);
        assert_eq!(i32::from_cooked_f64(2.4).unwrap(), 2);
    }

    #[test]
    fn test_nan_is_a_cast_error() {
        assert!(i32::from_cooked_f64(f64::NAN).unwrap_err().is_numeric_cast());
        assert!(bool::from_cooked_f64(f64::NAN).unwrap_err().is_numeric_cast());
    }

    #[test]
    fn test_string_round_trip() {
        let s = String::from_cooked_f64(-3.125).unwrap();
        assert_eq!(s, "-3.125");
        assert_eq!(s.to_f64().unwrap(), -3.125);
        assert_eq!(String::from_cooked_f64(42.0).unwrap(), "42");
        assert!("abc".to_string().to_f64().unwrap_err().is_numeric_cast());
    }

    #[test]
    fn test_raw_bits_only_for_i32() {
        assert_eq!(i32::from_raw_bits(0xFFFF_FFFF).unwrap(), -1);
        assert_eq!((-1i32).to_raw_bits().unwrap(), 0xFFFF_FFFF);
        assert!(u32::from_raw_bits(1).unwrap_err().is_logic());
    }

    #[test]
    fn test_convert_user_type() {
        let v: i64 = convert_user_type(&42u8).unwrap();
        assert_eq!(v, 42);
        let err = convert_user_type::<u8, _>(&300i32).unwrap_err();
        assert!(err.is_numeric_cast());
    }
}
