//! Error taxonomy for the register-access layer.
//!
//! Every failure the crate reports falls into one of three categories:
//!
//! - **`Logic`**: a caller contract was broken (device not open, register not
//!   writeable, accessor misused, path absent, type mismatch in raw mode).
//!   These indicate a bug in the calling code. They are never retried and
//!   never latched onto an accessor.
//! - **`Runtime`**: a transient, possibly recoverable condition (I/O failure,
//!   transport reset, device closed by the peer). Runtime errors are latched
//!   into the affected accessor during the transfer phase, re-raised from the
//!   post phase, and route the backend through the recovery path.
//! - **`NumericCast`**: a value could not be represented in the requested
//!   type. Treated as a data problem, not a transport problem: the transfer
//!   itself succeeded but the conversion could not deliver the value.
//!
//! Transfer cycles gather errors, run every element's post phase regardless,
//! and re-raise at the end in a defined order (runtime first, then numeric
//! cast). See [`crate::transfer::TransferGroup`] for the exact rules.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for the register-access layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A caller contract was violated. Fix the calling code; no state changed.
    #[error("logic error: {0}")]
    Logic(String),

    /// A transient, possibly recoverable transport condition. Elements
    /// touched by the failing cycle are in undefined state; inspect
    /// `data_validity`.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A value could not be represented in the requested numeric type.
    #[error("numeric cast error: {0}")]
    NumericCast(String),
}

impl Error {
    pub fn logic(message: impl Into<String>) -> Self {
        Error::Logic(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }

    pub fn numeric_cast(message: impl Into<String>) -> Self {
        Error::NumericCast(message.into())
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, Error::Logic(_))
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, Error::Runtime(_))
    }

    pub fn is_numeric_cast(&self) -> bool {
        matches!(self, Error::NumericCast(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::logic("register /A/B is not writeable");
        assert_eq!(err.to_string(), "logic error: register /A/B is not writeable");
        assert!(err.is_logic());
        assert!(!err.is_runtime());
    }

    #[test]
    fn test_error_predicates() {
        assert!(Error::runtime("link down").is_runtime());
        assert!(Error::numeric_cast("1e9 exceeds i16").is_numeric_cast());
    }
}
