//! Monotonic version stamps for transfer data.
//!
//! Every successful read stamps the accessor buffer with a version number
//! drawn from a process-wide monotonic counter. Comparing version numbers of
//! two accessors tells which one carries the more recent data, regardless of
//! which backend produced it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// A monotonic stamp marking the most recent successful transfer into an
/// accessor's buffer.
///
/// The default value is the *null* version (0), carried by accessors that
/// have never completed a transfer. [`VersionNumber::new`] draws a fresh,
/// strictly increasing value from the global counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionNumber(u64);

impl VersionNumber {
    /// Obtain a new, globally unique version number. Each call returns a
    /// value strictly greater than all values returned before.
    pub fn new() -> Self {
        VersionNumber(NEXT_VERSION.fetch_add(1, Ordering::Relaxed))
    }

    /// The null version, smaller than every stamped version.
    pub const fn null() -> Self {
        VersionNumber(0)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_monotonic() {
        let a = VersionNumber::new();
        let b = VersionNumber::new();
        let c = VersionNumber::new();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_null_is_smallest() {
        assert!(VersionNumber::null() < VersionNumber::new());
        assert!(VersionNumber::null().is_null());
        assert_eq!(VersionNumber::default(), VersionNumber::null());
    }
}
