//! Access-mode flags for register accessors.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Optional modes requested when creating an accessor.
    ///
    /// `RAW` disables the cooked conversion: the user type must match the
    /// register's raw transport word (`i32`) exactly. `WAIT_FOR_NEW_DATA`
    /// turns the accessor into a push-type receiver: `read` blocks until the
    /// backend delivers new data for the register's interrupt.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessModeFlags: u8 {
        const RAW = 0b01;
        const WAIT_FOR_NEW_DATA = 0b10;
    }
}

impl fmt::Display for AccessModeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(AccessModeFlags::RAW) {
            names.push("raw");
        }
        if self.contains(AccessModeFlags::WAIT_FOR_NEW_DATA) {
            names.push("wait_for_new_data");
        }
        write!(f, "{{{}}}", names.join(", "))
    }
}
