//! The backend contract and the transfer elements built on top of it.
//!
//! A [`Backend`] is a transport engine exposing word-addressed read/write
//! over one hardware or simulated device, plus lifecycle and recovery
//! signalling. The accessor constructors in [`numeric`] build typed transfer
//! elements on top of nothing but this contract, so every numeric-addressed
//! backend gets the full accessor surface for free.

pub mod dummy;
pub mod low_level;
pub mod muxed;
pub mod numeric;

pub use dummy::DummyBackend;

use crate::catalogue::RegisterCatalogue;
use crate::error::{Error, Result};
use crate::version::VersionNumber;
use std::sync::mpsc;

/// Operations the transfer layer requires from a transport engine.
///
/// Backends synchronize internally; all methods take `&self` and may be
/// called from any thread holding a reference.
pub trait Backend: Send + Sync {
    /// Open the backend. Also the recovery path: opening clears a latched
    /// exception state.
    fn open(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Whether transfers are currently expected to succeed: open and not in
    /// a latched exception state.
    fn is_functional(&self) -> bool;

    /// Latch an exception state. Subsequent transfers fail with a runtime
    /// error carrying `message` until the backend is recovered.
    fn set_exception(&self, message: &str);

    /// Recover from a latched exception state.
    fn recover(&self) -> Result<()> {
        self.open()
    }

    /// Human-readable identification of the device.
    fn device_info(&self) -> String;

    /// The register catalogue of this backend.
    fn catalogue(&self) -> RegisterCatalogue;

    /// Read `data.len()` words starting at byte offset `address` of address
    /// space `bar`. `address` must be word-aligned.
    fn read_area(&self, bar: u64, address: u64, data: &mut [u32]) -> Result<()>;

    /// Write `data` starting at byte offset `address` of address space
    /// `bar`. Zero-length writes are legal and reach the transport (void
    /// registers use them).
    fn write_area(&self, bar: u64, address: u64, data: &[u32]) -> Result<()>;

    /// Subscribe to an interrupt source for push-type accessors. Backends
    /// without push support keep the default.
    fn interrupt_receiver(
        &self,
        controller: u32,
        interrupt: u32,
    ) -> Result<mpsc::Receiver<VersionNumber>> {
        let _ = (controller, interrupt);
        Err(Error::logic(format!(
            "backend {} does not support push-type access",
            self.device_info()
        )))
    }
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Backend")
            .field("device_info", &self.device_info())
            .field("is_open", &self.is_open())
            .finish()
    }
}

/// Open/fault bookkeeping shared by backend implementations.
///
/// Kept behind the backend's own lock; the helpers encode the error taxonomy
/// for the two failure directions: using a closed backend is a caller bug
/// (logic error), while a latched fault is a transient transport condition
/// (runtime error) until recovery.
#[derive(Debug, Default)]
pub struct BackendState {
    opened: bool,
    fault: Option<String>,
}

impl BackendState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) {
        self.opened = true;
        self.fault = None;
    }

    pub fn close(&mut self) {
        self.opened = false;
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn is_functional(&self) -> bool {
        self.opened && self.fault.is_none()
    }

    pub fn set_fault(&mut self, message: &str) {
        if self.fault.is_none() {
            self.fault = Some(message.to_string());
        }
    }

    /// Check that a transfer may proceed.
    pub fn check_transfer_allowed(&self, device: &str) -> Result<()> {
        if let Some(fault) = &self.fault {
            return Err(Error::runtime(format!(
                "{} needs recovery: {}",
                device, fault
            )));
        }
        if !self.opened {
            return Err(Error::logic(format!("{} is not opened", device)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_state_lifecycle() {
        let mut state = BackendState::new();
        assert!(!state.is_open());
        assert!(state.check_transfer_allowed("dev").unwrap_err().is_logic());

        state.open();
        assert!(state.is_functional());
        assert!(state.check_transfer_allowed("dev").is_ok());

        state.set_fault("link lost");
        assert!(state.is_open());
        assert!(!state.is_functional());
        let err = state.check_transfer_allowed("dev").unwrap_err();
        assert!(err.is_runtime());
        assert!(err.to_string().contains("link lost"));

        // the first fault wins until recovery
        state.set_fault("second fault");
        assert!(state
            .check_transfer_allowed("dev")
            .unwrap_err()
            .to_string()
            .contains("link lost"));

        state.open();
        assert!(state.is_functional());
    }
}
