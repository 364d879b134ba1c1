//! In-memory dummy backend.
//!
//! The dummy backend implements the full backend contract against plain
//! memory, driven by a register catalogue built programmatically or loaded
//! from a MAP file. Beyond faithful word-addressed I/O it offers the test
//! hooks a simulated device needs: interrupt triggering for push-type
//! accessors, targeted read/write failure injection and a transfer log for
//! observing what actually reached the transport.

use crate::backend::{Backend, BackendState};
use crate::catalogue::RegisterCatalogue;
use crate::error::{Error, Result};
use crate::version::VersionNumber;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::mpsc;
use tracing::debug;

/// One backend transfer as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRecord {
    pub kind: TransferKind,
    pub bar: u64,
    pub address: u64,
    pub n_words: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Read,
    Write,
}

#[derive(Default)]
struct FailureInjection {
    all_reads: bool,
    all_writes: bool,
    read_addresses: HashSet<(u64, u64)>,
}

/// A numeric-addressed backend backed by process memory.
pub struct DummyBackend {
    name: String,
    catalogue: RegisterCatalogue,
    state: Mutex<BackendState>,
    bars: Mutex<HashMap<u64, Vec<u32>>>,
    listeners: Mutex<HashMap<(u32, u32), Vec<mpsc::Sender<VersionNumber>>>>,
    failures: Mutex<FailureInjection>,
    transfer_log: Mutex<Vec<TransferRecord>>,
}

impl DummyBackend {
    /// Create a dummy device for the given catalogue. Address spaces are
    /// sized to hold every catalogued register.
    pub fn new(name: impl Into<String>, catalogue: RegisterCatalogue) -> Self {
        let mut sizes: HashMap<u64, u64> = HashMap::new();
        for info in catalogue.iter() {
            let end = info.address() + info.n_bytes();
            let size = sizes.entry(info.bar()).or_insert(0);
            *size = (*size).max(end);
        }
        let bars = sizes
            .into_iter()
            .map(|(bar, bytes)| (bar, vec![0u32; (bytes as usize).div_ceil(4)]))
            .collect();
        DummyBackend {
            name: name.into(),
            catalogue,
            state: Mutex::new(BackendState::new()),
            bars: Mutex::new(bars),
            listeners: Mutex::new(HashMap::new()),
            failures: Mutex::new(FailureInjection::default()),
            transfer_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a dummy device from a MAP register description file.
    pub fn from_map_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let catalogue = crate::mapfile::parse_map_file(path)?;
        Ok(Self::new(name, catalogue))
    }

    fn check_range(&self, bar: u64, address: u64, n_words: usize) -> Result<usize> {
        if address % 4 != 0 {
            return Err(Error::runtime(format!(
                "{}: address {:#x} is not a multiple of 4",
                self.name, address
            )));
        }
        let bars = self.bars.lock();
        let words = bars
            .get(&bar)
            .ok_or_else(|| Error::runtime(format!("{}: no address space {}", self.name, bar)))?;
        let first = (address / 4) as usize;
        if first + n_words > words.len() {
            return Err(Error::runtime(format!(
                "{}: access beyond end of address space {} ({:#x} + {} words)",
                self.name, bar, address, n_words
            )));
        }
        Ok(first)
    }

    fn record(&self, kind: TransferKind, bar: u64, address: u64, n_words: usize) {
        self.transfer_log.lock().push(TransferRecord {
            kind,
            bar,
            address,
            n_words,
        });
    }

    // ------------------------------------------------------------------
    // Simulation hooks
    // ------------------------------------------------------------------

    /// Deliver an interrupt: every push-type accessor subscribed to
    /// `(controller, interrupt)` wakes up with a fresh version number.
    /// Returns the number of accessors notified.
    pub fn trigger_interrupt(&self, controller: u32, interrupt: u32) -> usize {
        let version = VersionNumber::new();
        let mut listeners = self.listeners.lock();
        let Some(senders) = listeners.get_mut(&(controller, interrupt)) else {
            return 0;
        };
        senders.retain(|sender| sender.send(version).is_ok());
        debug!(
            controller,
            interrupt,
            notified = senders.len(),
            "dummy interrupt delivered"
        );
        senders.len()
    }

    /// Make every read fail with a simulated runtime error.
    pub fn fail_all_reads(&self, enable: bool) {
        self.failures.lock().all_reads = enable;
    }

    /// Make every write fail with a simulated runtime error.
    pub fn fail_all_writes(&self, enable: bool) {
        self.failures.lock().all_writes = enable;
    }

    /// Make reads touching the word at `(bar, address)` fail.
    pub fn fail_reads_at(&self, bar: u64, address: u64) {
        self.failures.lock().read_addresses.insert((bar, address));
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        *self.failures.lock() = FailureInjection::default();
    }

    /// The transfers performed so far, oldest first.
    pub fn transfer_log(&self) -> Vec<TransferRecord> {
        self.transfer_log.lock().clone()
    }

    pub fn clear_transfer_log(&self) {
        self.transfer_log.lock().clear();
    }

    /// Directly poke a word into backend memory, bypassing the transfer
    /// machinery (simulates the device updating itself).
    pub fn poke_word(&self, bar: u64, address: u64, value: u32) -> Result<()> {
        let first = self.check_range(bar, address, 1)?;
        self.bars
            .lock()
            .get_mut(&bar)
            .ok_or_else(|| Error::runtime(format!("{}: no address space {}", self.name, bar)))?
            [first] = value;
        Ok(())
    }

    /// Directly observe a word of backend memory.
    pub fn peek_word(&self, bar: u64, address: u64) -> Result<u32> {
        let first = self.check_range(bar, address, 1)?;
        Ok(self.bars.lock()[&bar][first])
    }
}

impl Backend for DummyBackend {
    fn open(&self) -> Result<()> {
        debug!(device = %self.name, "opening dummy backend");
        self.state.lock().open();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        debug!(device = %self.name, "closing dummy backend");
        self.state.lock().close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().is_open()
    }

    fn is_functional(&self) -> bool {
        self.state.lock().is_functional()
    }

    fn set_exception(&self, message: &str) {
        self.state.lock().set_fault(message);
    }

    fn device_info(&self) -> String {
        format!("DummyBackend({})", self.name)
    }

    fn catalogue(&self) -> RegisterCatalogue {
        self.catalogue.clone()
    }

    fn read_area(&self, bar: u64, address: u64, data: &mut [u32]) -> Result<()> {
        self.state.lock().check_transfer_allowed(&self.name)?;
        {
            let failures = self.failures.lock();
            let in_failed_range = failures.read_addresses.iter().any(|&(fbar, faddr)| {
                fbar == bar && faddr >= address && faddr < address + 4 * data.len() as u64
            });
            if failures.all_reads || in_failed_range {
                return Err(Error::runtime(format!(
                    "{}: simulated read failure at bar {} address {:#x}",
                    self.name, bar, address
                )));
            }
        }
        let first = self.check_range(bar, address, data.len())?;
        self.record(TransferKind::Read, bar, address, data.len());
        let bars = self.bars.lock();
        data.copy_from_slice(&bars[&bar][first..first + data.len()]);
        Ok(())
    }

    fn write_area(&self, bar: u64, address: u64, data: &[u32]) -> Result<()> {
        self.state.lock().check_transfer_allowed(&self.name)?;
        if self.failures.lock().all_writes {
            return Err(Error::runtime(format!(
                "{}: simulated write failure at bar {} address {:#x}",
                self.name, bar, address
            )));
        }
        let first = self.check_range(bar, address, data.len())?;
        self.record(TransferKind::Write, bar, address, data.len());
        let mut bars = self.bars.lock();
        let words = bars
            .get_mut(&bar)
            .ok_or_else(|| Error::runtime(format!("{}: no address space {}", self.name, bar)))?;
        words[first..first + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn interrupt_receiver(
        &self,
        controller: u32,
        interrupt: u32,
    ) -> Result<mpsc::Receiver<VersionNumber>> {
        if !self
            .catalogue
            .interrupt_map()
            .get(&controller)
            .is_some_and(|ids| ids.contains(&interrupt))
        {
            return Err(Error::logic(format!(
                "{}: no interrupt {}:{} in the catalogue",
                self.name, controller, interrupt
            )));
        }
        let (sender, receiver) = mpsc::channel();
        self.listeners
            .lock()
            .entry((controller, interrupt))
            .or_default()
            .push(sender);
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Access, RegisterInfo};

    fn backend() -> DummyBackend {
        let mut catalogue = RegisterCatalogue::new();
        catalogue.add_register(RegisterInfo::new_1d(
            "/MOD/A",
            4,
            0,
            0,
            32,
            0,
            true,
            Access::ReadWrite,
        ));
        catalogue.add_register(
            RegisterInfo::new_1d("/IRQ/EVENT", 1, 0, 16, 32, 0, true, Access::ReadOnly)
                .with_interrupt(1, 3),
        );
        DummyBackend::new("testdev", catalogue)
    }

    #[test]
    fn test_read_write_round_trip() {
        let dev = backend();
        dev.open().unwrap();

        dev.write_area(0, 4, &[0xDEAD_BEEF, 42]).unwrap();
        let mut data = [0u32; 2];
        dev.read_area(0, 4, &mut data).unwrap();
        assert_eq!(data, [0xDEAD_BEEF, 42]);
    }

    #[test]
    fn test_transfer_requires_open() {
        let dev = backend();
        let mut data = [0u32; 1];
        assert!(dev.read_area(0, 0, &mut data).unwrap_err().is_logic());
    }

    #[test]
    fn test_misaligned_access_is_runtime_error() {
        let dev = backend();
        dev.open().unwrap();
        let mut data = [0u32; 1];
        assert!(dev.read_area(0, 2, &mut data).unwrap_err().is_runtime());
        assert!(dev
            .read_area(0, 0x1000, &mut data)
            .unwrap_err()
            .is_runtime());
    }

    #[test]
    fn test_fault_latches_until_recovery() {
        let dev = backend();
        dev.open().unwrap();
        dev.set_exception("simulated link loss");
        assert!(!dev.is_functional());
        assert!(dev.is_open());

        let mut data = [0u32; 1];
        let err = dev.read_area(0, 0, &mut data).unwrap_err();
        assert!(err.is_runtime());
        assert!(err.to_string().contains("simulated link loss"));

        dev.recover().unwrap();
        assert!(dev.is_functional());
        assert!(dev.read_area(0, 0, &mut data).is_ok());
    }

    #[test]
    fn test_failure_injection() {
        let dev = backend();
        dev.open().unwrap();
        dev.fail_reads_at(0, 4);

        let mut data = [0u32; 1];
        assert!(dev.read_area(0, 4, &mut data).unwrap_err().is_runtime());
        // a range covering the failed word also fails
        let mut range = [0u32; 4];
        assert!(dev.read_area(0, 0, &mut range).unwrap_err().is_runtime());

        dev.clear_failures();
        assert!(dev.read_area(0, 4, &mut data).is_ok());
    }

    #[test]
    fn test_transfer_log_records_zero_length_writes() {
        let dev = backend();
        dev.open().unwrap();
        dev.write_area(0, 8, &[]).unwrap();
        let log = dev.transfer_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, TransferKind::Write);
        assert_eq!(log[0].n_words, 0);
    }

    #[test]
    fn test_interrupt_subscription_and_trigger() {
        let dev = backend();
        dev.open().unwrap();

        let receiver = dev.interrupt_receiver(1, 3).unwrap();
        assert_eq!(dev.trigger_interrupt(1, 3), 1);
        assert!(receiver.try_recv().is_ok());

        assert_eq!(dev.trigger_interrupt(9, 9), 0);
        assert!(dev.interrupt_receiver(9, 9).unwrap_err().is_logic());
    }
}
