//! Register metadata and the per-backend register catalogue.
//!
//! A [`RegisterInfo`] carries everything needed to address and decode one
//! register: path, element count and pitch, address-space id and byte offset,
//! access rights, interrupt assignment and the per-channel bit layout. The
//! [`RegisterCatalogue`] maps paths to infos, preserves insertion order for
//! reproducible enumeration and exposes the interrupt map.

use crate::access_mode::AccessModeFlags;
use crate::data_types::{ChannelInfo, DataDescriptor, TransportType};
use crate::error::{Error, Result};
use crate::register_path::RegisterPath;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Data access direction of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    /// Read-only register whose content is pushed on a hardware interrupt.
    Interrupt,
}

/// Immutable description of one backend register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterInfo {
    path: RegisterPath,
    /// Number of elements per channel.
    n_elements: u32,
    /// Distance in bits between two consecutive elements of one channel.
    element_pitch_bits: u32,
    /// Address space id (the BAR for PCIe-style backends).
    bar: u64,
    /// Byte offset of the first element relative to the address space start.
    address: u64,
    access: Access,
    interrupt_ctrl: u32,
    interrupt_id: u32,
    channels: Vec<ChannelInfo>,
    descriptor: DataDescriptor,
}

impl RegisterInfo {
    /// Describe a scalar or 1D register with a single fixed-point channel
    /// occupying one 32-bit word per element.
    #[allow(clippy::too_many_arguments)]
    pub fn new_1d(
        path: impl Into<RegisterPath>,
        n_elements: u32,
        bar: u64,
        address: u64,
        width: u32,
        fractional_bits: i32,
        signed: bool,
        access: Access,
    ) -> Self {
        let channels = if width == 0 {
            vec![ChannelInfo {
                bit_offset: 0,
                transport: TransportType::Void,
                width: 0,
                fractional_bits: 0,
                signed: false,
            }]
        } else {
            vec![ChannelInfo::fixed_point(width, fractional_bits, signed)]
        };
        let descriptor = DataDescriptor::from_channels(&channels);
        RegisterInfo {
            path: path.into(),
            n_elements,
            element_pitch_bits: 32,
            bar,
            address,
            access,
            interrupt_ctrl: 0,
            interrupt_id: 0,
            channels,
            descriptor,
        }
    }

    /// Describe a 2D multiplexed register with an explicit channel layout.
    #[allow(clippy::too_many_arguments)]
    pub fn new_2d(
        path: impl Into<RegisterPath>,
        n_elements: u32,
        bar: u64,
        address: u64,
        element_pitch_bits: u32,
        channels: Vec<ChannelInfo>,
        access: Access,
    ) -> Self {
        let descriptor = DataDescriptor::from_channels(&channels);
        RegisterInfo {
            path: path.into(),
            n_elements,
            element_pitch_bits,
            bar,
            address,
            access,
            interrupt_ctrl: 0,
            interrupt_id: 0,
            channels,
            descriptor,
        }
    }

    /// Change the transport encoding of the (single) channel.
    pub fn with_transport(mut self, transport: TransportType) -> Self {
        for channel in &mut self.channels {
            channel.transport = transport;
        }
        self.descriptor = DataDescriptor::from_channels(&self.channels);
        self
    }

    /// Assign the register to an interrupt source. Implies push semantics.
    pub fn with_interrupt(mut self, controller: u32, interrupt: u32) -> Self {
        self.access = Access::Interrupt;
        self.interrupt_ctrl = controller;
        self.interrupt_id = interrupt;
        self
    }

    pub fn path(&self) -> &RegisterPath {
        &self.path
    }

    pub fn n_elements(&self) -> u32 {
        self.n_elements
    }

    pub fn n_channels(&self) -> u32 {
        self.channels.len() as u32
    }

    /// 1 for scalars, 2 for 1D arrays, 3 for 2D multiplexed registers.
    pub fn n_dimensions(&self) -> u32 {
        if self.channels.len() > 1 {
            3
        } else if self.n_elements > 1 {
            2
        } else {
            1
        }
    }

    pub fn element_pitch_bits(&self) -> u32 {
        self.element_pitch_bits
    }

    pub fn bar(&self) -> u64 {
        self.bar
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn interrupt(&self) -> (u32, u32) {
        (self.interrupt_ctrl, self.interrupt_id)
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn data_descriptor(&self) -> &DataDescriptor {
        &self.descriptor
    }

    pub fn is_readable(&self) -> bool {
        matches!(
            self.access,
            Access::ReadOnly | Access::ReadWrite | Access::Interrupt
        )
    }

    pub fn is_writeable(&self) -> bool {
        matches!(self.access, Access::WriteOnly | Access::ReadWrite)
    }

    /// Access modes an accessor for this register may request.
    pub fn supported_access_modes(&self) -> AccessModeFlags {
        let mut flags = AccessModeFlags::empty();
        if self.access == Access::Interrupt {
            flags |= AccessModeFlags::WAIT_FOR_NEW_DATA;
        }
        if self.channels.len() == 1 && self.channels[0].transport != TransportType::Void {
            flags |= AccessModeFlags::RAW;
        }
        flags
    }

    /// Total bytes the register occupies in its address space.
    pub fn n_bytes(&self) -> u64 {
        (self.n_elements as u64 * self.element_pitch_bits as u64).div_ceil(8)
    }
}

/// Mapping from register path to register info for one backend.
///
/// Iteration yields registers in insertion order. Duplicate insertion
/// replaces the existing entry in place.
#[derive(Debug, Clone, Default)]
pub struct RegisterCatalogue {
    entries: Vec<RegisterInfo>,
    index: HashMap<RegisterPath, usize>,
    interrupts: BTreeMap<u32, BTreeSet<u32>>,
}

impl RegisterCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a register description. An existing register with the same
    /// path is replaced in place.
    pub fn add_register(&mut self, info: RegisterInfo) {
        if info.access == Access::Interrupt {
            self.interrupts
                .entry(info.interrupt_ctrl)
                .or_default()
                .insert(info.interrupt_id);
        }
        match self.index.get(info.path()) {
            Some(&slot) => {
                tracing::warn!(path = %info.path(), "replacing existing catalogue entry");
                self.entries[slot] = info;
                self.rebuild_interrupt_map();
            }
            None => {
                self.index.insert(info.path().clone(), self.entries.len());
                self.entries.push(info);
            }
        }
    }

    fn rebuild_interrupt_map(&mut self) {
        self.interrupts.clear();
        for info in &self.entries {
            if info.access == Access::Interrupt {
                self.interrupts
                    .entry(info.interrupt_ctrl)
                    .or_default()
                    .insert(info.interrupt_id);
            }
        }
    }

    pub fn has_register(&self, path: &RegisterPath) -> bool {
        self.index.contains_key(path)
    }

    /// Look up a register by path, returning the info by value.
    pub fn get_register(&self, path: &RegisterPath) -> Result<RegisterInfo> {
        self.index
            .get(path)
            .map(|&slot| self.entries[slot].clone())
            .ok_or_else(|| Error::logic(format!("register {} not found in catalogue", path)))
    }

    /// Registers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisterInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interrupt controller id mapped to the set of interrupt ids assigned
    /// to it, collected from the `Access::Interrupt` registers.
    pub fn interrupt_map(&self) -> &BTreeMap<u32, BTreeSet<u32>> {
        &self.interrupts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info(path: &str, address: u64) -> RegisterInfo {
        RegisterInfo::new_1d(path, 4, 0, address, 32, 0, true, Access::ReadWrite)
    }

    #[test]
    fn test_lookup_and_miss() {
        let mut catalogue = RegisterCatalogue::new();
        catalogue.add_register(sample_info("/MOD/A", 0));

        assert!(catalogue.has_register(&"/MOD/A".into()));
        assert!(!catalogue.has_register(&"/MOD/B".into()));
        assert_eq!(
            catalogue.get_register(&"/MOD/A".into()).unwrap().address(),
            0
        );
        assert!(catalogue
            .get_register(&"/MOD/B".into())
            .unwrap_err()
            .is_logic());
    }

    #[test]
    fn test_insertion_order_iteration() {
        let mut catalogue = RegisterCatalogue::new();
        catalogue.add_register(sample_info("/Z", 0));
        catalogue.add_register(sample_info("/A", 16));
        catalogue.add_register(sample_info("/M", 32));

        let order: Vec<_> = catalogue.iter().map(|r| r.path().as_str()).collect();
        assert_eq!(order, ["/Z", "/A", "/M"]);
    }

    #[test]
    fn test_duplicate_replaces_in_place() {
        let mut catalogue = RegisterCatalogue::new();
        catalogue.add_register(sample_info("/A", 0));
        catalogue.add_register(sample_info("/B", 16));
        catalogue.add_register(sample_info("/A", 64));

        assert_eq!(catalogue.len(), 2);
        assert_eq!(
            catalogue.get_register(&"/A".into()).unwrap().address(),
            64
        );
        let order: Vec<_> = catalogue.iter().map(|r| r.path().as_str()).collect();
        assert_eq!(order, ["/A", "/B"]);
    }

    #[test]
    fn test_interrupt_map() {
        let mut catalogue = RegisterCatalogue::new();
        catalogue.add_register(
            RegisterInfo::new_1d("/IRQ/A", 1, 0, 0, 32, 0, true, Access::ReadOnly)
                .with_interrupt(2, 4),
        );
        catalogue.add_register(
            RegisterInfo::new_1d("/IRQ/B", 1, 0, 4, 32, 0, true, Access::ReadOnly)
                .with_interrupt(2, 7),
        );
        catalogue.add_register(
            RegisterInfo::new_1d("/IRQ/C", 1, 0, 8, 0, 0, true, Access::ReadOnly)
                .with_interrupt(3, 0),
        );

        let map = catalogue.interrupt_map();
        assert_eq!(map.len(), 2);
        assert!(map[&2].contains(&4));
        assert!(map[&2].contains(&7));
        assert!(map[&3].contains(&0));
    }

    #[test]
    fn test_access_predicates() {
        let ro = RegisterInfo::new_1d("/A", 1, 0, 0, 32, 0, true, Access::ReadOnly);
        assert!(ro.is_readable() && !ro.is_writeable());

        let wo = RegisterInfo::new_1d("/B", 1, 0, 0, 32, 0, true, Access::WriteOnly);
        assert!(!wo.is_readable() && wo.is_writeable());

        let irq = RegisterInfo::new_1d("/C", 1, 0, 0, 32, 0, true, Access::ReadOnly)
            .with_interrupt(0, 1);
        assert!(irq.is_readable() && !irq.is_writeable());
        assert!(irq
            .supported_access_modes()
            .contains(AccessModeFlags::WAIT_FOR_NEW_DATA));
    }

    #[test]
    fn test_supported_access_modes() {
        let plain = sample_info("/A", 0);
        assert_eq!(plain.supported_access_modes(), AccessModeFlags::RAW);

        let void = RegisterInfo::new_1d("/V", 1, 0, 0, 0, 0, false, Access::WriteOnly);
        assert!(void.supported_access_modes().is_empty());
    }

    #[test]
    fn test_dimensions_and_sizes() {
        let scalar = RegisterInfo::new_1d("/S", 1, 0, 0, 32, 0, true, Access::ReadWrite);
        assert_eq!(scalar.n_dimensions(), 1);

        let array = sample_info("/A", 0);
        assert_eq!(array.n_dimensions(), 2);
        assert_eq!(array.n_bytes(), 16);

        let muxed = RegisterInfo::new_2d(
            "/M",
            8,
            0,
            0,
            32,
            vec![
                ChannelInfo::fixed_point(16, 0, true),
                ChannelInfo {
                    bit_offset: 16,
                    transport: TransportType::FixedPoint,
                    width: 16,
                    fractional_bits: 0,
                    signed: false,
                },
            ],
            Access::ReadWrite,
        );
        assert_eq!(muxed.n_dimensions(), 3);
        assert_eq!(muxed.n_channels(), 2);
    }
}
