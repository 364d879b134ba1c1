//! Typed register access for control-systems hardware.
//!
//! This crate presents a uniform, typed, named-register view of
//! heterogeneous device backends: clients open a device by alias, obtain
//! typed accessors for individual registers and perform read/write transfers
//! in raw binary, cooked numeric or textual form.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Handles: ScalarAccessor / OneDAccessor / TwoDAccessor /     │
//! │           VoidAccessor            TransferGroup (coalescing) │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Transfer elements: NumericAccessor, MuxedAccessor,          │
//! │  decorators (cast, copy), shared low-level elements          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Backend contract: open/close/recover, word-addressed I/O,   │
//! │  register catalogue, interrupt delivery                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every transfer follows a strict pre/transfer/post lifecycle; the
//! [`TransferGroup`] coalesces the hardware transfers of several accessors
//! into the minimum set of backend round-trips. Raw words convert to cooked
//! values through per-register fixed-point descriptors.
//!
//! # Example
//!
//! ```no_run
//! use reghal::{AccessModeFlags, Environment};
//!
//! # fn main() -> reghal::Result<()> {
//! let environment = Environment::from_dmap_file("devices.dmap".as_ref())?;
//! let device = environment.open_device("DUMMY1")?;
//!
//! let mut gain = device.scalar::<f64>("/ADC/GAIN", AccessModeFlags::empty())?;
//! gain.set_and_write(2.5)?;
//!
//! let mut data = device.one_d::<i32>("/ADC/DATA", 0, 0, AccessModeFlags::empty())?;
//! data.read()?;
//! # Ok(())
//! # }
//! ```

pub mod access_mode;
pub mod backend;
pub mod catalogue;
pub mod data_types;
pub mod device;
pub mod dmap;
pub mod error;
pub mod factory;
pub mod fixed_point;
pub mod handles;
pub mod mapfile;
pub mod register_path;
pub mod sdm;
pub mod transfer;
pub mod user_types;
pub mod version;

pub use access_mode::AccessModeFlags;
pub use backend::{Backend, DummyBackend};
pub use catalogue::{Access, RegisterCatalogue, RegisterInfo};
pub use data_types::{ChannelInfo, DataDescriptor, FundamentalType, TransportType};
pub use device::Device;
pub use dmap::{DeviceInfo, DeviceInfoMap};
pub use error::{Error, Result};
pub use factory::{BackendFactory, Environment};
pub use fixed_point::FixedPointConverter;
pub use handles::{OneDAccessor, ScalarAccessor, TwoDAccessor, VoidAccessor};
pub use register_path::RegisterPath;
pub use sdm::Sdm;
pub use transfer::{DataValidity, TransferGroup};
pub use user_types::{UserType, Void};
pub use version::VersionNumber;
