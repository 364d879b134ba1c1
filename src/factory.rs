//! Backend factory and environment.
//!
//! Backend construction is driven by the interface scheme of a device URI: a
//! [`BackendFactory`] maps scheme names to constructor closures, and an
//! [`Environment`] bundles the factory with a device registry loaded from a
//! DMap file. There is no process-global state; code that wants a singleton
//! can keep its own.

use crate::backend::{Backend, DummyBackend};
use crate::device::Device;
use crate::dmap::{parse_dmap_file, DeviceInfo, DeviceInfoMap};
use crate::error::{Error, Result};
use crate::sdm::Sdm;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Constructor for one backend scheme. Receives the parsed URI and the map
/// file registered for the device (if any).
pub type BackendConstructor =
    Arc<dyn Fn(&Sdm, Option<&Path>) -> Result<Arc<dyn Backend>> + Send + Sync>;

/// Maps URI interface schemes to backend constructors.
#[derive(Clone, Default)]
pub struct BackendFactory {
    constructors: HashMap<String, BackendConstructor>,
}

impl BackendFactory {
    /// An empty factory with no registered schemes.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory with the built-in backends registered (currently the
    /// in-memory dummy under the `dummy` scheme).
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register_scheme("dummy", |sdm, map_file| {
            let path = map_file
                .map(Path::to_path_buf)
                .or_else(|| sdm.parameters.first().map(Into::into))
                .ok_or_else(|| {
                    Error::logic("dummy backend needs a map file (parameter or dmap column)")
                })?;
            let instance = if sdm.instance.is_empty() {
                path.display().to_string()
            } else {
                sdm.instance.clone()
            };
            Ok(Arc::new(DummyBackend::from_map_file(instance, &path)?) as Arc<dyn Backend>)
        });
        factory
    }

    /// Register a constructor for a URI interface scheme. Re-registering a
    /// scheme replaces the previous constructor.
    pub fn register_scheme<F>(&mut self, scheme: impl Into<String>, constructor: F)
    where
        F: Fn(&Sdm, Option<&Path>) -> Result<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        self.constructors.insert(scheme.into(), Arc::new(constructor));
    }

    pub fn has_scheme(&self, scheme: &str) -> bool {
        self.constructors.contains_key(scheme)
    }

    /// Construct the backend for a device registration.
    pub fn create(&self, info: &DeviceInfo) -> Result<Arc<dyn Backend>> {
        let sdm = Sdm::parse_lenient(&info.uri)?;
        let constructor = self.constructors.get(&sdm.interface).ok_or_else(|| {
            Error::logic(format!(
                "no backend registered for scheme '{}' (device '{}')",
                sdm.interface, info.alias
            ))
        })?;
        debug!(alias = %info.alias, scheme = %sdm.interface, "constructing backend");
        constructor(&sdm, Some(&info.map_file))
    }

    /// Construct a backend directly from a URI, without a registry entry.
    pub fn create_from_uri(&self, uri: &str) -> Result<Arc<dyn Backend>> {
        let sdm = Sdm::parse_lenient(uri)?;
        let constructor = self.constructors.get(&sdm.interface).ok_or_else(|| {
            Error::logic(format!(
                "no backend registered for scheme '{}'",
                sdm.interface
            ))
        })?;
        constructor(&sdm, None)
    }
}

/// Explicit bundle of everything device construction needs: the alias
/// registry and the backend factory.
#[derive(Clone, Default)]
pub struct Environment {
    devices: DeviceInfoMap,
    factory: BackendFactory,
}

impl Environment {
    pub fn new(devices: DeviceInfoMap, factory: BackendFactory) -> Self {
        Environment { devices, factory }
    }

    /// Build an environment from a DMap file, with the default backends
    /// registered.
    pub fn from_dmap_file(path: &Path) -> Result<Self> {
        Ok(Environment {
            devices: parse_dmap_file(path)?,
            factory: BackendFactory::with_defaults(),
        })
    }

    pub fn devices(&self) -> &DeviceInfoMap {
        &self.devices
    }

    pub fn factory(&self) -> &BackendFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut BackendFactory {
        &mut self.factory
    }

    /// Look up `alias`, construct its backend and open it.
    pub fn open_device(&self, alias: &str) -> Result<Device> {
        let info = self.devices.get(alias)?;
        let backend = self.factory.create(info)?;
        let device = Device::new(backend);
        device.open()?;
        Ok(device)
    }
}
