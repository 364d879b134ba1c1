//! The user-facing device handle.
//!
//! A `Device` wraps one backend and hands out typed register accessors. It
//! is cheap to clone; all clones share the backend and its lifecycle.

use crate::access_mode::AccessModeFlags;
use crate::backend::muxed::make_muxed_accessor;
use crate::backend::numeric::{make_numeric_accessor, make_void_accessor};
use crate::backend::Backend;
use crate::catalogue::RegisterCatalogue;
use crate::error::Result;
use crate::handles::{OneDAccessor, ScalarAccessor, TwoDAccessor, VoidAccessor};
use crate::register_path::RegisterPath;
use crate::user_types::UserType;
use std::sync::Arc;

/// Handle to one opened (or openable) device backend.
#[derive(Clone, Debug)]
pub struct Device {
    backend: Arc<dyn Backend>,
}

impl Device {
    /// Wrap an already-constructed backend.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Device { backend }
    }

    pub fn open(&self) -> Result<()> {
        self.backend.open()
    }

    pub fn close(&self) -> Result<()> {
        self.backend.close()
    }

    pub fn is_opened(&self) -> bool {
        self.backend.is_open()
    }

    /// Whether transfers are currently expected to succeed.
    pub fn is_functional(&self) -> bool {
        self.backend.is_functional()
    }

    /// Recover the backend after a runtime error latched it.
    pub fn recover(&self) -> Result<()> {
        self.backend.recover()
    }

    pub fn device_info(&self) -> String {
        self.backend.device_info()
    }

    pub fn register_catalogue(&self) -> RegisterCatalogue {
        self.backend.catalogue()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Typed accessor for a single element of a register.
    pub fn scalar<T: UserType>(
        &self,
        path: impl Into<RegisterPath>,
        flags: AccessModeFlags,
    ) -> Result<ScalarAccessor<T>> {
        let info = self.backend.catalogue().get_register(&path.into())?;
        let element = make_numeric_accessor(&self.backend, &info, 1, 0, flags)?;
        Ok(ScalarAccessor::new(element))
    }

    /// Typed accessor for a slice of a register. `num_words == 0` selects
    /// the full register; `word_offset` counts elements.
    pub fn one_d<T: UserType>(
        &self,
        path: impl Into<RegisterPath>,
        num_words: usize,
        word_offset: usize,
        flags: AccessModeFlags,
    ) -> Result<OneDAccessor<T>> {
        let info = self.backend.catalogue().get_register(&path.into())?;
        let element = make_numeric_accessor(&self.backend, &info, num_words, word_offset, flags)?;
        Ok(OneDAccessor::new(element))
    }

    /// Typed accessor for a 2D multiplexed register.
    pub fn two_d<T: UserType>(
        &self,
        path: impl Into<RegisterPath>,
        flags: AccessModeFlags,
    ) -> Result<TwoDAccessor<T>> {
        let info = self.backend.catalogue().get_register(&path.into())?;
        let element = make_muxed_accessor(&self.backend, &info, flags)?;
        Ok(TwoDAccessor::new(element))
    }

    /// Data-less trigger accessor. Without `wait_for_new_data` the register
    /// must be writeable; with it, the register must be a push source.
    pub fn void_accessor(
        &self,
        path: impl Into<RegisterPath>,
        flags: AccessModeFlags,
    ) -> Result<VoidAccessor> {
        let info = self.backend.catalogue().get_register(&path.into())?;
        let element = make_void_accessor(&self.backend, &info, flags)?;
        Ok(VoidAccessor::new(element))
    }
}
