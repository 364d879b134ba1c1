//! Accessor decorators.
//!
//! Decorators wrap an existing accessor element and change what the user
//! sees without touching the underlying transfer: the numeric-cast decorator
//! re-types the buffer, the copy-register decorator materializes an
//! independent snapshot of a computed view. Both forward the transfer
//! lifecycle to their target, inserting their own work into the post phase
//! for reads and the pre phase for writes.

use crate::error::{Error, Result};
use crate::transfer::{
    ElementCore, NdAccessor, SharedElement, TransferElement, TransferType, TypedElement,
};
use crate::user_types::{convert_user_type, UserType};
use crate::version::VersionNumber;
use std::any::Any;

/// Exposes an accessor of user type `U` as user type `T`.
///
/// Conversion happens per element in `postRead` (for reads) and `preWrite`
/// (for writes); values the target type cannot represent raise a
/// numeric-cast error there. Everything else delegates to the wrapped
/// element.
pub struct NumericCastDecorator<T: UserType, U: UserType> {
    core: ElementCore,
    target: TypedElement<U>,
    buffer: Vec<Vec<T>>,
}

impl<T: UserType, U: UserType> NumericCastDecorator<T, U> {
    /// Wrap `target`, exposing its buffer as values of type `T`.
    pub fn decorate(target: TypedElement<U>) -> TypedElement<T> {
        let (name, flags, backend, channels, elements) = {
            let guard = target.typed().lock();
            (
                guard.core().name.clone(),
                guard.core().flags,
                guard.core().exception_backend.clone(),
                guard.n_channels(),
                guard.n_elements(),
            )
        };
        let mut core = ElementCore::new(name, flags);
        core.exception_backend = backend;
        TypedElement::new(NumericCastDecorator {
            core,
            target,
            buffer: vec![vec![T::default(); elements]; channels],
        })
    }
}

impl<T: UserType, U: UserType> TransferElement for NumericCastDecorator<T, U> {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn is_readable(&self) -> bool {
        self.target.erased().lock().is_readable()
    }

    fn is_writeable(&self) -> bool {
        self.target.erased().lock().is_writeable()
    }

    fn do_pre_read(&mut self, ty: TransferType) -> Result<()> {
        // skip if another forwarding path already opened the transaction
        let mut target = self.target.erased().lock();
        if target.core().read_active {
            return Ok(());
        }
        target.pre_read(ty)
    }

    fn do_read_transfer(&mut self) -> Result<()> {
        self.target.erased().lock().read_transfer()
    }

    fn do_read_transfer_nonblocking(&mut self) -> Result<bool> {
        self.target.erased().lock().do_read_transfer_nonblocking()
    }

    fn do_read_transfer_latest(&mut self) -> Result<bool> {
        self.target.erased().lock().do_read_transfer_latest()
    }

    fn do_post_read(&mut self, ty: TransferType, update: bool) -> Result<()> {
        {
            let mut target = self.target.erased().lock();
            if target.core().read_active {
                target.post_read(ty, update)?;
            }
        }
        if update {
            let target = self.target.typed().lock();
            for (channel, cooked) in self.buffer.iter_mut().enumerate() {
                for (slot, value) in cooked.iter_mut().zip(target.channel_slice(channel)) {
                    *slot = convert_user_type(value)?;
                }
            }
            self.core.version = target.core().version;
            self.core.validity = target.core().validity;
        }
        Ok(())
    }

    fn do_pre_write(&mut self, ty: TransferType, version: VersionNumber) -> Result<()> {
        {
            let mut target = self.target.typed().lock();
            for (channel, cooked) in self.buffer.iter().enumerate() {
                for (slot, value) in target
                    .channel_slice_mut(channel)
                    .iter_mut()
                    .zip(cooked.iter())
                {
                    *slot = convert_user_type(value)?;
                }
            }
        }
        let mut target = self.target.erased().lock();
        if target.core().write_active {
            return Ok(());
        }
        target.pre_write(ty, version)
    }

    fn do_write_transfer(&mut self, version: VersionNumber) -> Result<()> {
        self.target.erased().lock().write_transfer(version)
    }

    fn do_post_write(&mut self, ty: TransferType, version: VersionNumber) -> Result<()> {
        let mut target = self.target.erased().lock();
        if target.core().write_active {
            return target.post_write(ty, version);
        }
        Ok(())
    }

    fn internal_elements(&self) -> Vec<SharedElement> {
        vec![self.target.erased().clone()]
    }

    fn replace_transfer_element(&mut self, candidate: &SharedElement) {
        if crate::transfer::element_id(candidate)
            == crate::transfer::element_id(self.target.erased())
        {
            return;
        }
        self.target.erased().lock().replace_transfer_element(candidate);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: UserType, U: UserType> NdAccessor<T> for NumericCastDecorator<T, U> {
    fn n_channels(&self) -> usize {
        self.buffer.len()
    }

    fn n_elements(&self) -> usize {
        self.buffer.first().map(|c| c.len()).unwrap_or(0)
    }

    fn channel_slice(&self, channel: usize) -> &[T] {
        &self.buffer[channel]
    }

    fn channel_slice_mut(&mut self, channel: usize) -> &mut [T] {
        &mut self.buffer[channel]
    }
}

/// Materializes an independent copy of a computed view.
///
/// The copy cannot be substituted away by a transfer group: the group drives
/// its `preRead`/`postRead` explicitly, after the wrapped element is ready,
/// and the decorator snapshots the target buffer into its own.
pub struct CopyRegisterDecorator<T: UserType> {
    core: ElementCore,
    target: TypedElement<T>,
    buffer: Vec<Vec<T>>,
}

impl<T: UserType> CopyRegisterDecorator<T> {
    /// Wrap `target` in an independent read-only copy.
    pub fn decorate(target: TypedElement<T>) -> TypedElement<T> {
        let (name, flags, backend, channels, elements) = {
            let guard = target.typed().lock();
            (
                guard.core().name.clone(),
                guard.core().flags,
                guard.core().exception_backend.clone(),
                guard.n_channels(),
                guard.n_elements(),
            )
        };
        let mut core = ElementCore::new(name, flags);
        core.exception_backend = backend;
        TypedElement::new(CopyRegisterDecorator {
            core,
            target,
            buffer: vec![vec![T::default(); elements]; channels],
        })
    }
}

impl<T: UserType> TransferElement for CopyRegisterDecorator<T> {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn is_readable(&self) -> bool {
        self.target.erased().lock().is_readable()
    }

    fn is_writeable(&self) -> bool {
        // copies are read-only materializations
        false
    }

    fn do_pre_read(&mut self, ty: TransferType) -> Result<()> {
        // skip if another forwarding path already opened the transaction
        let mut target = self.target.erased().lock();
        if target.core().read_active {
            return Ok(());
        }
        target.pre_read(ty)
    }

    fn do_read_transfer(&mut self) -> Result<()> {
        self.target.erased().lock().read_transfer()
    }

    fn do_post_read(&mut self, ty: TransferType, update: bool) -> Result<()> {
        {
            let mut target = self.target.erased().lock();
            if target.core().read_active {
                target.post_read(ty, update)?;
            }
        }
        if update {
            let target = self.target.typed().lock();
            for (channel, cooked) in self.buffer.iter_mut().enumerate() {
                cooked.clone_from_slice(target.channel_slice(channel));
            }
            self.core.version = target.core().version;
            self.core.validity = target.core().validity;
        }
        Ok(())
    }

    fn do_write_transfer(&mut self, _version: VersionNumber) -> Result<()> {
        Err(Error::logic(format!(
            "{}: copy decorators cannot be written",
            self.core.name
        )))
    }

    fn internal_elements(&self) -> Vec<SharedElement> {
        vec![self.target.erased().clone()]
    }

    fn replace_transfer_element(&mut self, candidate: &SharedElement) {
        if crate::transfer::element_id(candidate)
            == crate::transfer::element_id(self.target.erased())
        {
            return;
        }
        self.target.erased().lock().replace_transfer_element(candidate);
    }

    fn is_copy_decorator(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: UserType> NdAccessor<T> for CopyRegisterDecorator<T> {
    fn n_channels(&self) -> usize {
        self.buffer.len()
    }

    fn n_elements(&self) -> usize {
        self.buffer.first().map(|c| c.len()).unwrap_or(0)
    }

    fn channel_slice(&self, channel: usize) -> &[T] {
        &self.buffer[channel]
    }

    fn channel_slice_mut(&mut self, channel: usize) -> &mut [T] {
        &mut self.buffer[channel]
    }
}
