//! User-facing accessor handles.
//!
//! The handles are thin typed views over a shared transfer element: cheap to
//! clone, hiding the backend and decoration details. They forward the
//! transfer operations (`read`, `read_non_blocking`, `read_latest`, `write`,
//! `write_destructively`) and expose the cooked buffer by value.

use crate::access_mode::AccessModeFlags;
use crate::error::{Error, Result};
use crate::transfer::decorators::{CopyRegisterDecorator, NumericCastDecorator};
use crate::transfer::{
    run_read, run_write, DataValidity, SharedElement, TransferElementHandle, TransferType,
    TypedElement,
};
use crate::user_types::{UserType, Void};
use crate::version::VersionNumber;

macro_rules! forward_common {
    () => {
        /// Register path this accessor is attached to.
        pub fn name(&self) -> crate::register_path::RegisterPath {
            self.element.erased().lock().name()
        }

        pub fn is_readable(&self) -> bool {
            self.element.erased().lock().is_readable()
        }

        pub fn is_writeable(&self) -> bool {
            self.element.erased().lock().is_writeable()
        }

        pub fn is_read_only(&self) -> bool {
            self.element.erased().lock().is_read_only()
        }

        pub fn access_mode_flags(&self) -> AccessModeFlags {
            self.element.erased().lock().access_mode_flags()
        }

        /// Version stamp of the most recent successful transfer.
        pub fn version_number(&self) -> VersionNumber {
            self.element.erased().lock().version_number()
        }

        /// Whether the buffer content is trustworthy.
        pub fn data_validity(&self) -> DataValidity {
            self.element.erased().lock().data_validity()
        }

        /// Blocking read: transfer, then decode into the buffer.
        pub fn read(&mut self) -> Result<()> {
            run_read(self.element.erased(), TransferType::Read).map(|_| ())
        }

        /// Non-blocking read; returns whether new data arrived.
        pub fn read_non_blocking(&mut self) -> Result<bool> {
            run_read(self.element.erased(), TransferType::ReadNonBlocking)
        }

        /// Drain all queued updates, keeping the newest; returns whether new
        /// data arrived.
        pub fn read_latest(&mut self) -> Result<bool> {
            run_read(self.element.erased(), TransferType::ReadLatest)
        }

        /// Write the buffer content to the device.
        pub fn write(&mut self) -> Result<()> {
            run_write(
                self.element.erased(),
                TransferType::Write,
                VersionNumber::new(),
            )
        }

        /// Write, allowing the implementation to consume the buffer content.
        pub fn write_destructively(&mut self) -> Result<()> {
            run_write(
                self.element.erased(),
                TransferType::WriteDestructively,
                VersionNumber::new(),
            )
        }
    };
}

/// Typed handle to a single register element.
#[derive(Clone)]
pub struct ScalarAccessor<T: UserType> {
    element: TypedElement<T>,
}

impl<T: UserType> std::fmt::Debug for ScalarAccessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarAccessor")
            .field("name", &self.name())
            .finish()
    }
}

impl<T: UserType> ScalarAccessor<T> {
    pub(crate) fn new(element: TypedElement<T>) -> Self {
        ScalarAccessor { element }
    }

    forward_common!();

    /// The buffered value.
    pub fn get(&self) -> T {
        self.element.typed().lock().get(0, 0)
    }

    /// Replace the buffered value (transferred on the next `write`).
    pub fn set(&mut self, value: T) {
        self.element.typed().lock().set(0, 0, value);
    }

    /// Convenience: `read` then return the fresh value.
    pub fn read_value(&mut self) -> Result<T> {
        self.read()?;
        Ok(self.get())
    }

    /// Convenience: set the value and `write` it out.
    pub fn set_and_write(&mut self, value: T) -> Result<()> {
        self.set(value);
        self.write()
    }

    /// Expose the accessor under a different user type.
    pub fn cast<C: UserType>(&self) -> ScalarAccessor<C> {
        ScalarAccessor::new(NumericCastDecorator::decorate(self.element.clone()))
    }

    /// Wrap the accessor in an independent read-only copy.
    pub fn to_copy(&self) -> ScalarAccessor<T> {
        ScalarAccessor::new(CopyRegisterDecorator::decorate(self.element.clone()))
    }
}

impl<T: UserType> TransferElementHandle for ScalarAccessor<T> {
    fn high_level_element(&self) -> &SharedElement {
        self.element.erased()
    }
}

/// Typed handle to a one-dimensional register slice.
#[derive(Clone)]
pub struct OneDAccessor<T: UserType> {
    element: TypedElement<T>,
}

impl<T: UserType> std::fmt::Debug for OneDAccessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneDAccessor")
            .field("name", &self.name())
            .finish()
    }
}

impl<T: UserType> OneDAccessor<T> {
    pub(crate) fn new(element: TypedElement<T>) -> Self {
        OneDAccessor { element }
    }

    forward_common!();

    /// Number of elements in the accessed slice.
    pub fn len(&self) -> usize {
        self.element.typed().lock().n_elements()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The buffered element at `index`.
    pub fn get(&self, index: usize) -> T {
        self.element.typed().lock().get(0, index)
    }

    pub fn set(&mut self, index: usize, value: T) {
        self.element.typed().lock().set(0, index, value);
    }

    /// Copy of the whole buffer.
    pub fn to_vec(&self) -> Vec<T> {
        self.element.typed().lock().channel_slice(0).to_vec()
    }

    /// Replace the whole buffer. The slice length must match.
    pub fn set_from(&mut self, values: &[T]) -> Result<()> {
        let mut guard = self.element.typed().lock();
        if values.len() != guard.n_elements() {
            return Err(Error::logic(format!(
                "{}: cannot assign {} values to {} elements",
                guard.name(),
                values.len(),
                guard.n_elements()
            )));
        }
        guard.channel_slice_mut(0).clone_from_slice(values);
        Ok(())
    }

    /// Expose the accessor under a different user type.
    pub fn cast<C: UserType>(&self) -> OneDAccessor<C> {
        OneDAccessor::new(NumericCastDecorator::decorate(self.element.clone()))
    }

    /// Wrap the accessor in an independent read-only copy.
    pub fn to_copy(&self) -> OneDAccessor<T> {
        OneDAccessor::new(CopyRegisterDecorator::decorate(self.element.clone()))
    }
}

impl<T: UserType> TransferElementHandle for OneDAccessor<T> {
    fn high_level_element(&self) -> &SharedElement {
        self.element.erased()
    }
}

/// Typed handle to a two-dimensional (multiplexed) register.
#[derive(Clone)]
pub struct TwoDAccessor<T: UserType> {
    element: TypedElement<T>,
}

impl<T: UserType> TwoDAccessor<T> {
    pub(crate) fn new(element: TypedElement<T>) -> Self {
        TwoDAccessor { element }
    }

    forward_common!();

    pub fn n_channels(&self) -> usize {
        self.element.typed().lock().n_channels()
    }

    pub fn n_elements_per_channel(&self) -> usize {
        self.element.typed().lock().n_elements()
    }

    pub fn get(&self, channel: usize, index: usize) -> T {
        self.element.typed().lock().get(channel, index)
    }

    pub fn set(&mut self, channel: usize, index: usize, value: T) {
        self.element.typed().lock().set(channel, index, value);
    }

    /// Copy of one channel's buffer.
    pub fn channel_to_vec(&self, channel: usize) -> Vec<T> {
        self.element.typed().lock().channel_slice(channel).to_vec()
    }

    /// Expose the accessor under a different user type.
    pub fn cast<C: UserType>(&self) -> TwoDAccessor<C> {
        TwoDAccessor::new(NumericCastDecorator::decorate(self.element.clone()))
    }

    /// Wrap the accessor in an independent read-only copy.
    pub fn to_copy(&self) -> TwoDAccessor<T> {
        TwoDAccessor::new(CopyRegisterDecorator::decorate(self.element.clone()))
    }
}

impl<T: UserType> TransferElementHandle for TwoDAccessor<T> {
    fn high_level_element(&self) -> &SharedElement {
        self.element.erased()
    }
}

/// Handle to a data-less register: a pure trigger.
///
/// A synchronous void accessor (no `wait_for_new_data`) is never readable;
/// calling any read operation on it is a logic error. A push-type void
/// accessor wakes up once per interrupt delivery.
#[derive(Clone)]
pub struct VoidAccessor {
    element: TypedElement<Void>,
}

impl std::fmt::Debug for VoidAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoidAccessor")
            .field("name", &self.name())
            .finish()
    }
}

impl VoidAccessor {
    pub(crate) fn new(element: TypedElement<Void>) -> Self {
        VoidAccessor { element }
    }

    fn check_readable(&self) -> Result<()> {
        if !self
            .access_mode_flags()
            .contains(AccessModeFlags::WAIT_FOR_NEW_DATA)
        {
            return Err(Error::logic(format!(
                "void accessor {} without wait_for_new_data is not readable",
                self.name()
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> crate::register_path::RegisterPath {
        self.element.erased().lock().name()
    }

    pub fn is_readable(&self) -> bool {
        self.element.erased().lock().is_readable()
    }

    pub fn is_writeable(&self) -> bool {
        self.element.erased().lock().is_writeable()
    }

    pub fn is_read_only(&self) -> bool {
        self.element.erased().lock().is_read_only()
    }

    pub fn access_mode_flags(&self) -> AccessModeFlags {
        self.element.erased().lock().access_mode_flags()
    }

    pub fn version_number(&self) -> VersionNumber {
        self.element.erased().lock().version_number()
    }

    /// Block until the next interrupt delivery.
    pub fn read(&mut self) -> Result<()> {
        self.check_readable()?;
        run_read(self.element.erased(), TransferType::Read).map(|_| ())
    }

    /// Poll for an interrupt delivery.
    pub fn read_non_blocking(&mut self) -> Result<bool> {
        self.check_readable()?;
        run_read(self.element.erased(), TransferType::ReadNonBlocking)
    }

    /// Drain queued interrupt deliveries, keeping the newest.
    pub fn read_latest(&mut self) -> Result<bool> {
        self.check_readable()?;
        run_read(self.element.erased(), TransferType::ReadLatest)
    }

    /// Trigger the register with a zero-length payload write.
    pub fn write(&mut self) -> Result<()> {
        run_write(
            self.element.erased(),
            TransferType::Write,
            VersionNumber::new(),
        )
    }
}

impl TransferElementHandle for VoidAccessor {
    fn high_level_element(&self) -> &SharedElement {
        self.element.erased()
    }
}
